use serde_json::json;

use ziptie_schema::{
    network_registry, Attributes, CatalogError, ClassificationError, FieldDecl, FieldType, LabeledRecord,
    NodeSchema, NotFoundError, Registry, RelationshipSchema, ValidationError, Value,
};

fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn best_match_prefers_most_specific_type() {
    let registry = network_registry().unwrap();

    let matched = registry.best_match(["PublicIPAddress", "IPAddress"]).unwrap();
    assert_eq!(matched.schema.class_name, "PublicIPAddress");
    assert_eq!(matched.score, 2);
    assert!(matched.extra_labels.is_empty());
}

#[test]
fn best_match_returns_extra_labels() {
    let registry = network_registry().unwrap();

    let matched = registry.best_match(["Domain", "MailServer", "Audit2024"]).unwrap();
    assert_eq!(matched.schema.class_name, "Domain");
    assert_eq!(
        matched.extra_labels.into_iter().collect::<Vec<_>>(),
        vec!["Audit2024", "MailServer"]
    );
}

#[test]
fn best_match_keeps_classifiable_base_over_its_subtypes() {
    let registry = network_registry().unwrap();
    let matched = registry.best_match(["IPAddress", "IPv4Address"]).unwrap();
    assert_eq!(matched.schema.class_name, "IPAddress");
    assert!(matched.schema.is_classifiable());
    assert_eq!(matched.extra_labels.into_iter().collect::<Vec<_>>(), vec!["IPv4Address"]);
}

#[test]
fn base_label_set_is_classified_by_address() {
    let registry = network_registry().unwrap();
    let mut props = Attributes::new();
    props.insert("address".to_string(), Value::from("8.8.8.8"));
    let expected = registry.create_node("IPAddress", props.clone()).unwrap();

    let node = registry
        .deserialize_node_from_labels(["IPAddress"], &object(json!({"address": "8.8.8.8"})))
        .unwrap();
    assert_eq!(node.class_name(), "PublicIPAddress");
    assert_eq!(node.node_id(), expected.node_id());

    let stored = LabeledRecord::new(["IPAddress", "IPv4Address"], props);
    let node = registry.deserialize_graph_node(&stored).unwrap();
    assert_eq!(node.class_name(), "PublicIPAddress");
    assert_eq!(node.node_id(), expected.node_id());
    assert_eq!(node.labels(), expected.labels());

    let node = registry
        .deserialize_node_from_labels(["IPAddress"], &object(json!({"address": "10.1.2.3"})))
        .unwrap();
    assert_eq!(node.class_name(), "PrivateIPAddress");
}

#[test]
fn lookups_report_available_keys() {
    let registry = network_registry().unwrap();

    match registry.get_relationship_by_type("OWNS").unwrap_err() {
        CatalogError::NotFound(NotFoundError::RelationshipType { available, .. }) => {
            assert!(available.contains(&"HAS_IP".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(registry.get_relationship_class("HasIP").is_ok());
    assert!(registry.get_node_by_label("Domain").is_ok());
    assert!(registry.get_node_class("Host").unwrap_err().is_not_found());
}

#[test]
fn labels_for_includes_inherited_labels() {
    let registry = network_registry().unwrap();
    let labels = registry.labels_for("PrivateIPAddress").unwrap();
    assert_eq!(labels.into_iter().collect::<Vec<_>>(), vec!["IPAddress", "PrivateIPAddress"]);
    assert!(registry.labels_for("IPAddress").is_ok());
}

#[test]
fn direct_build_of_classifiable_type_fails() {
    let registry = network_registry().unwrap();
    let base = std::sync::Arc::clone(registry.get_node_class("IPAddress").unwrap());
    let err = ziptie_schema::Node::builder(base)
        .attr("address", "8.8.8.8")
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Validation(ValidationError::AbstractType { .. })
    ));
}

#[test]
fn classifier_must_return_registered_subtype() {
    fn always_domain(_: &Attributes) -> Option<String> {
        Some("Domain".to_string())
    }
    fn always_ghost(_: &Attributes) -> Option<String> {
        Some("Ghost".to_string())
    }

    let base = |name: &str, func: ziptie_schema::schema::ClassifyFn| {
        NodeSchema::new(name)
            .field(FieldDecl::new("key", FieldType::String).identifying())
            .classifier(ziptie_schema::schema::Classifier { name: "test", func })
    };
    let registry = ziptie_schema::networks::register(Registry::builder())
        .node(base("Odd", always_domain))
        .node(base("Lost", always_ghost))
        .build()
        .unwrap();

    let mut data = Attributes::new();
    data.insert("key".to_string(), Value::from("k"));

    let err = registry.create_node("Odd", data.clone()).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Classification(ClassificationError::NotASubtype { .. })
    ));
    let err = registry.create_node("Lost", data).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Classification(ClassificationError::UnknownType { .. })
    ));
}

#[test]
fn deserialize_flat_node_with_labels() {
    let registry = network_registry().unwrap();
    let node = registry
        .deserialize_node(&object(json!({
            "primary_label": "Domain",
            "labels": ["Domain", "Audit2024"],
            "address": "MX.Example.com",
            "count": 2
        })))
        .unwrap();

    assert_eq!(node.class_name(), "Domain");
    assert_eq!(node.get("address"), Some(&Value::from("mx.example.com")));
    assert_eq!(node.labels(), vec!["Domain", "Audit2024", "MailServer"]);
}

#[test]
fn deserialize_flat_node_of_classifiable_label() {
    let registry = network_registry().unwrap();
    let node = registry
        .deserialize_node(&object(json!({"primary_label": "IPAddress", "address": "8.8.8.8"})))
        .unwrap();
    assert_eq!(node.class_name(), "PublicIPAddress");
}

#[test]
fn deserialize_requires_primary_label() {
    let registry = network_registry().unwrap();
    let err = registry
        .deserialize_node(&object(json!({"address": "example.com"})))
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::NotFound(NotFoundError::MissingKey { .. })
    ));
}

#[test]
fn deserialize_from_label_set() {
    let registry = network_registry().unwrap();
    let node = registry
        .deserialize_node_from_labels(
            ["PublicIPAddress", "IPAddress", "Watchlist"],
            &object(json!({"address": "1.1.1.1", "asn": 13335})),
        )
        .unwrap();
    assert_eq!(node.class_name(), "PublicIPAddress");
    assert!(node.has_label("Watchlist"));
    assert_eq!(node.get("asn"), Some(&Value::Int(13335)));
}

#[test]
fn deserialize_graph_node_with_and_without_labels() {
    let registry = network_registry().unwrap();

    let mut props = Attributes::new();
    props.insert("address".to_string(), Value::from("example.org"));
    let labeled = LabeledRecord::new(["Domain", "WebServer"], props.clone());
    let node = registry.deserialize_graph_node(&labeled).unwrap();
    assert_eq!(node.class_name(), "Domain");
    assert!(node.has_label("WebServer"));

    props.insert("primary_label".to_string(), Value::from("Domain"));
    let unlabeled = LabeledRecord::new(Vec::<String>::new(), props);
    let node = registry.deserialize_graph_node(&unlabeled).unwrap();
    assert_eq!(node.class_name(), "Domain");
}

#[test]
fn deserialize_relationship_from_flat_map() {
    let registry = network_registry().unwrap();
    let rel = registry
        .deserialize_relationship(&object(json!({
            "rel_type": "HAS_IP",
            "start_node": {"primary_label": "Domain", "node_id": "d-1"},
            "end_node": {"primary_label": "PrivateIPAddress", "node_id": "ip-1"},
            "count": 5
        })))
        .unwrap();
    assert_eq!(rel.class_name(), "HasIP");
    assert_eq!(rel.get("count"), Some(&Value::Int(5)));

    let err = registry
        .deserialize_relationship(&object(json!({
            "rel_type": "HAS_IP",
            "start_node": {"primary_label": "Domain", "node_id": "d-1"}
        })))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn combine_strict_rejects_duplicates() {
    let a = network_registry().unwrap();
    let b = network_registry().unwrap();
    let err = Registry::combine(&[&a, &b], true).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Validation(ValidationError::DuplicateKey { .. })
    ));
}

#[test]
fn combine_lenient_lets_later_sources_win() {
    let networks = network_registry().unwrap();
    let overrides = Registry::builder()
        .node(
            NodeSchema::new("Domain")
                .field(FieldDecl::new("address", FieldType::String).identifying())
                .version("0.2"),
        )
        .node(NodeSchema::new("Host").field(FieldDecl::new("name", FieldType::String).identifying()))
        .relationship(RelationshipSchema::new("Resolves", "RESOLVES").pair("Host", "Domain"))
        .build()
        .unwrap();

    let combined = Registry::combine(&[&networks, &overrides], false).unwrap();
    assert_eq!(combined.get_node_class("Domain").unwrap().schema_version, "0.2");
    assert!(combined.get_node_by_label("Host").is_ok());
    assert!(combined.get_relationship_by_type("RESOLVES").is_ok());
    assert_eq!(combined.list_node_classes().len(), 7);

    let strict = Registry::combine(&[&networks, &overrides], true).unwrap_err();
    assert!(strict.is_validation());
}
