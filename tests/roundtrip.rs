use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use ziptie_schema::{
    network_registry, Attributes, CatalogConfig, NodeRecord, Registry, Relationship, RelationshipRecord, Value,
};

fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn public_ip(registry: &Registry) -> ziptie_schema::Node {
    registry
        .create_node(
            "IPAddress",
            attrs(&[
                ("address", Value::from("8.8.8.8")),
                ("asn", Value::Int(15169)),
                ("rtt_ms", Value::Float(12.5)),
                ("sources", Value::from(vec!["scan-a"])),
                ("created_at", Value::from("2024-03-09T12:30:05.123456789Z")),
            ]),
        )
        .unwrap()
}

#[test]
fn node_record_round_trip_preserves_identity_and_fields() {
    let registry = network_registry().unwrap();
    let node = public_ip(&registry);

    for separate in [false, true] {
        let record = node.to_record(separate);
        let rebuilt = registry.node_from_record(&record).unwrap();

        assert_eq!(rebuilt.node_id(), node.node_id());
        assert_eq!(rebuilt.labels(), node.labels());
        assert_eq!(rebuilt.to_record(separate), record);
    }
}

#[test]
fn node_record_round_trip_through_label_set() {
    let registry = network_registry().unwrap();
    let node = public_ip(&registry);

    for separate in [false, true] {
        let record = node.to_record(separate);
        let rebuilt = registry
            .deserialize_node_from_labels(&record.labels, &record.flattened_properties())
            .unwrap();

        assert_eq!(rebuilt.node_id(), node.node_id());
        assert_eq!(rebuilt.class_name(), node.class_name());
        let again = rebuilt.to_record(separate);
        assert_eq!(again.identifying_properties, record.identifying_properties);
        assert_eq!(again.properties, record.properties);
        assert_eq!(again.dynamic_properties, record.dynamic_properties);
        assert_eq!(again.labels, record.labels);
    }
}

#[test]
fn node_record_shape() {
    let registry = network_registry().unwrap();
    let node = public_ip(&registry);
    let record = node.to_record(false);

    assert_eq!(record.schema_version, "0.1");
    assert_eq!(record.primary_label, "PublicIPAddress");
    assert_eq!(record.labels, vec!["PublicIPAddress", "IPAddress", "IPv4Address"]);
    assert_eq!(
        serde_json::Value::Object(record.identifying_properties.clone()),
        json!({"address": "8.8.8.8"})
    );
    assert_eq!(record.properties["created_at"], "2024-03-09T12:30:05.123456789Z");
    assert_eq!(record.properties["asn"], 15169);
    assert_eq!(record.properties["count"], 1);
    assert!(record.dynamic_properties.is_none());

    let separated = node.to_record(true);
    assert_eq!(
        serde_json::Value::Object(separated.dynamic_properties.unwrap()),
        json!({"asn": 15169, "rtt_ms": 12.5})
    );
    assert!(!separated.properties.contains_key("asn"));
}

#[test]
fn record_serde_round_trip() {
    let registry = network_registry().unwrap();
    let record = public_ip(&registry).to_record(true);

    let text = serde_json::to_string(&record).unwrap();
    let parsed: NodeRecord = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, record);
    assert_eq!(registry.node_from_record(&parsed).unwrap().to_record(true), record);
}

#[test]
fn encoded_containers_follow_config() {
    let registry = network_registry().unwrap();
    let node = registry
        .create_node("Domain", attrs(&[("address", Value::from("www.example.com"))]))
        .unwrap();

    let config = CatalogConfig::from_json(
        r#"{"records": {"separate_dynamic_properties": true, "encode_containers": true}}"#,
    )
    .unwrap();
    let json = node.to_json(&config.records).unwrap();

    assert_eq!(json["identifying_properties"], json!("{\"address\":\"www.example.com\"}"));
    assert_eq!(json["dynamic_properties"], json!("{}"));
    assert_eq!(json["labels"], json!(["Domain", "WebServer"]));
    assert!(json["properties"].is_string());
}

#[test]
fn relationship_record_round_trip() {
    let registry = network_registry().unwrap();
    let domain = registry
        .create_node("Domain", attrs(&[("address", Value::from("dns.google"))]))
        .unwrap();
    let address = public_ip(&registry);
    let has_ip = Arc::clone(registry.get_relationship_class("HasIP").unwrap());

    let rel = Relationship::builder(has_ip, &domain, &address)
        .attr("sources", vec!["passive-dns"])
        .attr("modified_at", "2024-04-01T00:00:00Z")
        .build()
        .unwrap();

    let record = rel.to_record(false);
    assert_eq!(record.start_node.node_id, domain.node_id());
    assert_eq!(record.end_node.primary_label, "PublicIPAddress");

    let text = serde_json::to_string(&record).unwrap();
    let parsed: RelationshipRecord = serde_json::from_str(&text).unwrap();
    let rebuilt = registry.relationship_from_record(&parsed).unwrap();

    assert_eq!(rebuilt.rel_id(), rel.rel_id());
    assert_eq!(rebuilt.to_record(false), record);
}

#[test]
fn relationship_json_has_endpoint_refs_only() {
    let registry = network_registry().unwrap();
    let domain = registry
        .create_node("Domain", attrs(&[("address", Value::from("dns.google"))]))
        .unwrap();
    let address = public_ip(&registry);
    let has_ip = Arc::clone(registry.get_relationship_class("HasIP").unwrap());
    let rel = Relationship::builder(has_ip, &domain, &address).build().unwrap();

    let json = rel.to_json(&ziptie_schema::RecordOptions::default()).unwrap();
    assert_eq!(
        json["start_node"],
        json!({"primary_label": "Domain", "node_id": domain.node_id()})
    );
    assert_eq!(json["rel_type"], "HAS_IP");
    assert!(json.get("dynamic_properties").is_none());
}
