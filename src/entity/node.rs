//! Nodes: labeled entities with declared, dynamic and embedded fields.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::RecordOptions;
use crate::error::{CatalogResult, ValidationError};
use crate::identity::{node_identity, IdentityPart};
use crate::record::NodeRecord;
use crate::registry::Registry;
use crate::schema::{non_finite, Direction, FieldDecl, FieldType, NodeSchema};
use crate::value::{Attributes, Value};

use super::relationship::{Relationship, RelationshipBuilder};
use super::RESERVED_NODE_KEYS;

/// Node values held by an embedded field.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedded {
    /// A single embedded node.
    One(Box<Node>),
    /// An ordered list of embedded nodes.
    Many(Vec<Node>),
}

impl Embedded {
    /// Iterates the embedded nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        let (one, many): (Option<&Node>, &[Node]) = match self {
            Self::One(node) => (Some(node.as_ref()), &[]),
            Self::Many(nodes) => (None, nodes.as_slice()),
        };
        one.into_iter().chain(many.iter())
    }

    /// Embedded node ids as they contribute to identity: a string for a
    /// single node, a sorted list for a node list.
    #[must_use]
    pub fn identity_value(&self) -> Json {
        match self {
            Self::One(node) => Json::String(node.node_id().to_string()),
            Self::Many(nodes) => {
                let mut ids: Vec<&str> = nodes.iter().map(Node::node_id).collect();
                ids.sort_unstable();
                Json::Array(ids.into_iter().map(|id| Json::String(id.to_string())).collect())
            }
        }
    }

    /// Returns true for an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(nodes) if nodes.is_empty())
    }
}

/// Identity-bearing reference to a node: never the node's fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    /// Primary label of the referenced node.
    pub primary_label: String,
    /// Identity of the referenced node.
    pub node_id: String,
    /// Full label set (primary included).
    pub labels: BTreeSet<String>,
}

impl From<&Node> for NodeRef {
    fn from(node: &Node) -> Self {
        Self {
            primary_label: node.primary_label().to_string(),
            node_id: node.node_id().to_string(),
            labels: node.label_set(),
        }
    }
}

impl From<Node> for NodeRef {
    fn from(node: Node) -> Self {
        Self::from(&node)
    }
}

/// A concrete node.
///
/// Built only through [`NodeBuilder`] (or [`Registry::create_node`] for
/// classifiable types), so every instance has passed validation and carries
/// a computed identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    schema: Arc<NodeSchema>,
    additional_labels: BTreeSet<String>,
    properties: Attributes,
    dynamic: Attributes,
    embedded: BTreeMap<String, Embedded>,
    node_id: String,
}

impl Node {
    /// Starts building a node of `schema`.
    #[must_use]
    pub fn builder(schema: Arc<NodeSchema>) -> NodeBuilder {
        NodeBuilder::new(schema)
    }

    /// The node's type descriptor.
    #[must_use]
    pub const fn schema(&self) -> &Arc<NodeSchema> {
        &self.schema
    }

    /// Class name of the node's type.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.schema.class_name
    }

    /// Primary label of the node's type.
    #[must_use]
    pub fn primary_label(&self) -> &str {
        &self.schema.primary_label
    }

    /// Stable identity derived from the identifying fields.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Labels beyond the primary one.
    #[must_use]
    pub const fn additional_labels(&self) -> &BTreeSet<String> {
        &self.additional_labels
    }

    /// All labels: primary first, then additional labels sorted.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        std::iter::once(self.schema.primary_label.clone())
            .chain(self.additional_labels.iter().cloned())
            .collect()
    }

    /// All labels as a set.
    #[must_use]
    pub fn label_set(&self) -> BTreeSet<String> {
        self.labels().into_iter().collect()
    }

    /// Returns true if the node carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.schema.primary_label == label || self.additional_labels.contains(label)
    }

    /// Looks up a declared or dynamic field. Absent fields are `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .get(name)
            .or_else(|| self.dynamic.get(name))
            .filter(|v| !v.is_null())
    }

    /// Declared (non-embedded) fields, including absent ones as null.
    #[must_use]
    pub const fn properties(&self) -> &Attributes {
        &self.properties
    }

    /// Properties not declared by the schema.
    #[must_use]
    pub const fn dynamic_properties(&self) -> &Attributes {
        &self.dynamic
    }

    /// The embedded node(s) stored under `field`.
    #[must_use]
    pub fn embedded(&self, field: &str) -> Option<&Embedded> {
        self.embedded.get(field)
    }

    /// All embedded fields.
    #[must_use]
    pub const fn embedded_fields(&self) -> &BTreeMap<String, Embedded> {
        &self.embedded
    }

    /// Present declared and dynamic values as one flat map.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.properties
            .iter()
            .chain(self.dynamic.iter())
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// A builder pre-filled with this node's content.
    #[must_use]
    pub fn to_builder(&self) -> NodeBuilder {
        NodeBuilder {
            schema: Arc::clone(&self.schema),
            attributes: self.attributes(),
            labels: self.additional_labels.clone(),
            embedded: self.embedded.clone(),
        }
    }

    /// Adds the label mapped to `role`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRole` if the type declares no such role.
    pub fn add_role(&mut self, role: &str) -> Result<(), ValidationError> {
        let label = self.role_label(role)?;
        if label != self.schema.primary_label {
            self.additional_labels.insert(label);
        }
        Ok(())
    }

    /// Removes the label mapped to `role`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRole` if the type declares no such role.
    pub fn remove_role(&mut self, role: &str) -> Result<(), ValidationError> {
        let label = self.role_label(role)?;
        self.additional_labels.remove(&label);
        Ok(())
    }

    /// Returns true if the role's label is present.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.schema
            .role_label(role)
            .is_some_and(|label| self.has_label(label))
    }

    fn role_label(&self, role: &str) -> Result<String, ValidationError> {
        self.schema
            .role_label(role)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::UnknownRole {
                class_name: self.schema.class_name.clone(),
                role: role.to_string(),
            })
    }

    /// Merges `other` into a new node using each field's merge strategy.
    ///
    /// # Errors
    ///
    /// Fails on different types, conflicting values or a strategy applied to
    /// values it cannot combine.
    pub fn merge(&self, other: &Self) -> CatalogResult<Self> {
        crate::merge::merge_nodes(self, other)
    }

    /// Projects the node into its canonical record.
    #[must_use]
    pub fn to_record(&self, separate_dynamic_properties: bool) -> NodeRecord {
        let mut identifying = serde_json::Map::new();
        let mut properties = serde_json::Map::new();

        for field in self.schema.fields.iter().filter(|f| f.serialize && !f.is_embedded()) {
            let value = self.properties.get(&field.name).map_or(Json::Null, Value::to_json);
            if field.identifying {
                identifying.insert(field.name.clone(), value);
            } else {
                properties.insert(field.name.clone(), value);
            }
        }

        let dynamic: serde_json::Map<String, Json> = self
            .dynamic
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();

        let dynamic_properties = if separate_dynamic_properties {
            Some(dynamic)
        } else {
            properties.extend(dynamic);
            None
        };

        NodeRecord {
            node_id: self.node_id.clone(),
            schema_version: self.schema.schema_version.clone(),
            primary_label: self.schema.primary_label.clone(),
            labels: self.labels(),
            identifying_properties: identifying,
            properties,
            dynamic_properties,
        }
    }

    /// Renders the canonical record as JSON.
    ///
    /// # Errors
    ///
    /// `CatalogError::Serialization` if the record cannot be serialized.
    pub fn to_json(&self, options: &RecordOptions) -> CatalogResult<Json> {
        self.to_record(options.separate_dynamic_properties)
            .to_json(options.encode_containers)
    }

    /// Derives relationship entities from embedded node fields.
    ///
    /// Direction `OUT` makes this node the start; `IN` makes the embedded
    /// node the start.
    ///
    /// # Errors
    ///
    /// Fails if a configured relationship class is unknown or the endpoints
    /// are not a valid pair for it.
    pub fn create_relationships(&self, registry: &Registry) -> CatalogResult<Vec<Relationship>> {
        let mut relationships = Vec::new();
        for field in self.schema.fields.iter().filter(|f| f.is_embedded()) {
            let (Some(config), Some(embedded)) = (&field.embedded, self.embedded.get(&field.name)) else {
                continue;
            };
            let schema = registry.get_relationship_class(&config.relationship)?;
            for target in embedded.nodes() {
                let (start, end) = match config.direction {
                    Direction::Out => (NodeRef::from(self), NodeRef::from(target)),
                    Direction::In => (NodeRef::from(target), NodeRef::from(self)),
                };
                relationships.push(RelationshipBuilder::new(Arc::clone(schema), start, end).build()?);
            }
        }
        Ok(relationships)
    }
}

/// Builder for [`Node`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ziptie_schema::{FieldDecl, FieldType, Node, NodeSchema};
///
/// let schema = Arc::new(
///     NodeSchema::new("Host").field(FieldDecl::new("name", FieldType::String).identifying()),
/// );
/// let node = Node::builder(schema).attr("name", "db1").build().unwrap();
///
/// assert_eq!(node.get("name").and_then(|v| v.as_str()), Some("db1"));
/// assert_eq!(node.labels(), vec!["Host".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    schema: Arc<NodeSchema>,
    attributes: Attributes,
    labels: BTreeSet<String>,
    embedded: BTreeMap<String, Embedded>,
}

impl NodeBuilder {
    /// Starts a builder for `schema` with no attributes.
    #[must_use]
    pub fn new(schema: Arc<NodeSchema>) -> Self {
        Self {
            schema,
            attributes: Attributes::new(),
            labels: BTreeSet::new(),
            embedded: BTreeMap::new(),
        }
    }

    /// Sets one raw attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets many raw attributes, replacing existing keys.
    #[must_use]
    pub fn attrs(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Adds an additional label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Adds additional labels.
    #[must_use]
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Sets a single embedded node.
    #[must_use]
    pub fn embed_one(mut self, field: impl Into<String>, node: Node) -> Self {
        self.embedded.insert(field.into(), Embedded::One(Box::new(node)));
        self
    }

    /// Sets a list of embedded nodes.
    #[must_use]
    pub fn embed_many(mut self, field: impl Into<String>, nodes: Vec<Node>) -> Self {
        self.embedded.insert(field.into(), Embedded::Many(nodes));
        self
    }

    /// Sets an embedded field.
    #[must_use]
    pub fn embed(mut self, field: impl Into<String>, embedded: Embedded) -> Self {
        self.embedded.insert(field.into(), embedded);
        self
    }

    /// Validates the input and builds the node.
    ///
    /// # Errors
    ///
    /// Fails on classifiable types, label mismatches, coercion, normalizer or
    /// validator failures, missing required fields, unknown fields on strict
    /// types and mistyped embedded nodes.
    pub fn build(self) -> CatalogResult<Node> {
        let Self {
            schema,
            mut attributes,
            mut labels,
            mut embedded,
        } = self;

        if schema.is_classifiable() {
            return Err(ValidationError::AbstractType {
                class_name: schema.class_name.clone(),
            }
            .into());
        }

        attributes.retain(|key, _| !schema.is_ignored(key));
        take_reserved(&schema, &mut attributes, &mut labels)?;

        let mut properties = Attributes::new();
        let mut kept_embedded = BTreeMap::new();
        for field in &schema.fields {
            if field.is_embedded() {
                if let Some(value) = attributes.remove(&field.name) {
                    return Err(embedded_type_error(field, value.type_name()).into());
                }
                if let Some(nodes) = embedded.remove(&field.name) {
                    check_embedded(field, &nodes)?;
                    if !nodes.is_empty() {
                        kept_embedded.insert(field.name.clone(), nodes);
                    }
                } else if field.required {
                    return Err(missing(&schema, field).into());
                }
                continue;
            }

            let mut value = attributes.remove(&field.name).unwrap_or_default();
            if value.is_null() {
                value = field.default.produce();
            }
            let value = field.prepare(value)?;
            if value.is_null() && field.required {
                return Err(missing(&schema, field).into());
            }
            properties.insert(field.name.clone(), value);
        }

        if let Some(field) = embedded.into_keys().next() {
            return Err(ValidationError::UnknownField {
                class_name: schema.class_name.clone(),
                field,
            }
            .into());
        }

        let mut dynamic = Attributes::new();
        for (key, value) in attributes {
            if value.is_null() {
                continue;
            }
            if !schema.allows_dynamic {
                return Err(ValidationError::UnknownField {
                    class_name: schema.class_name.clone(),
                    field: key,
                }
                .into());
            }
            if !value.is_finite() {
                return Err(non_finite(&key, "finite value").into());
            }
            dynamic.insert(key, value);
        }

        labels.extend(schema.static_labels.iter().cloned());
        if let Some(enricher) = schema.label_enricher {
            let view: Attributes = properties
                .iter()
                .chain(dynamic.iter())
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            labels.extend((enricher.func)(&view));
        }
        labels.remove(&schema.primary_label);

        let parts: Vec<IdentityPart> = schema
            .identifying_fields()
            .map(|field| {
                let value = if field.is_embedded() {
                    kept_embedded.get(&field.name).map_or_else(
                        || absent_embedded_identity(field.field_type),
                        Embedded::identity_value,
                    )
                } else {
                    properties.get(&field.name).map_or(Json::Null, Value::to_json)
                };
                (field.name.clone(), value)
            })
            .collect();
        let node_id = node_identity(&schema.primary_label, &parts);

        Ok(Node {
            schema,
            additional_labels: labels,
            properties,
            dynamic,
            embedded: kept_embedded,
            node_id,
        })
    }
}

pub(crate) fn absent_embedded_identity(field_type: FieldType) -> Json {
    match field_type {
        FieldType::NodeList => Json::Array(Vec::new()),
        _ => Json::Null,
    }
}

fn missing(schema: &NodeSchema, field: &FieldDecl) -> ValidationError {
    ValidationError::MissingField {
        class_name: schema.class_name.clone(),
        field: field.name.clone(),
    }
}

fn embedded_type_error(field: &FieldDecl, actual: &str) -> ValidationError {
    let expected = field
        .embedded
        .as_ref()
        .map_or_else(|| field.field_type.to_string(), |c| c.node_class.clone());
    ValidationError::WrongEmbeddedType {
        field: field.name.clone(),
        expected,
        actual: actual.to_string(),
    }
}

fn check_embedded(field: &FieldDecl, nodes: &Embedded) -> Result<(), ValidationError> {
    match (field.field_type, nodes) {
        (FieldType::Node, Embedded::One(_)) | (FieldType::NodeList, Embedded::Many(_)) => {}
        (_, Embedded::One(_)) => return Err(embedded_type_error(field, "node")),
        (_, Embedded::Many(_)) => return Err(embedded_type_error(field, "node_list")),
    }
    let Some(config) = &field.embedded else {
        return Ok(());
    };
    for node in nodes.nodes() {
        if node.class_name() != config.node_class && !node.has_label(&config.node_class) {
            return Err(embedded_type_error(field, node.class_name()));
        }
    }
    Ok(())
}

fn take_reserved(
    schema: &NodeSchema,
    attributes: &mut Attributes,
    labels: &mut BTreeSet<String>,
) -> Result<(), ValidationError> {
    if let Some(Value::String(primary)) = attributes.get("primary_label") {
        if *primary != schema.primary_label {
            return Err(ValidationError::LabelMismatch {
                class_name: schema.class_name.clone(),
                expected: schema.primary_label.clone(),
                actual: primary.clone(),
            });
        }
    }
    match attributes.remove("additional_labels") {
        Some(Value::List(items)) => {
            labels.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
        Some(Value::String(label)) => {
            labels.insert(label);
        }
        _ => {}
    }
    for key in RESERVED_NODE_KEYS {
        attributes.remove(*key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MergeStrategy;
    use crate::transforms::{ENRICH_DOMAIN_LABELS, VALIDATE_DOMAIN};

    fn domain_schema() -> Arc<NodeSchema> {
        Arc::new(
            NodeSchema::new("Domain")
                .field(
                    FieldDecl::new("address", FieldType::String)
                        .identifying()
                        .validator(VALIDATE_DOMAIN),
                )
                .field(FieldDecl::new("registrar", FieldType::String).merge(MergeStrategy::TakeAnyNonEmpty))
                .enricher(ENRICH_DOMAIN_LABELS)
                .role("mail_server", "MailServer"),
        )
    }

    fn open_schema() -> Arc<NodeSchema> {
        Arc::new(
            NodeSchema::new("Device")
                .field(FieldDecl::new("serial", FieldType::String).identifying())
                .allow_dynamic(),
        )
    }

    #[test]
    fn test_build_applies_defaults() {
        let node = Node::builder(domain_schema())
            .attr("address", "example.com")
            .build()
            .unwrap();
        assert_eq!(node.get("count"), Some(&Value::Int(1)));
        assert!(matches!(node.get("created_at"), Some(Value::DateTime(_))));
        assert_eq!(node.get("registrar"), None);
        assert!(node.properties().contains_key("registrar"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = Node::builder(domain_schema()).build().unwrap_err();
        assert!(matches!(
            err,
            crate::CatalogError::Validation(ValidationError::MissingField { ref field, .. }) if field == "address"
        ));
    }

    #[test]
    fn test_validator_rejects() {
        let err = Node::builder(domain_schema())
            .attr("address", "localhost")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::CatalogError::Validation(ValidationError::ValidatorRejected { .. })
        ));
    }

    #[test]
    fn test_strict_type_rejects_unknown_field() {
        let err = Node::builder(domain_schema())
            .attr("address", "example.com")
            .attr("color", "blue")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::CatalogError::Validation(ValidationError::UnknownField { ref field, .. }) if field == "color"
        ));
    }

    #[test]
    fn test_non_finite_dynamic_value_rejected() {
        let err = Node::builder(open_schema())
            .attr("serial", "A1")
            .attr("rtt_ms", f64::INFINITY)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::CatalogError::Validation(ValidationError::WrongType { ref field, .. }) if field == "rtt_ms"
        ));
    }

    #[test]
    fn test_dynamic_fields_and_ignored_properties() {
        let node = Node::builder(open_schema())
            .attr("serial", "A1")
            .attr("vendor", "acme")
            .attr("context", "scan-42")
            .attr("empty", Value::Null)
            .build()
            .unwrap();
        assert_eq!(node.dynamic_properties().len(), 1);
        assert_eq!(node.get("vendor"), Some(&Value::from("acme")));
        assert_eq!(node.get("context"), None);
    }

    #[test]
    fn test_identity_ignores_dynamic_content() {
        let a = Node::builder(open_schema()).attr("serial", "A1").build().unwrap();
        let b = Node::builder(open_schema())
            .attr("serial", "A1")
            .attr("vendor", "acme")
            .attr("count", 9)
            .build()
            .unwrap();
        assert_eq!(a.node_id(), b.node_id());
    }

    #[test]
    fn test_enricher_and_roles() {
        let mut node = Node::builder(domain_schema())
            .attr("address", "www.example.com")
            .build()
            .unwrap();
        assert!(node.has_label("WebServer"));
        assert!(!node.has_role("mail_server"));

        node.add_role("mail_server").unwrap();
        assert!(node.has_role("mail_server"));
        assert_eq!(node.labels(), vec!["Domain", "MailServer", "WebServer"]);

        node.remove_role("mail_server").unwrap();
        assert!(!node.has_role("mail_server"));
        assert!(node.add_role("dns_server").is_err());
    }

    #[test]
    fn test_primary_label_mismatch() {
        let err = Node::builder(domain_schema())
            .attr("address", "example.com")
            .attr("primary_label", "Email")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::CatalogError::Validation(ValidationError::LabelMismatch { .. })
        ));
    }

    #[test]
    fn test_reserved_keys_are_not_fields() {
        let node = Node::builder(domain_schema())
            .attr("address", "example.com")
            .attr("primary_label", "Domain")
            .attr("node_id", "stale")
            .attr("additional_labels", vec!["Audit2024"])
            .build()
            .unwrap();
        assert!(node.has_label("Audit2024"));
        assert_ne!(node.node_id(), "stale");
    }

    #[test]
    fn test_record_partitions_fields() {
        let node = Node::builder(open_schema())
            .attr("serial", "A1")
            .attr("vendor", "acme")
            .build()
            .unwrap();

        let merged = node.to_record(false);
        assert!(merged.identifying_properties.contains_key("serial"));
        assert!(merged.properties.contains_key("vendor"));
        assert!(merged.dynamic_properties.is_none());

        let separated = node.to_record(true);
        assert!(!separated.properties.contains_key("vendor"));
        assert!(separated.dynamic_properties.unwrap().contains_key("vendor"));
    }

    #[test]
    fn test_strict_type_separated_dynamic_is_empty() {
        let node = Node::builder(domain_schema())
            .attr("address", "example.com")
            .build()
            .unwrap();
        let record = node.to_record(true);
        assert_eq!(record.dynamic_properties, Some(serde_json::Map::new()));
    }
}
