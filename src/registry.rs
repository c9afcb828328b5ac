//! Dual-keyed type registry.
//!
//! Node types are indexed by class name (every type, classifiable bases
//! included) and by primary label (concrete types only). Relationship types
//! are indexed by class name and relationship type. Each node type's fixed
//! label set (primary plus inherited static labels) backs best-match
//! resolution of arbitrary label sets.
//!
//! A registry is immutable once built and is shared by reference; `combine`
//! produces a new one.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::classify::classify;
use crate::entity::{Embedded, Node, NodeBuilder, NodeRef, Relationship, RelationshipBuilder};
use crate::error::{CatalogError, CatalogResult, NotFoundError, ValidationError};
use crate::record::{NodeRecord, RelationshipRecord};
use crate::schema::{FieldDecl, FieldType, NodeSchema, RelationshipSchema};
use crate::value::{attributes_from_json, Attributes, Value};

const FIELD_NAME_PATTERN: &str = r"^[a-z_][a-z0-9_]*$";
const LABEL_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Result of resolving a label set to a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatch {
    /// The winning type; may be a classifiable base.
    pub schema: Arc<NodeSchema>,
    /// Candidate labels outside the winner's fixed label set.
    pub extra_labels: BTreeSet<String>,
    /// Size of the intersection with the winner's label set.
    pub score: usize,
}

/// A stored graph node exposing labels and properties.
pub trait GraphNode {
    /// All labels on the stored node.
    fn labels(&self) -> Vec<String>;
    /// All properties on the stored node.
    fn properties(&self) -> Attributes;
}

/// A minimal [`GraphNode`] holding its labels and properties directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledRecord {
    /// Labels in stored order.
    pub labels: Vec<String>,
    /// Raw properties.
    pub properties: Attributes,
}

impl LabeledRecord {
    /// Creates a record from labels and properties.
    #[must_use]
    pub fn new<I, S>(labels: I, properties: Attributes) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            properties,
        }
    }
}

impl GraphNode for LabeledRecord {
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn properties(&self) -> Attributes {
        self.properties.clone()
    }
}

/// Collects schemas and validates them into a [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    strict: bool,
    nodes: Vec<Arc<NodeSchema>>,
    relationships: Vec<Arc<RelationshipSchema>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// A strict builder: duplicate keys are errors.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            strict: true,
            nodes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// When false, later registrations override earlier ones.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Adds a node schema.
    #[must_use]
    pub fn node(mut self, schema: NodeSchema) -> Self {
        self.nodes.push(Arc::new(schema));
        self
    }

    /// Adds a relationship schema.
    #[must_use]
    pub fn relationship(mut self, schema: RelationshipSchema) -> Self {
        self.relationships.push(Arc::new(schema));
        self
    }

    /// Validates every schema and builds the registry.
    ///
    /// # Errors
    ///
    /// Duplicate keys (strict mode), missing parents, inheritance cycles,
    /// malformed names and dangling embedded or valid-pair references.
    pub fn build(self) -> CatalogResult<Registry> {
        Registry::assemble(self.nodes, self.relationships, self.strict)
    }
}

/// Immutable catalog of node and relationship types.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: Vec<Arc<NodeSchema>>,
    relationships: Vec<Arc<RelationshipSchema>>,
    node_by_class: HashMap<String, usize>,
    node_by_label: HashMap<String, usize>,
    rel_by_class: HashMap<String, usize>,
    rel_by_type: HashMap<String, usize>,
    label_sets: Vec<BTreeSet<String>>,
}

fn duplicate(kind: &'static str, key: &str) -> CatalogError {
    ValidationError::DuplicateKey {
        kind,
        key: key.to_string(),
    }
    .into()
}

fn invalid(class_name: &str, reason: impl Into<String>) -> CatalogError {
    ValidationError::InvalidSchema {
        class_name: class_name.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn missing_key(key: &str) -> CatalogError {
    NotFoundError::MissingKey { key: key.to_string() }.into()
}

impl Registry {
    /// Starts a strict [`RegistryBuilder`].
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn assemble(
        node_inputs: Vec<Arc<NodeSchema>>,
        rel_inputs: Vec<Arc<RelationshipSchema>>,
        strict: bool,
    ) -> CatalogResult<Self> {
        let mut registry = Self::default();

        for schema in node_inputs {
            match registry.node_by_class.get(&schema.class_name) {
                Some(_) if strict => return Err(duplicate("node class", &schema.class_name)),
                Some(&idx) => {
                    debug!(class = %schema.class_name, "overriding node class");
                    registry.nodes[idx] = schema;
                }
                None => {
                    registry
                        .node_by_class
                        .insert(schema.class_name.clone(), registry.nodes.len());
                    registry.nodes.push(schema);
                }
            }
        }

        for schema in rel_inputs {
            match registry.rel_by_class.get(&schema.class_name) {
                Some(_) if strict => return Err(duplicate("relationship class", &schema.class_name)),
                Some(&idx) => {
                    debug!(class = %schema.class_name, "overriding relationship class");
                    registry.relationships[idx] = schema;
                }
                None => {
                    registry
                        .rel_by_class
                        .insert(schema.class_name.clone(), registry.relationships.len());
                    registry.relationships.push(schema);
                }
            }
        }

        for (idx, schema) in registry.nodes.iter().enumerate() {
            if schema.is_classifiable() {
                continue;
            }
            if let Some(previous) = registry.node_by_label.insert(schema.primary_label.clone(), idx) {
                if strict {
                    return Err(duplicate("node label", &schema.primary_label));
                }
                debug!(
                    label = %schema.primary_label,
                    previous = %registry.nodes[previous].class_name,
                    current = %schema.class_name,
                    "overriding node label"
                );
            }
        }

        for (idx, schema) in registry.relationships.iter().enumerate() {
            if let Some(previous) = registry.rel_by_type.insert(schema.rel_type.clone(), idx) {
                if strict {
                    return Err(duplicate("relationship type", &schema.rel_type));
                }
                debug!(
                    rel_type = %schema.rel_type,
                    previous = %registry.relationships[previous].class_name,
                    current = %schema.class_name,
                    "overriding relationship type"
                );
            }
        }

        registry.label_sets = registry.nodes.iter().map(|s| s.labels()).collect();
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> CatalogResult<()> {
        let field_name = Regex::new(FIELD_NAME_PATTERN).map_err(|e| CatalogError::config(e.to_string()))?;
        let label = Regex::new(LABEL_PATTERN).map_err(|e| CatalogError::config(e.to_string()))?;
        let known_labels: HashSet<&str> = self
            .label_sets
            .iter()
            .flat_map(|set| set.iter().map(String::as_str))
            .collect();

        for schema in &self.nodes {
            let name = &schema.class_name;
            for l in std::iter::once(&schema.primary_label)
                .chain(schema.static_labels.iter())
                .chain(schema.roles.iter().map(|r| &r.label))
            {
                if !label.is_match(l) {
                    return Err(invalid(name, format!("malformed label '{l}'")));
                }
            }
            if let Some(parent) = &schema.parent {
                if !self.node_by_class.contains_key(parent) {
                    return Err(invalid(name, format!("parent '{parent}' is not registered")));
                }
                if self.ancestors(name).any(|a| a == name.as_str()) {
                    return Err(invalid(name, "inheritance cycle"));
                }
            }
            for field in &schema.fields {
                self.validate_field(name, field, &field_name)?;
            }
        }

        for schema in &self.relationships {
            let name = &schema.class_name;
            if !label.is_match(&schema.rel_type) {
                return Err(invalid(name, format!("malformed relationship type '{}'", schema.rel_type)));
            }
            for field in &schema.fields {
                if field.is_embedded() || field.embedded.is_some() {
                    return Err(invalid(name, format!("relationship field '{}' cannot embed nodes", field.name)));
                }
                self.validate_field(name, field, &field_name)?;
            }
            for (start, end) in &schema.valid_pairs {
                for l in [start, end] {
                    if !known_labels.contains(l.as_str()) {
                        return Err(invalid(name, format!("valid pair references unknown label '{l}'")));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_field(&self, class_name: &str, field: &FieldDecl, pattern: &Regex) -> CatalogResult<()> {
        if !pattern.is_match(&field.name) {
            return Err(invalid(class_name, format!("malformed field name '{}'", field.name)));
        }
        match (&field.embedded, field.is_embedded()) {
            (Some(config), true) => {
                if !self.node_by_class.contains_key(&config.node_class) {
                    return Err(invalid(
                        class_name,
                        format!("embedded field '{}' targets unknown class '{}'", field.name, config.node_class),
                    ));
                }
                if !self.rel_by_class.contains_key(&config.relationship) {
                    return Err(invalid(
                        class_name,
                        format!(
                            "embedded field '{}' uses unknown relationship '{}'",
                            field.name, config.relationship
                        ),
                    ));
                }
                Ok(())
            }
            (None, false) => Ok(()),
            _ => Err(invalid(
                class_name,
                format!("field '{}' must be node-typed exactly when it embeds nodes", field.name),
            )),
        }
    }

    // Walks parent links; bounded by the number of types so cycles terminate.
    fn ancestors<'a>(&'a self, class_name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let mut current = self
            .node_by_class
            .get(class_name)
            .and_then(|&idx| self.nodes[idx].parent.as_deref());
        let mut remaining = self.nodes.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let parent = current?;
            current = self
                .node_by_class
                .get(parent)
                .and_then(|&idx| self.nodes[idx].parent.as_deref());
            Some(parent)
        })
    }

    /// Combines registries; later sources override earlier ones unless
    /// `strict`, in which case any duplicate class name, node label,
    /// relationship class or relationship type is an error.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` in strict mode, or any validation error of the
    /// combined set.
    pub fn combine(registries: &[&Self], strict: bool) -> CatalogResult<Self> {
        let nodes = registries.iter().flat_map(|r| r.nodes.iter().cloned()).collect();
        let relationships = registries
            .iter()
            .flat_map(|r| r.relationships.iter().cloned())
            .collect();
        let combined = Self::assemble(nodes, relationships, strict)?;
        debug!(
            sources = registries.len(),
            node_classes = combined.nodes.len(),
            relationship_classes = combined.relationships.len(),
            strict,
            "combined registries"
        );
        Ok(combined)
    }

    /// Looks up any node type by class name.
    ///
    /// # Errors
    ///
    /// `NotFoundError::NodeClass` listing the registered class names.
    pub fn get_node_class(&self, class_name: &str) -> CatalogResult<&Arc<NodeSchema>> {
        self.node_by_class
            .get(class_name)
            .map(|&idx| &self.nodes[idx])
            .ok_or_else(|| {
                NotFoundError::NodeClass {
                    name: class_name.to_string(),
                    available: self.list_node_classes(),
                }
                .into()
            })
    }

    /// Looks up a concrete node type by primary label.
    ///
    /// # Errors
    ///
    /// `NotFoundError::NodeLabel` listing the registered labels.
    pub fn get_node_by_label(&self, label: &str) -> CatalogResult<&Arc<NodeSchema>> {
        self.node_by_label
            .get(label)
            .map(|&idx| &self.nodes[idx])
            .ok_or_else(|| {
                NotFoundError::NodeLabel {
                    label: label.to_string(),
                    available: self.list_primary_labels(),
                }
                .into()
            })
    }

    /// # Errors
    ///
    /// `NotFoundError::RelationshipClass` listing the registered classes.
    pub fn get_relationship_class(&self, class_name: &str) -> CatalogResult<&Arc<RelationshipSchema>> {
        self.rel_by_class
            .get(class_name)
            .map(|&idx| &self.relationships[idx])
            .ok_or_else(|| {
                NotFoundError::RelationshipClass {
                    name: class_name.to_string(),
                    available: self.list_relationship_classes(),
                }
                .into()
            })
    }

    /// # Errors
    ///
    /// `NotFoundError::RelationshipType` listing the registered types.
    pub fn get_relationship_by_type(&self, rel_type: &str) -> CatalogResult<&Arc<RelationshipSchema>> {
        self.rel_by_type
            .get(rel_type)
            .map(|&idx| &self.relationships[idx])
            .ok_or_else(|| {
                NotFoundError::RelationshipType {
                    rel_type: rel_type.to_string(),
                    available: self.list_relationship_types(),
                }
                .into()
            })
    }

    /// All node class names in registration order.
    #[must_use]
    pub fn list_node_classes(&self) -> Vec<String> {
        self.nodes.iter().map(|s| s.class_name.clone()).collect()
    }

    /// Relationship class names in registration order.
    #[must_use]
    pub fn list_relationship_classes(&self) -> Vec<String> {
        self.relationships.iter().map(|s| s.class_name.clone()).collect()
    }

    /// Primary labels of concrete node types.
    #[must_use]
    pub fn list_primary_labels(&self) -> Vec<String> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(idx, s)| self.node_by_label.get(&s.primary_label) == Some(idx))
            .map(|(_, s)| s.primary_label.clone())
            .collect()
    }

    /// Primary labels of every node type, classifiable bases included.
    #[must_use]
    pub fn list_all_primary_labels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .filter(|s| seen.insert(s.primary_label.as_str()))
            .map(|s| s.primary_label.clone())
            .collect()
    }

    /// Relationship types in registration order.
    #[must_use]
    pub fn list_relationship_types(&self) -> Vec<String> {
        self.relationships
            .iter()
            .enumerate()
            .filter(|(idx, s)| self.rel_by_type.get(&s.rel_type) == Some(idx))
            .map(|(_, s)| s.rel_type.clone())
            .collect()
    }

    /// Iterates node schemas in registration order.
    pub fn node_classes(&self) -> impl Iterator<Item = &Arc<NodeSchema>> {
        self.nodes.iter()
    }

    /// Iterates relationship schemas in registration order.
    pub fn relationship_classes(&self) -> impl Iterator<Item = &Arc<RelationshipSchema>> {
        self.relationships.iter()
    }

    fn index_for_label(&self, label: &str) -> Option<usize> {
        self.node_by_label
            .get(label)
            .copied()
            .or_else(|| self.nodes.iter().position(|s| s.primary_label == label))
    }

    /// The fixed label set of the type whose primary label is `label`.
    ///
    /// # Errors
    ///
    /// `NotFoundError::NodeLabel` if no type has that primary label.
    pub fn labels_for(&self, label: &str) -> CatalogResult<BTreeSet<String>> {
        self.index_for_label(label)
            .map(|idx| self.label_sets[idx].clone())
            .ok_or_else(|| {
                NotFoundError::NodeLabel {
                    label: label.to_string(),
                    available: self.list_all_primary_labels(),
                }
                .into()
            })
    }

    /// Returns true if `child` is a direct or indirect subtype of `parent`.
    #[must_use]
    pub fn is_subtype(&self, child: &str, parent: &str) -> bool {
        self.ancestors(child).any(|a| a == parent)
    }

    /// Resolves a label set to the best-matching node type.
    ///
    /// Candidates are ranked by intersection size with each type's fixed
    /// label set. Ties go to the type with fewer of its own labels missing
    /// from the candidate set, then to registration order. A classifiable
    /// base wins over its subtypes unless a subtype label is present, so
    /// callers building nodes must classify when the winner is abstract.
    ///
    /// # Errors
    ///
    /// `NotFoundError::NoLabelMatch` when no type shares any label.
    pub fn best_match<I, S>(&self, labels: I) -> CatalogResult<LabelMatch>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidate: BTreeSet<String> = labels.into_iter().map(|l| l.as_ref().to_string()).collect();

        let mut best: Option<(usize, usize, usize)> = None;
        for (idx, set) in self.label_sets.iter().enumerate() {
            let score = set.intersection(&candidate).count();
            if score == 0 {
                continue;
            }
            let missing = set.len() - score;
            let better = match best {
                None => true,
                Some((_, best_score, best_missing)) => {
                    score > best_score || (score == best_score && missing < best_missing)
                }
            };
            if better {
                best = Some((idx, score, missing));
            }
        }

        let Some((idx, score, _)) = best else {
            return Err(NotFoundError::NoLabelMatch {
                labels: candidate.into_iter().collect(),
                available: self.list_primary_labels(),
            }
            .into());
        };

        let schema = Arc::clone(&self.nodes[idx]);
        let extra_labels: BTreeSet<String> = candidate.difference(&self.label_sets[idx]).cloned().collect();
        debug!(
            resolved = %schema.class_name,
            score,
            extras = extra_labels.len(),
            "resolved label set"
        );
        Ok(LabelMatch {
            schema,
            extra_labels,
            score,
        })
    }

    /// Builds a node of `class_name` from raw attributes, classifying first
    /// when the type is classifiable.
    ///
    /// Embedded fields may be given as nested maps (or lists of maps) and are
    /// built as nodes of their configured class.
    ///
    /// # Errors
    ///
    /// Lookup, classification and validation errors.
    pub fn create_node(&self, class_name: &str, attributes: Attributes) -> CatalogResult<Node> {
        let schema = self.get_node_class(class_name)?;
        let schema = if schema.is_classifiable() {
            classify(self, class_name, &attributes)?
        } else {
            Arc::clone(schema)
        };
        self.builder_for(schema, attributes)?.build()
    }

    fn builder_for(&self, schema: Arc<NodeSchema>, mut attributes: Attributes) -> CatalogResult<NodeBuilder> {
        let mut embedded = Vec::new();
        for field in schema.fields.iter().filter(|f| f.is_embedded()) {
            let Some(config) = &field.embedded else {
                continue;
            };
            let Some(raw) = attributes.remove(&field.name) else {
                continue;
            };
            let value = match (field.field_type, raw) {
                (_, Value::Null) => continue,
                (FieldType::Node, Value::Map(map)) => {
                    Embedded::One(Box::new(self.create_node(&config.node_class, map)?))
                }
                (FieldType::NodeList, Value::List(items)) => {
                    let mut nodes = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Map(map) => nodes.push(self.create_node(&config.node_class, map)?),
                            other => {
                                return Err(ValidationError::WrongEmbeddedType {
                                    field: field.name.clone(),
                                    expected: config.node_class.clone(),
                                    actual: other.type_name().to_string(),
                                }
                                .into());
                            }
                        }
                    }
                    Embedded::Many(nodes)
                }
                (_, other) => {
                    return Err(ValidationError::WrongEmbeddedType {
                        field: field.name.clone(),
                        expected: config.node_class.clone(),
                        actual: other.type_name().to_string(),
                    }
                    .into());
                }
            };
            embedded.push((field.name.clone(), value));
        }

        let mut builder = NodeBuilder::new(schema).attrs(attributes);
        for (field, value) in embedded {
            builder = builder.embed(field, value);
        }
        Ok(builder)
    }

    fn node_for_label(&self, primary_label: &str, attributes: Attributes) -> CatalogResult<Node> {
        if let Ok(schema) = self.get_node_by_label(primary_label) {
            return self.builder_for(Arc::clone(schema), attributes)?.build();
        }
        match self.nodes.iter().find(|s| s.primary_label == primary_label) {
            Some(base) => self.create_node(&base.class_name, attributes),
            None => Err(NotFoundError::NodeLabel {
                label: primary_label.to_string(),
                available: self.list_primary_labels(),
            }
            .into()),
        }
    }

    /// Builds a node from a flat map carrying `primary_label` and fields.
    ///
    /// A `labels` list, when present, contributes additional labels.
    /// A primary label belonging to a classifiable base is classified.
    ///
    /// # Errors
    ///
    /// `MissingKey` without `primary_label`, lookup and validation errors.
    pub fn deserialize_node(&self, data: &Map<String, Json>) -> CatalogResult<Node> {
        let primary = data
            .get("primary_label")
            .and_then(Json::as_str)
            .ok_or_else(|| missing_key("primary_label"))?;
        let mut attributes = attributes_from_json(data);
        let mut extra = Vec::new();
        if let Some(Value::List(labels)) = attributes.remove("labels") {
            extra.extend(labels.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if !extra.is_empty() {
            let existing = attributes.remove("additional_labels");
            let mut all: Vec<Value> = match existing {
                Some(Value::List(items)) => items,
                Some(Value::String(s)) => vec![Value::String(s)],
                _ => Vec::new(),
            };
            all.extend(extra.into_iter().filter(|l| l != primary).map(Value::String));
            attributes.insert("additional_labels".to_string(), Value::List(all));
        }
        self.node_for_label(primary, attributes)
    }

    /// Builds a node by best-matching `labels`; unmatched labels become
    /// additional labels.
    ///
    /// # Errors
    ///
    /// `NoLabelMatch` and validation errors.
    pub fn deserialize_node_from_labels<I, S>(&self, labels: I, data: &Map<String, Json>) -> CatalogResult<Node>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.node_from_labels(labels, attributes_from_json(data))
    }

    fn node_from_labels<I, S>(&self, labels: I, attributes: Attributes) -> CatalogResult<Node>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matched = self.best_match(labels)?;
        let schema = if matched.schema.is_classifiable() {
            classify(self, &matched.schema.class_name, &attributes)?
        } else {
            matched.schema
        };
        let fixed = schema.labels();
        let extras: Vec<String> = matched
            .extra_labels
            .into_iter()
            .filter(|l| !fixed.contains(l))
            .collect();
        self.builder_for(schema, attributes)?.labels(extras).build()
    }

    /// Builds a node from a stored graph node, falling back to the
    /// `primary_label` property when it carries no labels.
    ///
    /// # Errors
    ///
    /// Lookup and validation errors.
    pub fn deserialize_graph_node(&self, node: &impl GraphNode) -> CatalogResult<Node> {
        let labels = node.labels();
        let properties = node.properties();
        if labels.is_empty() {
            let primary = properties
                .get("primary_label")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| missing_key("primary_label"))?;
            return self.node_for_label(&primary, properties);
        }
        self.node_from_labels(labels, properties)
    }

    fn endpoint(&self, data: &Map<String, Json>, key: &str) -> CatalogResult<NodeRef> {
        let endpoint = data
            .get(key)
            .and_then(Json::as_object)
            .ok_or_else(|| missing_key(key))?;
        let primary_label = endpoint
            .get("primary_label")
            .and_then(Json::as_str)
            .ok_or_else(|| missing_key(&format!("{key}.primary_label")))?;
        let node_id = endpoint
            .get("node_id")
            .and_then(Json::as_str)
            .ok_or_else(|| missing_key(&format!("{key}.node_id")))?;
        let mut labels = self.labels_for(primary_label)?;
        if let Some(extra) = endpoint.get("labels").and_then(Json::as_array) {
            labels.extend(extra.iter().filter_map(Json::as_str).map(str::to_string));
        }
        Ok(NodeRef {
            primary_label: primary_label.to_string(),
            node_id: node_id.to_string(),
            labels,
        })
    }

    /// Builds a relationship from a flat map with `rel_type`, `start_node`
    /// and `end_node` (each `{primary_label, node_id}`) plus fields.
    ///
    /// # Errors
    ///
    /// `MissingKey`, lookup, endpoint and field validation errors.
    pub fn deserialize_relationship(&self, data: &Map<String, Json>) -> CatalogResult<Relationship> {
        let rel_type = data
            .get("rel_type")
            .and_then(Json::as_str)
            .ok_or_else(|| missing_key("rel_type"))?;
        let schema = self.get_relationship_by_type(rel_type)?;
        let start = self.endpoint(data, "start_node")?;
        let end = self.endpoint(data, "end_node")?;
        RelationshipBuilder::new(Arc::clone(schema), start, end)
            .attrs(attributes_from_json(data))
            .build()
    }

    /// Rebuilds a node from its canonical record.
    ///
    /// # Errors
    ///
    /// Lookup and validation errors.
    pub fn node_from_record(&self, record: &NodeRecord) -> CatalogResult<Node> {
        let schema = self.get_node_by_label(&record.primary_label)?;
        let extras = record.labels.iter().filter(|l| **l != record.primary_label).cloned();
        self.builder_for(Arc::clone(schema), attributes_from_json(&record.flattened_properties()))?
            .labels(extras)
            .build()
    }

    /// Rebuilds a relationship from its canonical record.
    ///
    /// # Errors
    ///
    /// Lookup, endpoint and validation errors.
    pub fn relationship_from_record(&self, record: &RelationshipRecord) -> CatalogResult<Relationship> {
        let schema = self.get_relationship_by_type(&record.rel_type)?;
        let endpoint = |primary_label: &str, node_id: &str| -> CatalogResult<NodeRef> {
            Ok(NodeRef {
                primary_label: primary_label.to_string(),
                node_id: node_id.to_string(),
                labels: self.labels_for(primary_label)?,
            })
        };
        let start = endpoint(&record.start_node.primary_label, &record.start_node.node_id)?;
        let end = endpoint(&record.end_node.primary_label, &record.end_node.node_id)?;
        RelationshipBuilder::new(Arc::clone(schema), start, end)
            .attrs(attributes_from_json(&record.flattened_properties()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(class_name: &str) -> NodeSchema {
        NodeSchema::new(class_name).field(FieldDecl::new("key", FieldType::String).identifying())
    }

    #[test]
    fn test_duplicate_class_strict() {
        let err = Registry::builder()
            .node(keyed("Host"))
            .node(keyed("Host"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::DuplicateKey { kind: "node class", .. })
        ));
    }

    #[test]
    fn test_duplicate_class_lenient_overrides() {
        let registry = Registry::builder()
            .strict(false)
            .node(keyed("Host"))
            .node(keyed("Host").version("0.2"))
            .build()
            .unwrap();
        assert_eq!(registry.get_node_class("Host").unwrap().schema_version, "0.2");
        assert_eq!(registry.list_node_classes(), vec!["Host"]);
    }

    #[test]
    fn test_duplicate_label_strict() {
        let err = Registry::builder()
            .node(keyed("Host"))
            .node(keyed("Server").primary_label("Host"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::DuplicateKey { kind: "node label", .. })
        ));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let mut orphan = keyed("Orphan");
        orphan.parent = Some("Ghost".to_string());
        let err = Registry::builder().node(orphan).build().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_malformed_field_name_rejected() {
        let err = Registry::builder()
            .node(NodeSchema::new("Host").field(FieldDecl::new("Bad-Name", FieldType::String)))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_unknown_valid_pair_label_rejected() {
        let err = Registry::builder()
            .node(keyed("Host"))
            .relationship(RelationshipSchema::new("Runs", "RUNS").pair("Host", "Service"))
            .build()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_best_match_prefers_fewer_missing_labels() {
        let base = keyed("Asset");
        let host = NodeSchema::subtype(&base, "Host");
        let registry = Registry::builder().node(host).node(base).build().unwrap();

        let matched = registry.best_match(["Asset"]).unwrap();
        assert_eq!(matched.schema.class_name, "Asset");
        assert!(matched.extra_labels.is_empty());

        let matched = registry.best_match(["Asset", "Host", "Tagged"]).unwrap();
        assert_eq!(matched.schema.class_name, "Host");
        assert_eq!(matched.score, 2);
        assert_eq!(matched.extra_labels.into_iter().collect::<Vec<_>>(), vec!["Tagged"]);
    }

    #[test]
    fn test_best_match_no_overlap() {
        let registry = Registry::builder().node(keyed("Host")).build().unwrap();
        let err = registry.best_match(["Nothing"]).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(NotFoundError::NoLabelMatch { .. })));
    }

    #[test]
    fn test_not_found_lists_available() {
        let registry = Registry::builder().node(keyed("Host")).build().unwrap();
        match registry.get_node_class("Nope").unwrap_err() {
            CatalogError::NotFound(NotFoundError::NodeClass { available, .. }) => {
                assert_eq!(available, vec!["Host"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
