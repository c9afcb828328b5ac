//! Relationships between two node references.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::RecordOptions;
use crate::error::{CatalogResult, ValidationError};
use crate::identity::{relationship_identity, IdentityPart};
use crate::record::{EndpointRecord, RelationshipRecord};
use crate::schema::{non_finite, RelationshipSchema};
use crate::value::{Attributes, Value};

use super::node::NodeRef;
use super::RESERVED_RELATIONSHIP_KEYS;

/// A concrete relationship instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    schema: Arc<RelationshipSchema>,
    start: NodeRef,
    end: NodeRef,
    properties: Attributes,
    dynamic: Attributes,
    rel_id: String,
}

impl Relationship {
    /// Starts building a relationship between `start` and `end`.
    #[must_use]
    pub fn builder(
        schema: Arc<RelationshipSchema>,
        start: impl Into<NodeRef>,
        end: impl Into<NodeRef>,
    ) -> RelationshipBuilder {
        RelationshipBuilder::new(schema, start, end)
    }

    /// The relationship's type descriptor.
    #[must_use]
    pub const fn schema(&self) -> &Arc<RelationshipSchema> {
        &self.schema
    }

    /// Class name of the relationship's type.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.schema.class_name
    }

    /// External relationship type.
    #[must_use]
    pub fn rel_type(&self) -> &str {
        &self.schema.rel_type
    }

    /// Stable identity derived from type, endpoints and identifying fields.
    #[must_use]
    pub fn rel_id(&self) -> &str {
        &self.rel_id
    }

    /// Start endpoint.
    #[must_use]
    pub const fn start(&self) -> &NodeRef {
        &self.start
    }

    /// End endpoint.
    #[must_use]
    pub const fn end(&self) -> &NodeRef {
        &self.end
    }

    /// Looks up a declared or dynamic field. Absent fields are `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .get(name)
            .or_else(|| self.dynamic.get(name))
            .filter(|v| !v.is_null())
    }

    /// Declared fields, including absent ones as null.
    #[must_use]
    pub const fn properties(&self) -> &Attributes {
        &self.properties
    }

    /// Properties not declared by the schema.
    #[must_use]
    pub const fn dynamic_properties(&self) -> &Attributes {
        &self.dynamic
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

    /// A builder pre-filled with this relationship's endpoints and values.
    #[must_use]
    pub fn to_builder(&self) -> RelationshipBuilder {
        RelationshipBuilder::new(Arc::clone(&self.schema), self.start.clone(), self.end.clone())
            .attrs(self.attributes())
    }

    /// Merges `other` into a new relationship.
    ///
    /// # Errors
    ///
    /// Fails on different types, different endpoints or field conflicts.
    pub fn merge(&self, other: &Self) -> CatalogResult<Self> {
        crate::merge::merge_relationships(self, other)
    }

    /// Projects the relationship into its canonical record.
    #[must_use]
    pub fn to_record(&self, separate_dynamic_properties: bool) -> RelationshipRecord {
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

        RelationshipRecord {
            rel_id: self.rel_id.clone(),
            schema_version: self.schema.schema_version.clone(),
            rel_type: self.schema.rel_type.clone(),
            identifying_properties: identifying,
            properties,
            dynamic_properties,
            start_node: EndpointRecord::from(&self.start),
            end_node: EndpointRecord::from(&self.end),
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
}

/// Builder for [`Relationship`].
#[derive(Debug, Clone)]
pub struct RelationshipBuilder {
    schema: Arc<RelationshipSchema>,
    start: NodeRef,
    end: NodeRef,
    attributes: Attributes,
}

impl RelationshipBuilder {
    /// Starts a builder for `schema` between two endpoints.
    #[must_use]
    pub fn new(
        schema: Arc<RelationshipSchema>,
        start: impl Into<NodeRef>,
        end: impl Into<NodeRef>,
    ) -> Self {
        Self {
            schema,
            start: start.into(),
            end: end.into(),
            attributes: Attributes::new(),
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

    /// Validates endpoints and fields and builds the relationship.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidEndpoints` when the endpoint labels match none of
    /// the declared pairs, and with the usual field validation errors.
    pub fn build(self) -> CatalogResult<Relationship> {
        let Self {
            schema,
            start,
            end,
            mut attributes,
        } = self;

        if !schema.accepts(&start.labels, &end.labels) {
            return Err(ValidationError::InvalidEndpoints {
                rel_type: schema.rel_type.clone(),
                start: start.primary_label.clone(),
                end: end.primary_label.clone(),
                valid_pairs: schema.valid_pairs.clone(),
                start_labels: start.labels.iter().cloned().collect(),
                end_labels: end.labels.iter().cloned().collect(),
            }
            .into());
        }

        attributes.retain(|key, _| !schema.is_ignored(key));
        if let Some(Value::String(rel_type)) = attributes.get("rel_type") {
            if *rel_type != schema.rel_type {
                return Err(ValidationError::LabelMismatch {
                    class_name: schema.class_name.clone(),
                    expected: schema.rel_type.clone(),
                    actual: rel_type.clone(),
                }
                .into());
            }
        }
        for key in RESERVED_RELATIONSHIP_KEYS {
            attributes.remove(*key);
        }

        let mut properties = Attributes::new();
        for field in &schema.fields {
            let mut value = attributes.remove(&field.name).unwrap_or_default();
            if value.is_null() {
                value = field.default.produce();
            }
            let value = field.prepare(value)?;
            if value.is_null() && field.required {
                return Err(ValidationError::MissingField {
                    class_name: schema.class_name.clone(),
                    field: field.name.clone(),
                }
                .into());
            }
            properties.insert(field.name.clone(), value);
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

        let parts: Vec<IdentityPart> = schema
            .identifying_fields()
            .map(|field| {
                let value = properties.get(&field.name).map_or(Json::Null, Value::to_json);
                (field.name.clone(), value)
            })
            .collect();
        let rel_id = relationship_identity(&schema.rel_type, &start.node_id, &end.node_id, &parts);

        Ok(Relationship {
            schema,
            start,
            end,
            properties,
            dynamic,
            rel_id,
        })
    }
}
