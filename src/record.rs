//! Canonical record shapes handed to downstream storage.
//!
//! Records are plain serde structs. Property containers are JSON objects;
//! [`NodeRecord::to_json`] can render them as JSON text for sinks that store
//! each container in a single string column.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::entity::NodeRef;
use crate::error::{CatalogError, CatalogResult};

/// Canonical form of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node identity.
    pub node_id: String,
    /// Schema version of the node's type.
    pub schema_version: String,
    /// Primary label of the node's type.
    pub primary_label: String,
    /// Primary label first, then additional labels sorted.
    pub labels: Vec<String>,
    /// Identifying field values.
    pub identifying_properties: Map<String, Json>,
    /// Other declared fields, plus dynamic ones unless separated.
    pub properties: Map<String, Json>,
    /// Dynamic properties, present only when separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_properties: Option<Map<String, Json>>,
}

/// Endpoint reference inside a relationship record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// Primary label of the endpoint node.
    pub primary_label: String,
    /// Identity of the endpoint node.
    pub node_id: String,
}

impl From<&NodeRef> for EndpointRecord {
    fn from(node: &NodeRef) -> Self {
        Self {
            primary_label: node.primary_label.clone(),
            node_id: node.node_id.clone(),
        }
    }
}

/// Canonical form of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// Stable relationship identity.
    pub rel_id: String,
    /// Schema version of the relationship type.
    pub schema_version: String,
    /// External relationship type.
    pub rel_type: String,
    /// Identifying field values.
    pub identifying_properties: Map<String, Json>,
    /// Other declared fields, plus dynamic ones unless separated.
    pub properties: Map<String, Json>,
    /// Dynamic properties, present only when separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_properties: Option<Map<String, Json>>,
    /// Start endpoint.
    pub start_node: EndpointRecord,
    /// End endpoint.
    pub end_node: EndpointRecord,
}

const CONTAINER_KEYS: [&str; 3] = ["identifying_properties", "properties", "dynamic_properties"];

/// Serializes a record, replacing the property containers with their JSON
/// text when `encode_containers` is set.
fn render(record: &impl Serialize, encode_containers: bool) -> CatalogResult<Json> {
    let mut json = serde_json::to_value(record).map_err(|e| CatalogError::serialization(e.to_string()))?;
    if encode_containers {
        if let Json::Object(map) = &mut json {
            for key in CONTAINER_KEYS {
                if let Some(container) = map.get_mut(key) {
                    *container = Json::String(container.to_string());
                }
            }
        }
    }
    Ok(json)
}

impl NodeRecord {
    /// Renders the record, optionally encoding the property containers as
    /// JSON text.
    ///
    /// # Errors
    ///
    /// `CatalogError::Serialization` if serde rejects the record.
    pub fn to_json(&self, encode_containers: bool) -> CatalogResult<Json> {
        render(self, encode_containers)
    }

    /// All stored properties as one map (identifying, regular, dynamic).
    #[must_use]
    pub fn flattened_properties(&self) -> Map<String, Json> {
        let mut all = self.identifying_properties.clone();
        all.extend(self.properties.clone());
        if let Some(dynamic) = &self.dynamic_properties {
            all.extend(dynamic.clone());
        }
        all
    }
}

impl RelationshipRecord {
    /// Renders the record, optionally encoding the property containers as
    /// JSON text.
    ///
    /// # Errors
    ///
    /// `CatalogError::Serialization` if serde rejects the record.
    pub fn to_json(&self, encode_containers: bool) -> CatalogResult<Json> {
        render(self, encode_containers)
    }

    /// All stored properties as one map (identifying, regular, dynamic).
    #[must_use]
    pub fn flattened_properties(&self) -> Map<String, Json> {
        let mut all = self.identifying_properties.clone();
        all.extend(self.properties.clone());
        if let Some(dynamic) = &self.dynamic_properties {
            all.extend(dynamic.clone());
        }
        all
    }
}
