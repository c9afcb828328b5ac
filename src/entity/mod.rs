//! Entity layer: concrete nodes and relationships.
//!
//! Entities are transient values built through [`NodeBuilder`] and
//! [`RelationshipBuilder`], which run coercion, normalizers, validators,
//! label enrichment and identity computation in one place.

pub mod node;
pub mod relationship;

pub use node::{Embedded, Node, NodeBuilder, NodeRef};
pub use relationship::{Relationship, RelationshipBuilder};

/// Keys a node input may carry that are not fields.
pub const RESERVED_NODE_KEYS: &[&str] = &[
    "node_id",
    "primary_label",
    "labels",
    "additional_labels",
    "schema_version",
];

/// Keys a relationship input may carry that are not fields.
pub const RESERVED_RELATIONSHIP_KEYS: &[&str] = &[
    "rel_id",
    "rel_type",
    "start_node",
    "end_node",
    "schema_version",
];
