//! # ziptie-schema - Typed graph-entity catalog
//!
//! A catalog of graph entities (nodes and relationships) that are classified
//! into concrete subtypes from raw attributes, given stable deterministic
//! identities, merged field by field when several observations of the same
//! entity arrive, and projected into a canonical record format.
//!
//! ## Core Concepts
//!
//! - **Schema**: Declarative field metadata per type (identifying flag, merge
//!   strategy, normalizers, validators, embedded nodes)
//! - **Registry**: Every type keyed by class name and by label, with
//!   best-match resolution of arbitrary label sets
//! - **Classification**: Explicit factory turning raw data for an abstract
//!   type into its concrete subtype
//! - **Merge**: Closed set of per-field strategies reconciling two
//!   observations
//! - **Record**: Canonical serialized form for downstream storage
//!
//! ## Usage
//!
//! ```rust
//! use ziptie_schema::{network_registry, Attributes, Value};
//!
//! let registry = network_registry()?;
//!
//! let mut attrs = Attributes::new();
//! attrs.insert("address".to_string(), Value::from("192.168.1.5"));
//! let ip = registry.create_node("IPAddress", attrs)?;
//! assert_eq!(ip.class_name(), "PrivateIPAddress");
//!
//! let record = ip.to_record(false);
//! assert_eq!(record.labels[0], "PrivateIPAddress");
//! # Ok::<(), ziptie_schema::CatalogError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Leaf types
pub mod error;
pub mod schema;
pub mod value;

// Building blocks
pub mod cache;
pub mod config;
pub mod identity;
pub mod record;
pub mod transforms;

// Entities and the engine
pub mod classify;
pub mod entity;
pub mod merge;
pub mod registry;

// Bundled catalog
pub mod networks;

pub use cache::BoundedCache;
pub use classify::{classify, normalize_attributes, ClassificationCache};
pub use config::{CatalogConfig, RecordOptions};
pub use entity::{Embedded, Node, NodeBuilder, NodeRef, Relationship, RelationshipBuilder};
pub use error::{
    CatalogError, CatalogResult, ClassificationError, ConflictError, NotFoundError, TypeMismatchError,
    ValidationError,
};
pub use identity::{compute_id, compute_rel_id};
pub use merge::{merge_nodes, merge_relationships};
pub use networks::network_registry;
pub use record::{EndpointRecord, NodeRecord, RelationshipRecord};
pub use registry::{GraphNode, LabelMatch, LabeledRecord, Registry, RegistryBuilder};
pub use schema::{
    Direction, EmbeddedConfig, FieldDecl, FieldDefault, FieldType, MergeStrategy, NodeSchema, RelationshipSchema,
    Role,
};
pub use value::{Attributes, Value};
