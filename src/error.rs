//! Error types for the catalog.
//!
//! Every failure is strongly typed with thiserror so callers can match on
//! the exact condition. Errors carry the field names, conflicting values and
//! available keys needed to diagnose a problem without re-running it.

use thiserror::Error;

/// Errors raised while turning raw attributes into a concrete subtype.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassificationError {
    #[error("Type '{class_name}' is not classifiable")]
    NotClassifiable {
        class_name: String,
    },

    #[error(
        "Could not classify {class_name} with provided data: classifier '{classifier}' returned no type (data keys: {keys:?})"
    )]
    Undetermined {
        class_name: String,
        classifier: String,
        keys: Vec<String>,
    },

    #[error("Classifier '{classifier}' returned unknown type '{returned}'. Available: {available:?}")]
    UnknownType {
        classifier: String,
        returned: String,
        available: Vec<String>,
    },

    #[error("Type '{returned}' is not a concrete subtype of {class_name}")]
    NotASubtype {
        class_name: String,
        returned: String,
    },
}

/// Errors raised when a registry key cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("Node class '{name}' not found. Available: {available:?}")]
    NodeClass {
        name: String,
        available: Vec<String>,
    },

    #[error("Node with label '{label}' not found. Available: {available:?}")]
    NodeLabel {
        label: String,
        available: Vec<String>,
    },

    #[error("Relationship class '{name}' not found. Available: {available:?}")]
    RelationshipClass {
        name: String,
        available: Vec<String>,
    },

    #[error("Relationship type '{rel_type}' not found. Available: {available:?}")]
    RelationshipType {
        rel_type: String,
        available: Vec<String>,
    },

    #[error("No class found matching any of labels: {labels:?}. Available classes: {available:?}")]
    NoLabelMatch {
        labels: Vec<String>,
        available: Vec<String>,
    },

    #[error("Missing '{key}' in record data")]
    MissingKey {
        key: String,
    },
}

/// Irreconcilable differences found while merging two entities.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConflictError {
    #[error("Cannot merge {field}: conflicting values (existing={existing}, new={incoming})")]
    FieldMismatch {
        field: String,
        existing: String,
        incoming: String,
    },

    #[error("Cannot merge entities of different types: {existing} != {incoming}")]
    DifferentTypes {
        existing: String,
        incoming: String,
    },

    #[error("Cannot merge relationships with different {endpoint} nodes: {existing} != {incoming}")]
    EndpointMismatch {
        endpoint: &'static str,
        existing: String,
        incoming: String,
    },
}

/// A merge strategy was applied to values it cannot combine.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot apply '{strategy}' strategy to {field}: {reason} ({existing}, {incoming})")]
pub struct TypeMismatchError {
    pub field: String,
    pub strategy: String,
    pub reason: String,
    pub existing: String,
    pub incoming: String,
}

/// Validation errors raised while constructing entities or registries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{class_name} is missing required field '{field}'")]
    MissingField {
        class_name: String,
        field: String,
    },

    #[error("{class_name} does not allow dynamic properties: unexpected field '{field}'")]
    UnknownField {
        class_name: String,
        field: String,
    },

    #[error("Field '{field}' expects {expected}, got {actual}")]
    WrongType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to process '{field}' with normalizer '{normalizer}': {reason}")]
    NormalizerFailed {
        field: String,
        normalizer: String,
        reason: String,
    },

    #[error("Validation failed for {validator} on '{field}': {value}")]
    ValidatorRejected {
        field: String,
        validator: String,
        value: String,
    },

    #[error("Embedded field '{field}' expects {expected} nodes, got {actual}")]
    WrongEmbeddedType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("'{class_name}' is classifiable and cannot be built directly; use the registry factory")]
    AbstractType {
        class_name: String,
    },

    #[error("Label mismatch for {class_name}: expected '{expected}', got '{actual}'")]
    LabelMismatch {
        class_name: String,
        expected: String,
        actual: String,
    },

    #[error(
        "Invalid node pair for {rel_type}: {start} -> {end}. Valid pairs (including inherited types): {valid_pairs:?}. Start node labels: {start_labels:?}, End node labels: {end_labels:?}"
    )]
    InvalidEndpoints {
        rel_type: String,
        start: String,
        end: String,
        valid_pairs: Vec<(String, String)>,
        start_labels: Vec<String>,
        end_labels: Vec<String>,
    },

    #[error("Unknown role '{role}' for {class_name}")]
    UnknownRole {
        class_name: String,
        role: String,
    },

    #[error("Duplicate {kind} '{key}' found. Set strict=false to allow overwriting.")]
    DuplicateKey {
        kind: &'static str,
        key: String,
    },

    #[error("Invalid schema for '{class_name}': {reason}")]
    InvalidSchema {
        class_name: String,
        reason: String,
    },

    #[error("Unknown merge strategy '{name}'")]
    UnknownMergeStrategy {
        name: String,
    },
}

/// Top-level error type for the catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Merge conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Type mismatch: {0}")]
    TypeMismatch(#[from] TypeMismatchError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

impl CatalogError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_classification(&self) -> bool {
        matches!(self, Self::Classification(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[must_use]
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch(_))
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
