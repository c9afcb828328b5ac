//! Declarative field metadata for node and relationship types.
//!
//! Schemas are static input: each concrete type lists its fields with an
//! identifying flag, a merge strategy and optional normalizers/validators.
//! Subtypes copy their parent's fields and labels via [`NodeSchema::subtype`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::{parse_datetime, Attributes, Value};

/// Schema version stamped on every canonical record unless overridden.
pub const DEFAULT_SCHEMA_VERSION: &str = "0.1";

/// Property names stripped from input, merges and records by default.
pub const DEFAULT_IGNORED_PROPERTIES: &[&str] = &["context"];

/// The declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float; integers widen.
    Float,
    /// Boolean.
    Bool,
    /// UTC timestamp; strings are parsed.
    DateTime,
    /// List of values.
    List,
    /// String-keyed map.
    Map,
    /// Any non-null value.
    Any,
    /// A single embedded node (encodes a relationship).
    Node,
    /// A list of embedded nodes (encodes relationships).
    NodeList,
}

impl FieldType {
    /// Returns true for fields that carry embedded nodes instead of properties.
    #[must_use]
    pub const fn is_embedded(self) -> bool {
        matches!(self, Self::Node | Self::NodeList)
    }

    /// Coerces a raw value into this type.
    ///
    /// Null always passes; required checks happen separately. Integers widen
    /// to floats and datetime strings are parsed. NaN and infinities, even
    /// nested in containers, are rejected.
    pub fn coerce(self, field: &str, value: Value) -> Result<Value, ValidationError> {
        let mismatch = |value: &Value| ValidationError::WrongType {
            field: field.to_string(),
            expected: self.to_string(),
            actual: value.type_name().to_string(),
        };

        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, v) if !v.is_finite() => Err(non_finite(field, &self.to_string())),
            (Self::Any, v) => Ok(v),
            (Self::String, v @ Value::String(_))
            | (Self::Int, v @ Value::Int(_))
            | (Self::Float, v @ Value::Float(_))
            | (Self::Bool, v @ Value::Bool(_))
            | (Self::DateTime, v @ Value::DateTime(_))
            | (Self::List, v @ Value::List(_))
            | (Self::Map, v @ Value::Map(_)) => Ok(v),
            (Self::Float, Value::Int(i)) => {
                #[allow(clippy::cast_precision_loss)]
                let widened = i as f64;
                Ok(Value::Float(widened))
            }
            (Self::DateTime, Value::String(s)) => parse_datetime(&s)
                .map(Value::DateTime)
                .ok_or_else(|| ValidationError::WrongType {
                    field: field.to_string(),
                    expected: "datetime".to_string(),
                    actual: format!("unparseable string {s:?}"),
                }),
            (_, v) => Err(mismatch(&v)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::List => "list",
            Self::Map => "map",
            Self::Any => "any",
            Self::Node => "node",
            Self::NodeList => "node_list",
        };
        write!(f, "{name}")
    }
}

pub(crate) fn non_finite(field: &str, expected: &str) -> ValidationError {
    ValidationError::WrongType {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: "non-finite float".to_string(),
    }
}

/// How two observations of the same field are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Values must be equal or the merge fails.
    ErrorIfDifferent,
    /// Keep the existing value, falling back to the incoming one.
    TakeFirst,
    /// Prefer the incoming value, falling back to the existing one.
    TakeLast,
    /// Keep the smaller value.
    Min,
    /// Keep the larger value.
    Max,
    /// Numeric accumulation; absent counts as zero.
    Sum,
    /// De-duplicated concatenation preserving first-seen order.
    Union,
    /// Prefer the incoming value unless it is null.
    TakeAnyNonNull,
    /// Prefer any non-empty value; `0` and `false` are not empty.
    TakeAnyNonEmpty,
}

impl MergeStrategy {
    /// All strategies in declaration order.
    pub const ALL: [Self; 9] = [
        Self::ErrorIfDifferent,
        Self::TakeFirst,
        Self::TakeLast,
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Union,
        Self::TakeAnyNonNull,
        Self::TakeAnyNonEmpty,
    ];

    /// Returns the declarative tag for this strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ErrorIfDifferent => "error_if_different",
            Self::TakeFirst => "take_first",
            Self::TakeLast => "take_last",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Union => "union",
            Self::TakeAnyNonNull => "take_any_non_null",
            Self::TakeAnyNonEmpty => "take_any_non_empty",
        }
    }
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::TakeLast
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMergeStrategy {
                name: s.to_string(),
            })
    }
}

/// Signature of a value normalizer. Must be idempotent.
pub type NormalizeFn = fn(&Value) -> Result<Value, String>;

/// Signature of a value validator.
pub type ValidateFn = fn(&Value) -> bool;

/// Signature of a classifier: normalized attributes to a subtype class name.
pub type ClassifyFn = fn(&Attributes) -> Option<String>;

/// Signature of a label enricher: normalized attributes to extra labels.
pub type EnrichFn = fn(&Attributes) -> Vec<String>;

/// A named normalizer reference.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    /// Stable name used in equality and debugging.
    pub name: &'static str,
    /// The normalizer function.
    pub func: NormalizeFn,
}

/// A named validator reference.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    /// Stable name used in equality and debugging.
    pub name: &'static str,
    /// The validator function.
    pub func: ValidateFn,
}

/// A named classifier reference.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    /// Stable name used in equality and debugging.
    pub name: &'static str,
    /// The classifier function.
    pub func: ClassifyFn,
}

/// A named label enricher reference.
#[derive(Debug, Clone, Copy)]
pub struct LabelEnricher {
    /// Stable name used in equality and debugging.
    pub name: &'static str,
    /// The enricher function.
    pub func: EnrichFn,
}

// Function references compare by name; fn pointer addresses are not stable.
macro_rules! eq_by_name {
    ($($t:ty),*) => {
        $(
            impl PartialEq for $t {
                fn eq(&self, other: &Self) -> bool {
                    self.name == other.name
                }
            }

            impl Eq for $t {}
        )*
    };
}

eq_by_name!(Normalizer, Validator, Classifier, LabelEnricher);

/// Which end of the derived relationship the owning node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// The embedded node is the start node; the owner is the end node.
    In,
    /// The owner is the start node; the embedded node is the end node.
    Out,
}

/// Describes how an embedded field turns into relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Class name of the embedded node type.
    pub node_class: String,
    /// Class name of the relationship type to derive.
    pub relationship: String,
    /// Which end of the relationship the owning node is.
    pub direction: Direction,
}

/// Default applied when a field is absent from input.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// No default; the field stays absent.
    None,
    /// A fixed value.
    Value(Value),
    /// Current UTC time at construction.
    Now,
}

impl FieldDefault {
    /// Produces the default value.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Value(v) => v.clone(),
            Self::Now => Value::DateTime(chrono::Utc::now()),
        }
    }
}

/// Declaration of one field on a node or relationship type.
///
/// # Examples
///
/// ```
/// use ziptie_schema::{FieldDecl, FieldType, MergeStrategy};
///
/// let address = FieldDecl::new("address", FieldType::String).identifying();
/// assert!(address.identifying);
/// assert!(address.required);
/// assert_eq!(address.merge_strategy, MergeStrategy::ErrorIfDifferent);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name.
    pub name: String,
    /// Declared value type.
    pub field_type: FieldType,
    /// Whether the field contributes to identity.
    pub identifying: bool,
    /// Whether a non-null value is mandatory.
    pub required: bool,
    /// How observations are reconciled.
    pub merge_strategy: MergeStrategy,
    /// Default applied when the field is absent.
    pub default: FieldDefault,
    /// Normalizers applied in order.
    pub normalizers: Vec<Normalizer>,
    /// Validators applied after normalization.
    pub validators: Vec<Validator>,
    /// Relationship derivation for embedded fields.
    pub embedded: Option<EmbeddedConfig>,
    /// When false the field never appears in canonical records.
    pub serialize: bool,
}

impl FieldDecl {
    /// Creates an optional, non-identifying field merged with `take_last`.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            identifying: false,
            required: false,
            merge_strategy: MergeStrategy::default(),
            default: FieldDefault::None,
            normalizers: Vec::new(),
            validators: Vec::new(),
            embedded: None,
            serialize: true,
        }
    }

    /// Marks the field as identifying. Identifying fields are required and
    /// merge with `error_if_different`.
    #[must_use]
    pub fn identifying(mut self) -> Self {
        self.identifying = true;
        self.required = true;
        self.merge_strategy = MergeStrategy::ErrorIfDifferent;
        self
    }

    /// Marks the field as mandatory.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Clears the required flag (e.g. an identifying list that may be empty).
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Sets the merge strategy.
    #[must_use]
    pub fn merge(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Sets a fixed default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Defaults to the construction time.
    #[must_use]
    pub fn default_now(mut self) -> Self {
        self.default = FieldDefault::Now;
        self
    }

    /// Appends a normalizer.
    #[must_use]
    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizers.push(normalizer);
        self
    }

    /// Appends a validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Marks the field as carrying embedded nodes of `node_class`, derived
    /// into `relationship` instances.
    #[must_use]
    pub fn embedded(
        mut self,
        node_class: impl Into<String>,
        relationship: impl Into<String>,
        direction: Direction,
    ) -> Self {
        self.embedded = Some(EmbeddedConfig {
            node_class: node_class.into(),
            relationship: relationship.into(),
            direction,
        });
        self
    }

    /// Excludes the field from canonical records.
    #[must_use]
    pub fn skip_serializing(mut self) -> Self {
        self.serialize = false;
        self
    }

    /// Returns true if this field carries embedded nodes.
    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        self.field_type.is_embedded()
    }

    /// Runs coercion, normalizers and validators on a non-null value.
    pub fn prepare(&self, value: Value) -> Result<Value, ValidationError> {
        let mut value = self.field_type.coerce(&self.name, value)?;
        if value.is_null() {
            return Ok(value);
        }

        for normalizer in &self.normalizers {
            value = (normalizer.func)(&value).map_err(|reason| ValidationError::NormalizerFailed {
                field: self.name.clone(),
                normalizer: normalizer.name.to_string(),
                reason,
            })?;
        }

        for validator in &self.validators {
            if !(validator.func)(&value) {
                return Err(ValidationError::ValidatorRejected {
                    field: self.name.clone(),
                    validator: validator.name.to_string(),
                    value: value.to_string(),
                });
            }
        }

        Ok(value)
    }

    /// Runs only the normalizers (used before classification).
    pub fn normalize(&self, value: &Value) -> Result<Value, ValidationError> {
        let mut value = value.clone();
        if value.is_null() {
            return Ok(value);
        }
        for normalizer in &self.normalizers {
            value = (normalizer.func)(&value).map_err(|reason| ValidationError::NormalizerFailed {
                field: self.name.clone(),
                normalizer: normalizer.name.to_string(),
                reason,
            })?;
        }
        Ok(value)
    }
}

/// Fields every node and relationship type inherits from the base schema.
#[must_use]
pub fn base_fields() -> Vec<FieldDecl> {
    vec![
        FieldDecl::new("created_at", FieldType::DateTime)
            .merge(MergeStrategy::Min)
            .default_now(),
        FieldDecl::new("modified_at", FieldType::DateTime)
            .merge(MergeStrategy::Max)
            .default_now(),
        FieldDecl::new("count", FieldType::Int)
            .merge(MergeStrategy::Sum)
            .default_value(1),
        FieldDecl::new("sources", FieldType::List)
            .merge(MergeStrategy::Union)
            .default_value(Value::List(Vec::new())),
    ]
}

fn upsert_field(fields: &mut Vec<FieldDecl>, field: FieldDecl) {
    match fields.iter_mut().find(|f| f.name == field.name) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

/// A named role that maps onto an additional label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name used by `add_role` and `remove_role`.
    pub name: String,
    /// Label added when the role is held.
    pub label: String,
}

/// Descriptor of a concrete (or classifiable base) node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    /// Declared type name (registry key for code and configuration).
    pub class_name: String,
    /// External label; also the identity namespace.
    pub primary_label: String,
    /// Labels every instance carries besides the primary one (inherited).
    pub static_labels: Vec<String>,
    /// Class name of the parent type, if any.
    pub parent: Option<String>,
    /// Version stamped on records.
    pub schema_version: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDecl>,
    /// Whether undeclared properties are kept.
    pub allows_dynamic: bool,
    /// Picks the concrete subtype; set only on classifiable bases.
    pub classifier: Option<Classifier>,
    /// Adds labels computed from the attributes.
    pub label_enricher: Option<LabelEnricher>,
    /// Roles instances may hold.
    pub roles: Vec<Role>,
    /// Properties dropped from input.
    pub ignored_properties: Vec<String>,
}

impl NodeSchema {
    /// Creates a schema whose primary label equals its class name, with the
    /// base fields and no dynamic properties.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            primary_label: class_name.clone(),
            class_name,
            static_labels: Vec::new(),
            parent: None,
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            fields: base_fields(),
            allows_dynamic: false,
            classifier: None,
            label_enricher: None,
            roles: Vec::new(),
            ignored_properties: DEFAULT_IGNORED_PROPERTIES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }

    /// Creates a subtype of `parent`: fields, dynamic capability, enricher,
    /// roles and ignored properties are inherited; the parent's labels become
    /// static labels. The classifier is not inherited.
    #[must_use]
    pub fn subtype(parent: &Self, class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let mut static_labels: Vec<String> = Vec::with_capacity(parent.static_labels.len() + 1);
        static_labels.push(parent.primary_label.clone());
        for label in &parent.static_labels {
            if !static_labels.contains(label) {
                static_labels.push(label.clone());
            }
        }

        Self {
            primary_label: class_name.clone(),
            class_name,
            static_labels,
            parent: Some(parent.class_name.clone()),
            schema_version: parent.schema_version.clone(),
            fields: parent.fields.clone(),
            allows_dynamic: parent.allows_dynamic,
            classifier: None,
            label_enricher: parent.label_enricher,
            roles: parent.roles.clone(),
            ignored_properties: parent.ignored_properties.clone(),
        }
    }

    /// Overrides the primary label.
    #[must_use]
    pub fn primary_label(mut self, label: impl Into<String>) -> Self {
        self.primary_label = label.into();
        self
    }

    /// Adds a static label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !self.static_labels.contains(&label) {
            self.static_labels.push(label);
        }
        self
    }

    /// Adds a field, replacing any inherited field of the same name.
    #[must_use]
    pub fn field(mut self, field: FieldDecl) -> Self {
        upsert_field(&mut self.fields, field);
        self
    }

    /// Keeps undeclared properties as dynamic properties.
    #[must_use]
    pub fn allow_dynamic(mut self) -> Self {
        self.allows_dynamic = true;
        self
    }

    /// Marks the type as classifiable through `classifier`.
    #[must_use]
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the label enricher.
    #[must_use]
    pub fn enricher(mut self, enricher: LabelEnricher) -> Self {
        self.label_enricher = Some(enricher);
        self
    }

    /// Declares a role and its label.
    #[must_use]
    pub fn role(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.roles.push(Role {
            name: name.into(),
            label: label.into(),
        });
        self
    }

    /// Drops `property` from input.
    #[must_use]
    pub fn ignore(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        if !self.ignored_properties.contains(&property) {
            self.ignored_properties.push(property);
        }
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Returns true if instances must be produced through classification.
    #[must_use]
    pub const fn is_classifiable(&self) -> bool {
        self.classifier.is_some()
    }

    /// The fixed label set: primary plus static labels.
    #[must_use]
    pub fn labels(&self) -> BTreeSet<String> {
        std::iter::once(self.primary_label.clone())
            .chain(self.static_labels.iter().cloned())
            .collect()
    }

    /// Looks up a declared field.
    #[must_use]
    pub fn field_decl(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Identifying fields in declaration order.
    pub fn identifying_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| f.identifying)
    }

    /// Returns the label mapped to a role name.
    #[must_use]
    pub fn role_label(&self, role: &str) -> Option<&str> {
        self.roles
            .iter()
            .find(|r| r.name == role)
            .map(|r| r.label.as_str())
    }

    /// Returns true if `property` is dropped from input.
    #[must_use]
    pub fn is_ignored(&self, property: &str) -> bool {
        self.ignored_properties.iter().any(|p| p == property)
    }
}

/// Descriptor of a relationship type.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipSchema {
    /// Declared type name.
    pub class_name: String,
    /// External relationship type (e.g. `HAS_IP`).
    pub rel_type: String,
    /// Version stamped on records.
    pub schema_version: String,
    /// Allowed `(start, end)` label pairs. Empty means any pair is allowed.
    pub valid_pairs: Vec<(String, String)>,
    /// Whether endpoints may also match reversed.
    pub bidirectional: bool,
    /// Fields in declaration order.
    pub fields: Vec<FieldDecl>,
    /// Whether undeclared properties are kept.
    pub allows_dynamic: bool,
    /// Properties dropped from input.
    pub ignored_properties: Vec<String>,
}

impl RelationshipSchema {
    /// Creates a relationship schema with the base fields.
    #[must_use]
    pub fn new(class_name: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            rel_type: rel_type.into(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            valid_pairs: Vec::new(),
            bidirectional: false,
            fields: base_fields(),
            allows_dynamic: false,
            ignored_properties: DEFAULT_IGNORED_PROPERTIES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }

    /// Allows a `(start, end)` label pair.
    #[must_use]
    pub fn pair(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.valid_pairs.push((start.into(), end.into()));
        self
    }

    /// Accepts endpoints in either order.
    #[must_use]
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    /// Adds or replaces a field, keeping its position.
    #[must_use]
    pub fn field(mut self, field: FieldDecl) -> Self {
        upsert_field(&mut self.fields, field);
        self
    }

    /// Keeps undeclared properties as dynamic properties.
    #[must_use]
    pub fn allow_dynamic(mut self) -> Self {
        self.allows_dynamic = true;
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Looks up a declared field.
    #[must_use]
    pub fn field_decl(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Identifying fields in declaration order.
    pub fn identifying_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| f.identifying)
    }

    /// Returns true if `property` is dropped from input.
    #[must_use]
    pub fn is_ignored(&self, property: &str) -> bool {
        self.ignored_properties.iter().any(|p| p == property)
    }

    /// Checks whether the endpoint label sets satisfy a valid pair.
    ///
    /// Matching is inheritance-aware: a pair declared between parent labels
    /// accepts any subtype, since subtypes carry their parents' labels.
    #[must_use]
    pub fn accepts(&self, start_labels: &BTreeSet<String>, end_labels: &BTreeSet<String>) -> bool {
        if self.valid_pairs.is_empty() {
            return true;
        }
        self.valid_pairs.iter().any(|(start, end)| {
            (start_labels.contains(start) && end_labels.contains(end))
                || (self.bidirectional && start_labels.contains(end) && end_labels.contains(start))
        })
    }
}
