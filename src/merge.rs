//! Per-field reconciliation of two observations of the same entity.
//!
//! Merging never mutates its inputs. The merged field values are fed back
//! through the builders, so normalizers, validators, enrichers and identity
//! all run again on the result.

use std::sync::Arc;

use tracing::debug;

use crate::entity::{Embedded, Node, NodeBuilder, NodeRef, Relationship, RelationshipBuilder};
use crate::error::{CatalogResult, ConflictError, TypeMismatchError};
use crate::schema::{FieldDecl, MergeStrategy};
use crate::value::{Attributes, Value};

fn type_mismatch(
    strategy: MergeStrategy,
    field: &str,
    reason: &str,
    existing: &Value,
    incoming: &Value,
) -> TypeMismatchError {
    TypeMismatchError {
        field: field.to_string(),
        strategy: strategy.to_string(),
        reason: reason.to_string(),
        existing: existing.to_string(),
        incoming: incoming.to_string(),
    }
}

impl MergeStrategy {
    /// Combines two values of `field`. `Value::Null` means absent.
    ///
    /// # Errors
    ///
    /// `ConflictError` for `error_if_different` on unequal values,
    /// `TypeMismatchError` when the values cannot be ordered, added or
    /// unioned.
    pub fn apply(self, field: &str, existing: &Value, incoming: &Value) -> CatalogResult<Value> {
        let merged = match self {
            Self::ErrorIfDifferent => {
                if existing != incoming {
                    return Err(ConflictError::FieldMismatch {
                        field: field.to_string(),
                        existing: existing.to_string(),
                        incoming: incoming.to_string(),
                    }
                    .into());
                }
                existing.clone()
            }
            Self::TakeFirst => first_present(existing, incoming),
            Self::TakeLast | Self::TakeAnyNonNull => first_present(incoming, existing),
            Self::Min | Self::Max => {
                if existing.is_null() || incoming.is_null() {
                    first_present(existing, incoming)
                } else {
                    let ordering = existing.compare(incoming).ok_or_else(|| {
                        type_mismatch(self, field, "values are not comparable", existing, incoming)
                    })?;
                    let keep_existing = match self {
                        Self::Min => ordering.is_le(),
                        _ => ordering.is_ge(),
                    };
                    if keep_existing {
                        existing.clone()
                    } else {
                        incoming.clone()
                    }
                }
            }
            Self::Sum => {
                if existing.is_null() && incoming.is_null() {
                    Value::Null
                } else {
                    let zero = Value::Int(0);
                    let a = if existing.is_null() { &zero } else { existing };
                    let b = if incoming.is_null() { &zero } else { incoming };
                    match a.checked_add(b) {
                        Some(sum) => sum,
                        None if a.is_numeric() && b.is_numeric() => {
                            return Err(type_mismatch(self, field, "numeric overflow", existing, incoming).into());
                        }
                        None => {
                            return Err(type_mismatch(self, field, "values are not numeric", existing, incoming).into());
                        }
                    }
                }
            }
            Self::Union => match (existing, incoming) {
                (Value::Null, other) | (other, Value::Null) => other.clone(),
                (Value::List(a), Value::List(b)) => {
                    let mut out: Vec<Value> = Vec::with_capacity(a.len() + b.len());
                    for item in a.iter().chain(b.iter()) {
                        if !out.contains(item) {
                            out.push(item.clone());
                        }
                    }
                    Value::List(out)
                }
                _ => {
                    return Err(type_mismatch(self, field, "values must be lists", existing, incoming).into());
                }
            },
            Self::TakeAnyNonEmpty => {
                if !incoming.is_empty() {
                    incoming.clone()
                } else if !existing.is_empty() {
                    existing.clone()
                } else {
                    Value::Null
                }
            }
        };
        Ok(merged)
    }
}

fn first_present(preferred: &Value, fallback: &Value) -> Value {
    if preferred.is_null() {
        fallback.clone()
    } else {
        preferred.clone()
    }
}

fn merge_declared<'a>(
    fields: impl Iterator<Item = &'a FieldDecl>,
    existing: &Attributes,
    incoming: &Attributes,
) -> CatalogResult<Attributes> {
    let mut merged = Attributes::new();
    for field in fields.filter(|f| !f.is_embedded()) {
        let a = existing.get(&field.name).unwrap_or(&Value::Null);
        let b = incoming.get(&field.name).unwrap_or(&Value::Null);
        let value = field.merge_strategy.apply(&field.name, a, b)?;
        if !value.is_null() {
            merged.insert(field.name.clone(), value);
        }
    }
    Ok(merged)
}

fn merge_dynamic(existing: &Attributes, incoming: &Attributes, into: &mut Attributes) -> CatalogResult<()> {
    for key in existing.keys().chain(incoming.keys()) {
        if into.contains_key(key) {
            continue;
        }
        let a = existing.get(key).unwrap_or(&Value::Null);
        let b = incoming.get(key).unwrap_or(&Value::Null);
        let value = MergeStrategy::TakeAnyNonNull.apply(key, a, b)?;
        if !value.is_null() {
            into.insert(key.clone(), value);
        }
    }
    Ok(())
}

fn merge_embedded(field: &str, existing: Option<&Embedded>, incoming: Option<&Embedded>) -> CatalogResult<Option<Embedded>> {
    match (existing, incoming) {
        (Some(a), Some(b)) => {
            let (ids_a, ids_b) = (a.identity_value(), b.identity_value());
            if ids_a != ids_b {
                return Err(ConflictError::FieldMismatch {
                    field: field.to_string(),
                    existing: ids_a.to_string(),
                    incoming: ids_b.to_string(),
                }
                .into());
            }
            Ok(Some(a.clone()))
        }
        (Some(one), None) | (None, Some(one)) => Ok(Some(one.clone())),
        (None, None) => Ok(None),
    }
}

/// Merges two nodes of the same concrete type.
///
/// # Errors
///
/// `ConflictError::DifferentTypes` for different classes, otherwise any
/// error from a field strategy or from rebuilding the merged node.
pub fn merge_nodes(existing: &Node, incoming: &Node) -> CatalogResult<Node> {
    if existing.class_name() != incoming.class_name() {
        return Err(ConflictError::DifferentTypes {
            existing: existing.class_name().to_string(),
            incoming: incoming.class_name().to_string(),
        }
        .into());
    }
    let schema = existing.schema();

    let mut attributes = merge_declared(schema.fields.iter(), existing.properties(), incoming.properties())?;
    if schema.allows_dynamic {
        merge_dynamic(existing.dynamic_properties(), incoming.dynamic_properties(), &mut attributes)?;
    }

    let mut builder = NodeBuilder::new(Arc::clone(schema))
        .attrs(attributes)
        .labels(existing.additional_labels().iter().cloned())
        .labels(incoming.additional_labels().iter().cloned());
    for field in schema.fields.iter().filter(|f| f.is_embedded()) {
        if let Some(embedded) = merge_embedded(&field.name, existing.embedded(&field.name), incoming.embedded(&field.name))? {
            builder = builder.embed(field.name.clone(), embedded);
        }
    }

    let merged = builder.build()?;
    debug!(
        class = %merged.class_name(),
        node_id = %merged.node_id(),
        "merged node observations"
    );
    Ok(merged)
}

fn union_ref(a: &NodeRef, b: &NodeRef) -> NodeRef {
    let mut merged = a.clone();
    merged.labels.extend(b.labels.iter().cloned());
    merged
}

/// Merges two relationships of the same type between the same endpoints.
///
/// # Errors
///
/// `ConflictError` for different classes or endpoints, otherwise any field
/// strategy or rebuild error.
pub fn merge_relationships(existing: &Relationship, incoming: &Relationship) -> CatalogResult<Relationship> {
    if existing.class_name() != incoming.class_name() {
        return Err(ConflictError::DifferentTypes {
            existing: existing.class_name().to_string(),
            incoming: incoming.class_name().to_string(),
        }
        .into());
    }
    for (endpoint, a, b) in [
        ("start", existing.start(), incoming.start()),
        ("end", existing.end(), incoming.end()),
    ] {
        if a.node_id != b.node_id {
            return Err(ConflictError::EndpointMismatch {
                endpoint,
                existing: a.node_id.clone(),
                incoming: b.node_id.clone(),
            }
            .into());
        }
    }
    let schema = existing.schema();

    let mut attributes = merge_declared(schema.fields.iter(), existing.properties(), incoming.properties())?;
    if schema.allows_dynamic {
        merge_dynamic(existing.dynamic_properties(), incoming.dynamic_properties(), &mut attributes)?;
    }

    let merged = RelationshipBuilder::new(
        Arc::clone(schema),
        union_ref(existing.start(), incoming.start()),
        union_ref(existing.end(), incoming.end()),
    )
    .attrs(attributes)
    .build()?;
    debug!(
        rel_type = %merged.rel_type(),
        rel_id = %merged.rel_id(),
        "merged relationship observations"
    );
    Ok(merged)
}
