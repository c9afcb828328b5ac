//! Deterministic entity identity.
//!
//! An identity is a UUIDv5 over a canonical JSON key built from the
//! identifying fields in declaration order, namespaced by primary label (or
//! relationship type and endpoint ids). Non-identifying and dynamic content
//! never contributes.

use serde_json::{json, Value as Json};
use uuid::Uuid;

use crate::entity::node::absent_embedded_identity;
use crate::error::{CatalogResult, ValidationError};
use crate::schema::{FieldDecl, FieldType, NodeSchema, RelationshipSchema};
use crate::value::{Attributes, Value};

/// Namespace for every identity this crate produces.
pub const IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x5a1e_7c0d_3f4b_4e2a_9d61_c0ff_ee5c_4e3a);

/// One identifying field's contribution: its name and canonical JSON value.
pub(crate) type IdentityPart = (String, Json);

fn digest(key: &Json) -> String {
    Uuid::new_v5(&IDENTITY_NAMESPACE, key.to_string().as_bytes()).to_string()
}

pub(crate) fn node_identity(primary_label: &str, parts: &[IdentityPart]) -> String {
    let fields: Vec<Json> = parts.iter().map(|(name, value)| json!([name, value])).collect();
    digest(&json!(["node", primary_label, fields]))
}

pub(crate) fn relationship_identity(
    rel_type: &str,
    start_id: &str,
    end_id: &str,
    parts: &[IdentityPart],
) -> String {
    let fields: Vec<Json> = parts.iter().map(|(name, value)| json!([name, value])).collect();
    digest(&json!(["rel", rel_type, start_id, end_id, fields]))
}

// Embedded identifying fields are passed by id: a string for `node`, a list
// of strings for `node_list`.
fn identity_parts<'a>(
    class_name: &str,
    fields: impl Iterator<Item = &'a FieldDecl>,
    values: &Attributes,
) -> CatalogResult<Vec<IdentityPart>> {
    let mut parts = Vec::new();
    for field in fields {
        let raw = values.get(&field.name).cloned().unwrap_or(Value::Null);
        let value = if field.is_embedded() { raw } else { field.prepare(raw)? };
        if value.is_null() && field.required {
            return Err(ValidationError::MissingField {
                class_name: class_name.to_string(),
                field: field.name.clone(),
            }
            .into());
        }
        let json = match (field.field_type, value) {
            (FieldType::NodeList, Value::List(ids)) => {
                let mut ids: Vec<String> = ids.iter().filter_map(Value::as_str).map(str::to_string).collect();
                ids.sort_unstable();
                Json::Array(ids.into_iter().map(Json::String).collect())
            }
            (FieldType::NodeList | FieldType::Node, Value::Null) => {
                absent_embedded_identity(field.field_type)
            }
            (_, value) => value.to_json(),
        };
        parts.push((field.name.clone(), json));
    }
    Ok(parts)
}

/// Computes a node identity from raw field values without building a node.
///
/// Identifying fields are normalized first, so the result equals
/// `node_id()` of the node built from the same values.
///
/// # Errors
///
/// Fails when an identifying value is missing or rejected by its
/// normalizer or validator.
pub fn compute_id(schema: &NodeSchema, values: &Attributes) -> CatalogResult<String> {
    let parts = identity_parts(&schema.class_name, schema.identifying_fields(), values)?;
    Ok(node_identity(&schema.primary_label, &parts))
}

/// Computes a relationship identity from endpoint ids and raw field values.
///
/// # Errors
///
/// Same as [`compute_id`].
pub fn compute_rel_id(
    schema: &RelationshipSchema,
    start_id: &str,
    end_id: &str,
    values: &Attributes,
) -> CatalogResult<String> {
    let parts = identity_parts(&schema.class_name, schema.identifying_fields(), values)?;
    Ok(relationship_identity(&schema.rel_type, start_id, end_id, &parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::NORMALIZE_LOWERCASE;

    fn host_schema() -> NodeSchema {
        NodeSchema::new("Host")
            .field(
                FieldDecl::new("name", FieldType::String)
                    .identifying()
                    .normalizer(NORMALIZE_LOWERCASE),
            )
            .field(FieldDecl::new("rack", FieldType::String))
    }

    fn values(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_identity_ignores_non_identifying_fields() {
        let schema = host_schema();
        let a = compute_id(&schema, &values(&[("name", Value::from("db1"))])).unwrap();
        let b = compute_id(
            &schema,
            &values(&[("name", Value::from("db1")), ("rack", Value::from("r7"))]),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_uses_normalized_values() {
        let schema = host_schema();
        let a = compute_id(&schema, &values(&[("name", Value::from("DB1 "))])).unwrap();
        let b = compute_id(&schema, &values(&[("name", Value::from("db1"))])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_is_namespaced_by_label() {
        let host = host_schema();
        let server = host_schema().primary_label("Server");
        let v = values(&[("name", Value::from("db1"))]);
        assert_ne!(compute_id(&host, &v).unwrap(), compute_id(&server, &v).unwrap());
    }

    #[test]
    fn test_missing_identifying_field() {
        let err = compute_id(&host_schema(), &Attributes::new()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_relationship_identity_depends_on_endpoints() {
        let a = relationship_identity("HAS_IP", "s", "e", &[]);
        let b = relationship_identity("HAS_IP", "e", "s", &[]);
        assert_ne!(a, b);
        assert_eq!(a, relationship_identity("HAS_IP", "s", "e", &[]));
    }

    #[test]
    fn test_identity_is_uuid_text() {
        let id = node_identity("Host", &[("name".to_string(), json!("db1"))]);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
