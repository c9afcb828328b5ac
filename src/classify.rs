//! Runtime classification of raw attributes into a concrete subtype.
//!
//! A classifiable base type carries a classifier function. Attributes are
//! normalized with the base type's field normalizers, handed to the
//! classifier, and the returned class name is checked against the registry:
//! it must exist and be a proper, concrete subtype of the base.

use std::sync::Arc;

use blake3::Hasher;
use tracing::debug;

use crate::cache::BoundedCache;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult, ClassificationError};
use crate::registry::Registry;
use crate::schema::NodeSchema;
use crate::value::Attributes;

/// Runs the declared normalizers of `schema` over the matching attributes.
///
/// Ignored properties are dropped. Attributes without a declared field, and
/// null values, pass through unchanged.
///
/// # Errors
///
/// Returns a validation error if a normalizer rejects its input.
pub fn normalize_attributes(schema: &NodeSchema, attributes: &Attributes) -> CatalogResult<Attributes> {
    let mut normalized = Attributes::new();
    for (key, value) in attributes {
        if schema.is_ignored(key) {
            continue;
        }
        let value = match schema.field_decl(key) {
            Some(field) if !field.is_embedded() => field.normalize(value)?,
            _ => value.clone(),
        };
        normalized.insert(key.clone(), value);
    }
    Ok(normalized)
}

fn classifier_of(schema: &NodeSchema) -> Result<crate::schema::Classifier, ClassificationError> {
    schema.classifier.ok_or_else(|| ClassificationError::NotClassifiable {
        class_name: schema.class_name.clone(),
    })
}

fn resolve(
    registry: &Registry,
    base: &NodeSchema,
    classifier: &str,
    class_name: &str,
) -> CatalogResult<Arc<NodeSchema>> {
    let target = registry.get_node_class(class_name).map_err(|_| {
        CatalogError::from(ClassificationError::UnknownType {
            classifier: classifier.to_string(),
            returned: class_name.to_string(),
            available: registry.list_node_classes(),
        })
    })?;
    if target.class_name == base.class_name
        || target.is_classifiable()
        || !registry.is_subtype(&target.class_name, &base.class_name)
    {
        return Err(ClassificationError::NotASubtype {
            class_name: base.class_name.clone(),
            returned: class_name.to_string(),
        }
        .into());
    }
    Ok(Arc::clone(target))
}

/// Determines the concrete subtype for raw attributes of a classifiable
/// type.
///
/// # Errors
///
/// Returns a `ClassificationError` if the type is not classifiable, the
/// classifier makes no determination, or the result is not a registered
/// concrete subtype. Normalizer failures surface as validation errors.
pub fn classify(registry: &Registry, abstract_type: &str, attributes: &Attributes) -> CatalogResult<Arc<NodeSchema>> {
    let base = registry.get_node_class(abstract_type)?;
    let classifier = classifier_of(base)?;
    let normalized = normalize_attributes(base, attributes)?;

    let class_name = (classifier.func)(&normalized).ok_or_else(|| ClassificationError::Undetermined {
        class_name: base.class_name.clone(),
        classifier: classifier.name.to_string(),
        keys: normalized.keys().cloned().collect(),
    })?;

    let target = resolve(registry, base, classifier.name, &class_name)?;
    debug!(
        base = %base.class_name,
        classifier = classifier.name,
        resolved = %target.class_name,
        "classified attributes"
    );
    Ok(target)
}

/// Memoizes classification results by a fingerprint of the abstract type and
/// normalized attributes.
///
/// Cached class names are resolved against the registry passed to each call,
/// so one cache should serve one registry.
#[derive(Debug)]
pub struct ClassificationCache {
    entries: BoundedCache<[u8; 32], String>,
}

impl ClassificationCache {
    /// Creates a cache holding at most `capacity` classifications.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BoundedCache::new(capacity),
        }
    }

    /// Creates a cache sized by `classification_cache_capacity`.
    #[must_use]
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.classification_cache_capacity)
    }

    /// Stable fingerprint of a classification input.
    #[must_use]
    pub fn fingerprint(abstract_type: &str, normalized: &Attributes) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(abstract_type.as_bytes());
        h.update(&[0]);
        for (key, value) in normalized {
            h.update(key.as_bytes());
            h.update(&[0]);
            h.update(value.to_json().to_string().as_bytes());
            h.update(&[0]);
        }
        *h.finalize().as_bytes()
    }

    /// Classifies through the cache.
    ///
    /// # Errors
    ///
    /// Same as [`classify`]. Failures are not cached.
    pub fn classify(
        &self,
        registry: &Registry,
        abstract_type: &str,
        attributes: &Attributes,
    ) -> CatalogResult<Arc<NodeSchema>> {
        let base = registry.get_node_class(abstract_type)?;
        let classifier = classifier_of(base)?;
        let normalized = normalize_attributes(base, attributes)?;
        let key = Self::fingerprint(abstract_type, &normalized);

        if let Some(class_name) = self.entries.get(&key) {
            return resolve(registry, base, classifier.name, &class_name);
        }
        let target = classify(registry, abstract_type, &normalized)?;
        self.entries.insert(key, target.class_name.clone());
        Ok(target)
    }

    /// Number of cached classifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::network_registry;
    use crate::value::Value;

    fn address(value: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("address".to_string(), Value::from(value));
        attrs
    }

    #[test]
    fn test_classify_private_and_public() {
        let registry = network_registry().unwrap();
        let private = classify(&registry, "IPAddress", &address("192.168.1.5")).unwrap();
        let public = classify(&registry, "IPAddress", &address("8.8.8.8")).unwrap();
        assert_eq!(private.class_name, "PrivateIPAddress");
        assert_eq!(public.class_name, "PublicIPAddress");
    }

    #[test]
    fn test_classify_non_classifiable() {
        let registry = network_registry().unwrap();
        let err = classify(&registry, "Domain", &address("example.com")).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Classification(ClassificationError::NotClassifiable { .. })
        ));
    }

    #[test]
    fn test_classify_without_address_is_undetermined() {
        let registry = network_registry().unwrap();
        let err = classify(&registry, "IPAddress", &Attributes::new()).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Classification(ClassificationError::Undetermined { .. })
        ));
    }

    #[test]
    fn test_normalizer_failure_is_validation_error() {
        let registry = network_registry().unwrap();
        let err = classify(&registry, "IPAddress", &address("not-an-ip")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_fingerprint_is_order_independent_and_typed() {
        let mut a = address("8.8.8.8");
        a.insert("asn".to_string(), Value::Int(15169));
        let mut b = Attributes::new();
        b.insert("asn".to_string(), Value::Int(15169));
        b.insert("address".to_string(), Value::from("8.8.8.8"));
        assert_eq!(
            ClassificationCache::fingerprint("IPAddress", &a),
            ClassificationCache::fingerprint("IPAddress", &b)
        );
        b.insert("asn".to_string(), Value::from("15169"));
        assert_ne!(
            ClassificationCache::fingerprint("IPAddress", &a),
            ClassificationCache::fingerprint("IPAddress", &b)
        );
    }

    #[test]
    fn test_cache_hits_agree_with_direct_classification() {
        let registry = network_registry().unwrap();
        let cache = ClassificationCache::new(8);
        let first = cache.classify(&registry, "IPAddress", &address("10.0.0.1")).unwrap();
        let second = cache.classify(&registry, "IPAddress", &address("10.0.0.1")).unwrap();
        assert_eq!(first.class_name, second.class_name);
        assert_eq!(cache.len(), 1);
    }
}
