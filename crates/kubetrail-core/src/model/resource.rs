//! Canonical resource: the fixed shape every raw document is normalized into.

use crate::errors::NormalizeError;
use crate::model::identity::ResourceIdentity;
pub use crate::normalize::fingerprint::Fingerprint;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const HELM_RELEASE_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";
const HELM_RELEASE_LABEL: &str = "helm.sh/release";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// A resource after volatile fields were stripped, split into a fixed shape.
///
/// Fields the engine does not model individually are kept verbatim in
/// `metadata_extra` (other `metadata.*` keys) and `body` (every top-level key
/// except `apiVersion`, `kind` and `metadata`), so diff and drift still see them.
/// Label and annotation values keep their JSON type: `tier: 2` and
/// `tier: "2"` are different content.
///
/// The value is immutable once built: the fingerprint is computed from the
/// canonical tree at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalResource {
    identity: ResourceIdentity,
    api_version: Option<String>,
    labels: BTreeMap<String, Value>,
    annotations: BTreeMap<String, Value>,
    metadata_extra: BTreeMap<String, Value>,
    body: BTreeMap<String, Value>,
    fingerprint: Fingerprint,
}

impl CanonicalResource {
    /// Split an already-stripped document into the canonical shape.
    ///
    /// Used both by the normalizer (after stripping) and when reloading
    /// canonical JSON from the store.
    ///
    /// # Errors
    ///
    /// Returns a `NormalizeError` when the document is not an object or lacks
    /// a kind or name.
    pub fn from_document(document: Value) -> Result<Self, NormalizeError> {
        let mut root = match document {
            Value::Object(map) => map,
            other => {
                return Err(NormalizeError::NotAnObject {
                    found: json_type_name(&other),
                })
            }
        };

        let kind = match root.remove("kind") {
            Some(Value::String(k)) if !k.trim().is_empty() => k,
            _ => return Err(NormalizeError::MissingKind),
        };
        let api_version = match root.remove("apiVersion") {
            Some(Value::String(v)) if !v.is_empty() => Some(v),
            _ => None,
        };

        let mut metadata = match root.remove("metadata") {
            Some(Value::Object(m)) => m,
            _ => return Err(NormalizeError::MissingName { kind }),
        };
        let name = match metadata.remove("name") {
            Some(Value::String(n)) if !n.trim().is_empty() => n,
            _ => return Err(NormalizeError::MissingName { kind }),
        };
        let namespace = match metadata.remove("namespace") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(ns)) => ns,
            Some(_) => return Err(NormalizeError::InvalidNamespace { kind, name }),
        };

        let labels = take_value_map(&mut metadata, "labels");
        let annotations = take_value_map(&mut metadata, "annotations");

        Ok(Self::assemble(
            ResourceIdentity::new(kind, namespace, name),
            api_version,
            labels,
            annotations,
            metadata.into_iter().collect(),
            root.into_iter().collect(),
        ))
    }

    /// Parse canonical JSON previously produced by [`CanonicalResource::to_canonical_json`].
    ///
    /// # Errors
    ///
    /// Returns `NotAnObject` for unparseable text, or any shape error from
    /// [`CanonicalResource::from_document`].
    pub fn from_canonical_json(json: &str) -> Result<Self, NormalizeError> {
        let value: Value =
            serde_json::from_str(json).map_err(|_| NormalizeError::NotAnObject { found: "text" })?;
        Self::from_document(value)
    }

    fn assemble(
        identity: ResourceIdentity,
        api_version: Option<String>,
        labels: BTreeMap<String, Value>,
        annotations: BTreeMap<String, Value>,
        metadata_extra: BTreeMap<String, Value>,
        body: BTreeMap<String, Value>,
    ) -> Self {
        let mut resource = Self {
            identity,
            api_version,
            labels,
            annotations,
            metadata_extra,
            body,
            fingerprint: Fingerprint::default(),
        };
        resource.fingerprint = Fingerprint::of_tree(&resource.tree());
        resource
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    pub fn labels(&self) -> &BTreeMap<String, Value> {
        &self.labels
    }

    pub fn annotations(&self) -> &BTreeMap<String, Value> {
        &self.annotations
    }

    /// String value of a label; `None` when absent or not a string.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).and_then(Value::as_str)
    }

    /// String value of an annotation; `None` when absent or not a string.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).and_then(Value::as_str)
    }

    /// Top-level fields other than `apiVersion`, `kind` and `metadata`
    pub fn body(&self) -> &BTreeMap<String, Value> {
        &self.body
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Name of the Helm release managing this resource, if any.
    pub fn managed_by_release(&self) -> Option<&str> {
        self.annotation(HELM_RELEASE_NAME_ANNOTATION)
            .or_else(|| self.label(HELM_RELEASE_LABEL))
            .or_else(|| match self.label(MANAGED_BY_LABEL) {
                Some("Helm") => self.label(INSTANCE_LABEL),
                _ => None,
            })
    }

    /// Rebuild the canonical document tree.
    pub fn tree(&self) -> Value {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::String(self.identity.name.clone()));
        if !self.identity.namespace.is_empty() {
            metadata.insert(
                "namespace".to_string(),
                Value::String(self.identity.namespace.clone()),
            );
        }
        if !self.labels.is_empty() {
            metadata.insert("labels".to_string(), map_value(&self.labels));
        }
        if !self.annotations.is_empty() {
            metadata.insert("annotations".to_string(), map_value(&self.annotations));
        }
        for (key, value) in &self.metadata_extra {
            metadata.insert(key.clone(), value.clone());
        }

        let mut root = Map::new();
        if let Some(api_version) = &self.api_version {
            root.insert("apiVersion".to_string(), Value::String(api_version.clone()));
        }
        root.insert("kind".to_string(), Value::String(self.identity.kind.clone()));
        root.insert("metadata".to_string(), Value::Object(metadata));
        for (key, value) in &self.body {
            root.insert(key.clone(), value.clone());
        }
        Value::Object(root)
    }

    /// Deterministic serialized form (the fingerprint input)
    pub fn to_canonical_json(&self) -> String {
        crate::normalize::fingerprint::canonical_json(&self.tree())
    }
}

/// Remove `metadata.<key>` when it is a map. Values are kept as-is, so an
/// unquoted `2` in a hand-written manifest stays distinct from `"2"`.
fn take_value_map(metadata: &mut Map<String, Value>, key: &str) -> BTreeMap<String, Value> {
    match metadata.remove(key) {
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(Value::Null) | None => BTreeMap::new(),
        Some(other) => {
            metadata.insert(key.to_string(), other);
            BTreeMap::new()
        }
    }
}

fn map_value(map: &BTreeMap<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "app",
                "namespace": "default",
                "labels": {"app": "web", "tier": 2},
                "finalizers": ["x"]
            },
            "spec": {"replicas": 2}
        })
    }

    #[test]
    fn test_from_document_splits_shape() {
        let r = CanonicalResource::from_document(deployment()).unwrap();
        assert_eq!(r.identity(), &ResourceIdentity::new("Deployment", "default", "app"));
        assert_eq!(r.api_version(), Some("apps/v1"));
        assert_eq!(r.labels().get("tier"), Some(&json!(2)));
        assert_eq!(r.label("tier"), None);
        assert_eq!(r.label("app"), Some("web"));
        assert!(r.body().contains_key("spec"));
        assert_eq!(r.tree()["metadata"]["finalizers"], json!(["x"]));
    }

    #[test]
    fn test_canonical_json_reload_preserves_fingerprint() {
        let r = CanonicalResource::from_document(deployment()).unwrap();
        let reloaded = CanonicalResource::from_canonical_json(&r.to_canonical_json()).unwrap();
        assert_eq!(reloaded.fingerprint(), r.fingerprint());
        assert_eq!(reloaded, r);
    }

    #[test]
    fn test_label_value_type_is_content() {
        let numeric = CanonicalResource::from_document(deployment()).unwrap();
        let mut quoted = deployment();
        quoted["metadata"]["labels"]["tier"] = json!("2");
        let quoted = CanonicalResource::from_document(quoted).unwrap();
        assert_ne!(numeric.fingerprint(), quoted.fingerprint());
        assert_eq!(quoted.label("tier"), Some("2"));
    }

    #[test]
    fn test_missing_kind_and_name_are_rejected() {
        let err = CanonicalResource::from_document(json!({"metadata": {"name": "x"}})).unwrap_err();
        assert_eq!(err, NormalizeError::MissingKind);

        let err = CanonicalResource::from_document(json!({"kind": "Pod", "metadata": {}})).unwrap_err();
        assert_eq!(err, NormalizeError::MissingName { kind: "Pod".to_string() });

        let err = CanonicalResource::from_document(json!([1, 2])).unwrap_err();
        assert_eq!(err, NormalizeError::NotAnObject { found: "array" });
    }

    #[test]
    fn test_managed_by_release_prefers_annotation() {
        let r = CanonicalResource::from_document(json!({
            "kind": "Service",
            "metadata": {
                "name": "svc",
                "annotations": {"meta.helm.sh/release-name": "web"},
                "labels": {"app.kubernetes.io/managed-by": "Helm", "app.kubernetes.io/instance": "other"}
            }
        }))
        .unwrap();
        assert_eq!(r.managed_by_release(), Some("web"));

        let r = CanonicalResource::from_document(json!({
            "kind": "Service",
            "metadata": {
                "name": "svc",
                "labels": {"app.kubernetes.io/managed-by": "Helm", "app.kubernetes.io/instance": "inst"}
            }
        }))
        .unwrap();
        assert_eq!(r.managed_by_release(), Some("inst"));
    }
}
