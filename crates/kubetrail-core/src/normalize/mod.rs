//! Normalizer: strips volatile, runtime-assigned fields from raw resource
//! documents and produces [`CanonicalResource`] values.
//!
//! Normalization is pure and deterministic. Its only failure mode is a
//! structurally unusable document (not an object, no kind, no name), reported
//! as a [`NormalizeError`] for the caller to count and skip.

pub mod fingerprint;

use crate::config::{NormalizerConfig, StripRule};
use crate::errors::NormalizeError;
use crate::model::resource::{json_type_name, CanonicalResource};
use serde_json::{Map, Value};

pub use fingerprint::{canonical_json, hash_string, Fingerprint};

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize one raw document.
    ///
    /// # Errors
    ///
    /// Returns a `NormalizeError` when the document is not an object or has
    /// no usable kind or name.
    pub fn normalize(&self, raw: &Value) -> Result<CanonicalResource, NormalizeError> {
        let mut root = match raw {
            Value::Object(map) => map.clone(),
            other => {
                return Err(NormalizeError::NotAnObject {
                    found: json_type_name(other),
                })
            }
        };
        let kind = root
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
            for key in &self.config.volatile_metadata {
                metadata.remove(key);
            }
            strip_string_map(metadata, "annotations", &self.config.volatile_annotations);
            strip_string_map(metadata, "labels", &self.config.volatile_labels);
        }

        if !self.config.retain_status_kinds.iter().any(|k| *k == kind) {
            root.remove("status");
        }

        for rule in &self.config.strip_rules {
            if rule.applies_to(&kind) {
                apply_strip_rule(&mut root, rule);
            }
        }

        CanonicalResource::from_document(Value::Object(root))
    }
}

/// Remove volatile keys from `metadata.<field>` and drop the map once empty.
fn strip_string_map(metadata: &mut Map<String, Value>, field: &str, volatile: &[String]) {
    let now_empty = match metadata.get_mut(field) {
        Some(Value::Object(map)) => {
            for key in volatile {
                map.remove(key);
            }
            map.is_empty()
        }
        Some(Value::Null) => true,
        _ => false,
    };
    if now_empty {
        metadata.remove(field);
    }
}

fn apply_strip_rule(root: &mut Map<String, Value>, rule: &StripRule) {
    let segments: Vec<&str> = rule.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(Value::Object(next)) => current = next,
            _ => return,
        }
    }

    let matches = match (&rule.when_equals, current.get(*last)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(expected), Some(actual)) => expected == actual,
    };
    if matches {
        current.remove(*last);
    }
}
