//! Scan snapshots and the scope descriptor used to pick diff baselines.

use crate::model::resource::CanonicalResource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned, monotonically increasing scan id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScanId(pub i64);

impl ScanId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a scan looked at: cluster context, namespace filter and kind filters.
///
/// Two scans are diffed against each other only when their normalized scopes
/// are exactly equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanScope {
    pub context: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub include_kinds: Vec<String>,
    #[serde(default)]
    pub exclude_kinds: Vec<String>,
}

impl ScanScope {
    pub fn new(context: Option<String>, namespace: Option<String>) -> Self {
        Self {
            context,
            namespace,
            include_kinds: Vec::new(),
            exclude_kinds: Vec::new(),
        }
    }

    pub fn with_include_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Sorted, deduplicated filters; blank context/namespace become `None`.
    pub fn normalized(&self) -> Self {
        let clean = |v: &Option<String>| {
            v.as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let mut include = self.include_kinds.clone();
        include.sort();
        include.dedup();
        let mut exclude = self.exclude_kinds.clone();
        exclude.sort();
        exclude.dedup();
        Self {
            context: clean(&self.context),
            namespace: clean(&self.namespace),
            include_kinds: include,
            exclude_kinds: exclude,
        }
    }

    /// Canonical JSON of the normalized scope; the exact-match baseline key.
    pub fn scope_key(&self) -> String {
        serde_json::to_string(&self.normalized()).unwrap_or_default()
    }
}

/// Optional cluster facts recorded alongside a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub cluster_version: Option<String>,
    pub node_count: Option<u32>,
}

/// One immutable snapshot: everything observed by a single ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub id: ScanId,
    pub timestamp: DateTime<Utc>,
    pub scope: ScanScope,
    pub metadata: ScanMetadata,
    /// Sorted by identity, identities unique
    pub resources: Vec<CanonicalResource>,
}

impl Scan {
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            id: self.id,
            timestamp: self.timestamp,
            scope: self.scope.clone(),
            metadata: self.metadata.clone(),
            resource_count: self.resources.len(),
        }
    }
}

/// Scan header without its resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: ScanId,
    pub timestamp: DateTime<Utc>,
    pub scope: ScanScope,
    pub metadata: ScanMetadata,
    pub resource_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_ignores_filter_order_and_duplicates() {
        let a = ScanScope::new(Some("prod".into()), None)
            .with_include_kinds(["Service", "Deployment", "Service"]);
        let b = ScanScope::new(Some(" prod ".into()), Some("".into()))
            .with_include_kinds(["Deployment", "Service"]);
        assert_eq!(a.scope_key(), b.scope_key());
    }

    #[test]
    fn test_scope_key_distinguishes_filters() {
        let a = ScanScope::new(Some("prod".into()), None);
        let b = ScanScope::new(Some("prod".into()), None).with_exclude_kinds(["Secret"]);
        assert_ne!(a.scope_key(), b.scope_key());
    }
}
