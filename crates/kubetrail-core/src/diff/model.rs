//! Diff output types.
//!
//! Records are sorted by identity and field changes by path, so serialized
//! output is deterministic.

use crate::model::ResourceIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Classification of one identity between two collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
            ChangeKind::Unchanged => "unchanged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(ChangeKind::Added),
            "removed" => Some(ChangeKind::Removed),
            "modified" => Some(ChangeKind::Modified),
            "unchanged" => Some(ChangeKind::Unchanged),
            _ => None,
        }
    }

    /// Anything but `Unchanged`
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeKind::Unchanged)
    }
}

/// What happened at one path of the canonical tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOp {
    /// Key or index present only on the new side
    Added,
    /// Key or index present only on the old side
    Removed,
    /// Leaf value differs
    Changed,
    /// Container type differs, or the depth bound was reached
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Dotted path, `[i]` for array indices, `["k.x"]` for keys containing dots
    pub path: String,
    pub op: FieldOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// Field-level delta of one modified resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub changes: Vec<FieldChange>,
    /// True when the change bound cut the delta short
    #[serde(default)]
    pub truncated: bool,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Classification of one identity, with a delta for `Modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub identity: ResourceIdentity,
    pub kind: ChangeKind,
    #[serde(default)]
    pub delta: Delta,
}

impl ChangeRecord {
    pub fn new(identity: ResourceIdentity, kind: ChangeKind) -> Self {
        Self {
            identity,
            kind,
            delta: Delta::default(),
        }
    }

    pub fn with_delta(mut self, delta: Delta) -> Self {
        self.delta = delta;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl ChangeCounts {
    pub fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Removed => self.removed += 1,
            ChangeKind::Modified => self.modified += 1,
            ChangeKind::Unchanged => self.unchanged += 1,
        }
    }

    /// Added + removed + modified
    pub fn changed(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

/// Result of comparing two resource collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Sorted by identity; `Unchanged` records only when requested
    pub records: Vec<ChangeRecord>,
    /// Always complete, including unchanged identities
    pub counts: ChangeCounts,
}

impl DiffResult {
    /// Identities classified as added, removed or modified.
    pub fn affected_identities(&self) -> BTreeSet<ResourceIdentity> {
        self.records
            .iter()
            .filter(|r| r.kind.is_change())
            .map(|r| r.identity.clone())
            .collect()
    }

    pub fn changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(|r| r.kind.is_change())
    }

    pub fn is_empty(&self) -> bool {
        self.counts.changed() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_round_trips_through_str() {
        for kind in [
            ChangeKind::Added,
            ChangeKind::Removed,
            ChangeKind::Modified,
            ChangeKind::Unchanged,
        ] {
            assert_eq!(ChangeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChangeKind::parse("renamed"), None);
    }

    #[test]
    fn test_counts() {
        let mut counts = ChangeCounts::default();
        counts.record(ChangeKind::Added);
        counts.record(ChangeKind::Unchanged);
        counts.record(ChangeKind::Modified);
        assert_eq!(counts.changed(), 2);
        assert_eq!(counts.unchanged, 1);
    }
}
