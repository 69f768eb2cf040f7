//! Identity-and-fingerprint classification of two resource collections.
//!
//! Classification is linear in the number of resources. A structural delta
//! is computed only for identities whose fingerprints differ.

use crate::diff::model::{ChangeCounts, ChangeKind, ChangeRecord, DiffResult};
use crate::diff::structural::{structural_diff, DiffLimits};
use crate::model::{CanonicalResource, ResourceIdentity, Scan};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Emit explicit `Unchanged` records (they are always counted)
    pub include_unchanged: bool,
    pub limits: DiffLimits,
}

impl DiffOptions {
    pub fn with_unchanged(mut self) -> Self {
        self.include_unchanged = true;
        self
    }

    pub fn with_limits(mut self, limits: DiffLimits) -> Self {
        self.limits = limits;
        self
    }
}

fn index(resources: &[CanonicalResource]) -> BTreeMap<&ResourceIdentity, &CanonicalResource> {
    resources.iter().map(|r| (r.identity(), r)).collect()
}

/// Compare `old` against `new` by identity.
///
/// If an identity occurs more than once in one input, the last occurrence is
/// used; scans never contain duplicates.
pub fn diff_resources(
    old: &[CanonicalResource],
    new: &[CanonicalResource],
    options: &DiffOptions,
) -> DiffResult {
    let old_by_id = index(old);
    let new_by_id = index(new);
    let identities: BTreeSet<&ResourceIdentity> =
        old_by_id.keys().chain(new_by_id.keys()).copied().collect();

    let mut counts = ChangeCounts::default();
    let mut records = Vec::new();

    for identity in identities {
        let record = match (old_by_id.get(identity), new_by_id.get(identity)) {
            (None, Some(_)) => ChangeRecord::new(identity.clone(), ChangeKind::Added),
            (Some(_), None) => ChangeRecord::new(identity.clone(), ChangeKind::Removed),
            (Some(a), Some(b)) if a.fingerprint() == b.fingerprint() => {
                counts.record(ChangeKind::Unchanged);
                if options.include_unchanged {
                    records.push(ChangeRecord::new(identity.clone(), ChangeKind::Unchanged));
                }
                continue;
            }
            (Some(a), Some(b)) => ChangeRecord::new(identity.clone(), ChangeKind::Modified)
                .with_delta(structural_diff(&a.tree(), &b.tree(), options.limits)),
            (None, None) => continue,
        };
        counts.record(record.kind);
        records.push(record);
    }

    DiffResult { records, counts }
}

/// Compare two scans (`from` is the older side).
pub fn diff_scans(from: &Scan, to: &Scan, options: &DiffOptions) -> DiffResult {
    diff_resources(&from.resources, &to.resources, options)
}
