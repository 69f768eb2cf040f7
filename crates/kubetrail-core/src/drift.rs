//! Drift comparator: declared (IaC) state against actual (cluster) state.
//!
//! Uses the same identity-and-fingerprint classification as the diff engine,
//! with `declared` on the old side and `actual` on the new side:
//!
//! | diff      | drift           |
//! |-----------|-----------------|
//! | removed   | `OnlyDeclared`  |
//! | added     | `OnlyActual`    |
//! | modified  | `Differs`       |
//! | unchanged | `Matches`       |
//!
//! With `hide_system`, platform-managed identities are dropped before
//! counting, so counts and the match ratio describe user-managed resources
//! only.

use crate::config::DriftConfig;
use crate::diff::{diff_resources, ChangeKind, Delta, DiffLimits, DiffOptions};
use crate::model::{CanonicalResource, ResourceIdentity};
use crate::normalize::Normalizer;
use crate::snapshot::{NormalizationIssue, SnapshotBuilder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftCategory {
    /// In IaC, not in the cluster
    OnlyDeclared,
    /// In the cluster, not in IaC
    OnlyActual,
    Differs,
    Matches,
}

impl DriftCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftCategory::OnlyDeclared => "only-declared",
            DriftCategory::OnlyActual => "only-actual",
            DriftCategory::Differs => "differs",
            DriftCategory::Matches => "matches",
        }
    }

    fn from_change(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Removed => DriftCategory::OnlyDeclared,
            ChangeKind::Added => DriftCategory::OnlyActual,
            ChangeKind::Modified => DriftCategory::Differs,
            ChangeKind::Unchanged => DriftCategory::Matches,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub identity: ResourceIdentity,
    pub category: DriftCategory,
    /// Declared → actual field changes; empty unless `Differs`
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftCounts {
    pub only_declared: usize,
    pub only_actual: usize,
    pub differs: usize,
    pub matches: usize,
}

impl DriftCounts {
    fn record(&mut self, category: DriftCategory) {
        match category {
            DriftCategory::OnlyDeclared => self.only_declared += 1,
            DriftCategory::OnlyActual => self.only_actual += 1,
            DriftCategory::Differs => self.differs += 1,
            DriftCategory::Matches => self.matches += 1,
        }
    }

    /// `matches / (matches + differs)`; `None` when nothing is in both.
    pub fn match_ratio(&self) -> Option<f64> {
        let both = self.matches + self.differs;
        (both > 0).then(|| self.matches as f64 / both as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftReport {
    /// Sorted by identity
    pub results: Vec<DriftResult>,
    pub counts: DriftCounts,
    /// Identities excluded by `hide_system`
    pub hidden_system_count: usize,
    pub declared_issues: Vec<NormalizationIssue>,
    pub actual_issues: Vec<NormalizationIssue>,
}

impl DriftReport {
    pub fn category_of(&self, identity: &ResourceIdentity) -> Option<DriftCategory> {
        self.results
            .iter()
            .find(|r| &r.identity == identity)
            .map(|r| r.category)
    }

    pub fn has_drift(&self) -> bool {
        self.counts.only_declared + self.counts.only_actual + self.counts.differs > 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriftOptions {
    pub hide_system: bool,
    pub limits: DiffLimits,
}

/// Recognizes platform-managed resources.
#[derive(Debug, Clone, Default)]
pub struct SystemFilter {
    config: DriftConfig,
}

impl SystemFilter {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    pub fn is_system(&self, resource: &CanonicalResource) -> bool {
        let id = resource.identity();
        self.config.system_namespaces.contains(&id.namespace)
            || self.config.system_kinds.contains(&id.kind)
            || self
                .config
                .system_name_prefixes
                .iter()
                .any(|p| id.name.starts_with(p.as_str()))
            || self
                .config
                .system_label_keys
                .iter()
                .any(|k| resource.labels().contains_key(k))
    }
}

/// Compare normalized collections.
pub fn drift(
    declared: &[CanonicalResource],
    actual: &[CanonicalResource],
    filter: &SystemFilter,
    options: &DriftOptions,
) -> DriftReport {
    let mut system: BTreeMap<&ResourceIdentity, bool> = BTreeMap::new();
    if options.hide_system {
        for r in declared.iter().chain(actual) {
            let flag = system.entry(r.identity()).or_insert(false);
            *flag |= filter.is_system(r);
        }
    }

    let diff = diff_resources(
        declared,
        actual,
        &DiffOptions::default()
            .with_unchanged()
            .with_limits(options.limits),
    );

    let mut report = DriftReport::default();
    for record in diff.records {
        if system.get(&record.identity).copied().unwrap_or(false) {
            report.hidden_system_count += 1;
            continue;
        }
        let category = DriftCategory::from_change(record.kind);
        report.counts.record(category);
        report.results.push(DriftResult {
            identity: record.identity,
            category,
            delta: record.delta,
        });
    }
    report
}

/// Normalize raw documents on both sides, then compare.
///
/// Malformed or duplicate documents are skipped and listed per side in the
/// report.
pub fn drift_documents(
    normalizer: &Normalizer,
    declared: &[Value],
    actual: &[Value],
    filter: &SystemFilter,
    options: &DriftOptions,
) -> DriftReport {
    let collect = |docs: &[Value]| {
        let mut builder = SnapshotBuilder::new(normalizer, Default::default(), Utc::now());
        for doc in docs {
            builder.push(doc);
        }
        builder.finish()
    };
    let declared = collect(declared);
    let actual = collect(actual);

    let mut report = drift(&declared.resources, &actual.resources, filter, options);
    report.declared_issues = declared.issues;
    report.actual_issues = actual.issues;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn res(kind: &str, ns: &str, name: &str, data: &str) -> CanonicalResource {
        CanonicalResource::from_document(json!({
            "kind": kind,
            "metadata": {"name": name, "namespace": ns},
            "data": {"v": data}
        }))
        .unwrap()
    }

    #[test]
    fn test_categories() {
        let declared = vec![
            res("ConfigMap", "default", "cfg", "1"),
            res("ConfigMap", "default", "same", "1"),
            res("ConfigMap", "default", "edited", "1"),
        ];
        let actual = vec![
            res("ConfigMap", "default", "same", "1"),
            res("ConfigMap", "default", "edited", "2"),
            res("ConfigMap", "default", "manual", "1"),
        ];
        let report = drift(&declared, &actual, &SystemFilter::default(), &DriftOptions::default());
        let cat = |n: &str| report.category_of(&ResourceIdentity::new("ConfigMap", "default", n));
        assert_eq!(cat("cfg"), Some(DriftCategory::OnlyDeclared));
        assert_eq!(cat("manual"), Some(DriftCategory::OnlyActual));
        assert_eq!(cat("edited"), Some(DriftCategory::Differs));
        assert_eq!(cat("same"), Some(DriftCategory::Matches));
        assert_eq!(report.counts.match_ratio(), Some(0.5));
        assert!(report.has_drift());
    }

    #[test]
    fn test_hide_system_excludes_entirely() {
        let actual = vec![
            res("ConfigMap", "kube-system", "coredns", "1"),
            res("Node", "", "ip-10-0-0-1", "1"),
            res("ClusterRole", "", "system:controller", "1"),
            res("ConfigMap", "default", "app", "1"),
        ];
        let declared = vec![res("ConfigMap", "default", "app", "1")];
        let options = DriftOptions {
            hide_system: true,
            ..Default::default()
        };
        let report = drift(&declared, &actual, &SystemFilter::default(), &options);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.hidden_system_count, 3);
        assert_eq!(report.counts.only_actual, 0);
        assert_eq!(report.counts.match_ratio(), Some(1.0));

        let shown = drift(&declared, &actual, &SystemFilter::default(), &DriftOptions::default());
        assert_eq!(shown.counts.only_actual, 3);
    }

    #[test]
    fn test_match_ratio_undefined_without_overlap() {
        assert_eq!(DriftCounts::default().match_ratio(), None);
    }

    #[test]
    fn test_drift_documents_reports_skips_per_side() {
        let declared = vec![json!({"kind": "ConfigMap", "metadata": {"name": "cfg", "namespace": "default"}}), json!({"kind": "Broken"})];
        let actual = vec![];
        let report = drift_documents(
            &Normalizer::default(),
            &declared,
            &actual,
            &SystemFilter::default(),
            &DriftOptions::default(),
        );
        assert_eq!(report.counts.only_declared, 1);
        assert_eq!(report.declared_issues.len(), 1);
        assert!(report.actual_issues.is_empty());
    }
}
