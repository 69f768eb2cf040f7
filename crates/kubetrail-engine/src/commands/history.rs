//! History query façade.
//!
//! Read-only operations built on the store queries and the pure diff and
//! stability code. None of them write.

use crate::commands::{or_empty, traced};
use chrono::{DateTime, Utc};
use kubetrail_core::diff::{
    diff_scans, summarize_record, ChangeKind, DiffLimits, DiffOptions, DiffResult,
};
use kubetrail_core::errors::Result;
use kubetrail_core::stability::{
    least_stable, score_segments, score_timeline, StabilityResult, TimelineEntry,
};
use kubetrail_core::{EngineConfig, ResourceIdentity, ScanId, ScanScope, ScanSummary, TimeWindow};
use kubetrail_store::scan::{
    fetch_change_set, fetch_changes, fetch_scan, list_changes_in_range, list_scans,
    list_scans_in_range, namespace_counts, resource_timeline, resource_timelines_by_scope,
    timelines_in_range, StoredChange,
};
use kubetrail_store::HistoryStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate view of the history inside one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub window: TimeWindow,
    pub scan_count: usize,
    pub first_scan_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub changes_by_kind: BTreeMap<ChangeKind, usize>,
    pub changes_by_namespace: BTreeMap<String, usize>,
    pub changes_by_resource_kind: BTreeMap<String, usize>,
    /// Resource count per namespace in the last scan of the window
    pub namespace_resource_counts: BTreeMap<String, usize>,
    /// Least stable first
    pub least_stable: Vec<StabilityResult>,
}

impl HistorySummary {
    fn empty(window: TimeWindow) -> Self {
        Self {
            window,
            scan_count: 0,
            first_scan_at: None,
            last_scan_at: None,
            changes_by_kind: BTreeMap::new(),
            changes_by_namespace: BTreeMap::new(),
            changes_by_resource_kind: BTreeMap::new(),
            namespace_resource_counts: BTreeMap::new(),
            least_stable: Vec::new(),
        }
    }

    pub fn total_changes(&self) -> usize {
        self.changes_by_kind.values().sum()
    }
}

/// Change records between two scans.
///
/// Consecutive scans of one scope return the rows recorded at ingest; any
/// other pair is diffed on the fly. Unknown scan ids give an empty list.
///
/// # Errors
///
/// `Persistence` / `Serialization` when stored rows cannot be read.
pub fn get_changes(
    store: &HistoryStore,
    config: &EngineConfig,
    from: ScanId,
    to: ScanId,
) -> Result<Vec<StoredChange>> {
    traced("get_changes", || {
        let conn = store.connection();
        let lookup = || -> Result<Vec<StoredChange>> {
            if fetch_change_set(conn, from, to)?.is_some() {
                return fetch_changes(conn, from, to);
            }
            let result = diff_pair(store, config, from, to)?;
            Ok(result
                .changes()
                .map(|record| StoredChange {
                    from_scan_id: from,
                    to_scan_id: to,
                    summary: summarize_record(record),
                    record: record.clone(),
                })
                .collect())
        };
        or_empty(lookup(), Vec::new())
    })
}

/// Full comparison of two arbitrary scans, `from` as the older side.
/// Unknown scan ids give an empty result.
///
/// # Errors
///
/// `Persistence` / `Serialization` when stored rows cannot be read.
pub fn compare_scans(
    store: &HistoryStore,
    config: &EngineConfig,
    from: ScanId,
    to: ScanId,
) -> Result<DiffResult> {
    traced("compare_scans", || {
        or_empty(diff_pair(store, config, from, to), DiffResult::default())
    })
}

fn diff_pair(
    store: &HistoryStore,
    config: &EngineConfig,
    from: ScanId,
    to: ScanId,
) -> Result<DiffResult> {
    let old = fetch_scan(store.connection(), from)?;
    let new = fetch_scan(store.connection(), to)?;
    Ok(diff_scans(
        &old,
        &new,
        &DiffOptions::default().with_limits(DiffLimits::from(&config.diff)),
    ))
}

/// Scan headers, newest first, optionally limited to one exact scope.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn get_history(
    store: &HistoryStore,
    limit: Option<usize>,
    scope: Option<&ScanScope>,
) -> Result<Vec<ScanSummary>> {
    let scope = scope.map(ScanScope::normalized);
    traced("get_history", || list_scans(store.connection(), limit, scope.as_ref()))
}

/// Presence and fingerprint of `identity` in every scan, oldest first.
/// An identity never seen gives an empty timeline.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn get_resource_timeline(
    store: &HistoryStore,
    identity: &ResourceIdentity,
    scope: Option<&ScanScope>,
) -> Result<Vec<TimelineEntry>> {
    let scope = scope.map(ScanScope::normalized);
    traced("get_resource_timeline", || {
        or_empty(
            resource_timeline(store.connection(), identity, scope.as_ref(), None),
            Vec::new(),
        )
    })
}

/// Stability of one identity across the scans inside `window`.
///
/// Without a scope, each scope the identity was seen in is scored on its own
/// timeline and the totals are summed. An identity absent from every scan in
/// the window comes back with `observation_count == 0` and no score.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn score_identity(
    store: &HistoryStore,
    identity: &ResourceIdentity,
    window: &TimeWindow,
    scope: Option<&ScanScope>,
) -> Result<StabilityResult> {
    let scope = scope.map(ScanScope::normalized);
    traced("score_identity", || {
        let conn = store.connection();
        match &scope {
            Some(scope) => {
                let timeline = or_empty(
                    resource_timeline(conn, identity, Some(scope), Some(window)),
                    Vec::new(),
                )?;
                Ok(score_timeline(identity, &timeline))
            }
            None => {
                let segments = or_empty(
                    resource_timelines_by_scope(conn, identity, Some(window)),
                    Vec::new(),
                )?;
                Ok(score_segments(
                    identity,
                    segments.iter().map(|(_, timeline)| timeline.as_slice()),
                ))
            }
        }
    })
}

/// Aggregate counts over `window` plus the `least_stable_n` least stable
/// identities.
///
/// # Errors
///
/// `Persistence` / `Serialization` when stored rows cannot be read.
pub fn get_summary(
    store: &HistoryStore,
    window: &TimeWindow,
    scope: Option<&ScanScope>,
    least_stable_n: usize,
) -> Result<HistorySummary> {
    let scope = scope.map(ScanScope::normalized);
    traced("get_summary", || {
        let conn = store.connection();
        let scans = list_scans_in_range(conn, window, scope.as_ref())?;
        let (Some(first), Some(last)) = (scans.first(), scans.last()) else {
            return Ok(HistorySummary::empty(*window));
        };

        let mut summary = HistorySummary::empty(*window);
        summary.scan_count = scans.len();
        summary.first_scan_at = Some(first.timestamp);
        summary.last_scan_at = Some(last.timestamp);
        summary.namespace_resource_counts = namespace_counts(conn, last.id)?;

        for change in list_changes_in_range(conn, window, scope.as_ref())? {
            let record = &change.record;
            *summary.changes_by_kind.entry(record.kind).or_default() += 1;
            *summary
                .changes_by_namespace
                .entry(record.identity.namespace.clone())
                .or_default() += 1;
            *summary
                .changes_by_resource_kind
                .entry(record.identity.kind.clone())
                .or_default() += 1;
        }

        let scored = timelines_in_range(conn, window, scope.as_ref())?
            .iter()
            .map(|(identity, segments)| {
                score_segments(identity, segments.iter().map(Vec::as_slice))
            })
            .collect();
        summary.least_stable = least_stable(scored, least_stable_n);

        Ok(summary)
    })
}
