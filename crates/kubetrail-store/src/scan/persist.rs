//! Scan append.
//!
//! One scan is written in a single `BEGIN IMMEDIATE` transaction: the scan
//! row, every resource row, and (when a baseline of the same scope exists)
//! the change set and change rows. Either all of it commits or none of it is
//! visible. `IMMEDIATE` takes the write lock up front, so concurrent writers
//! queue on the store's busy timeout and fail with `WriteContention` when it
//! runs out.

use crate::db::HistoryStore;
use crate::errors::{from_rusqlite, Result};
use crate::scan::query::{fetch_resources, latest_scan_at_or_before};
use chrono::{DateTime, TimeZone, Utc};
use kubetrail_core::diff::{
    diff_resources, summarize_record, ChangeCounts, DiffLimits, DiffOptions, DiffResult,
};
use kubetrail_core::{ScanDraft, ScanId, ScanSummary};
use rusqlite::{Transaction, TransactionBehavior};

/// What an append wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub scan: ScanSummary,
    /// Most recent scan of the same scope at or before this scan's timestamp
    pub baseline: Option<ScanId>,
    /// Counts against the baseline; `None` for the first scan of a scope
    pub counts: Option<ChangeCounts>,
}

/// Persist a draft as a new scan and record its changes against the
/// baseline.
///
/// # Errors
///
/// - `WriteContention`: the write lock was not obtained within the timeout
/// - `Persistence`: any insert failed (nothing is left behind)
/// - `Serialization`: the baseline's stored resources cannot be decoded
pub fn append_scan(
    store: &mut HistoryStore,
    draft: &ScanDraft,
    limits: DiffLimits,
) -> Result<AppendOutcome> {
    let tx = store
        .connection_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| from_rusqlite(e).with_op("append_scan"))?;

    let outcome = write_scan(&tx, draft, limits)?;

    tx.commit()
        .map_err(|e| from_rusqlite(e).with_op("append_scan"))?;

    tracing::debug!(
        scan_id = outcome.scan.id.get(),
        baseline_scan_id = outcome.baseline.map(ScanId::get),
        resource_count = outcome.scan.resource_count,
        "appended scan"
    );
    Ok(outcome)
}

/// Storage precision is milliseconds
fn truncate_to_ms(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}

fn write_scan(tx: &Transaction<'_>, draft: &ScanDraft, limits: DiffLimits) -> Result<AppendOutcome> {
    let scope = draft.scope.normalized();
    let timestamp = truncate_to_ms(draft.timestamp);
    // Back-dated drafts diff against their predecessor in time, not the newest row.
    let baseline = latest_scan_at_or_before(tx, &scope, timestamp)?;

    tx.execute(
        "INSERT INTO scans (timestamp_ms, scope_json, resource_count, skipped_count,
                            cluster_version, node_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            timestamp.timestamp_millis(),
            scope.scope_key(),
            draft.resources.len() as i64,
            draft.skipped_count() as i64,
            draft.metadata.cluster_version,
            draft.metadata.node_count,
        ],
    )
    .map_err(|e| from_rusqlite(e).with_op("insert_scan"))?;
    let scan_id = ScanId(tx.last_insert_rowid());

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO resources (scan_id, kind, namespace, name, api_version,
                                        fingerprint, canonical_json, helm_release)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(from_rusqlite)?;
        for resource in &draft.resources {
            let id = resource.identity();
            stmt.execute(rusqlite::params![
                scan_id.get(),
                id.kind,
                id.namespace,
                id.name,
                resource.api_version(),
                resource.fingerprint().as_str(),
                resource.to_canonical_json(),
                resource.managed_by_release(),
            ])
            .map_err(|e| {
                from_rusqlite(e)
                    .with_op("insert_resource")
                    .with_entity_id(id.to_string())
                    .with_scan_id(scan_id.get())
            })?;
        }
    }

    let counts = match &baseline {
        Some(base) => {
            let old = fetch_resources(tx, base.id)?;
            let result = diff_resources(
                &old,
                &draft.resources,
                &DiffOptions::default().with_limits(limits),
            );
            write_changes(tx, base.id, scan_id, &result)?;
            Some(result.counts)
        }
        None => None,
    };

    Ok(AppendOutcome {
        scan: ScanSummary {
            id: scan_id,
            timestamp,
            scope,
            metadata: draft.metadata.clone(),
            resource_count: draft.resources.len(),
        },
        baseline: baseline.map(|b| b.id),
        counts,
    })
}

/// Record the change set and one row per non-unchanged identity.
pub(crate) fn write_changes(
    tx: &Transaction<'_>,
    from: ScanId,
    to: ScanId,
    result: &DiffResult,
) -> Result<()> {
    let c = &result.counts;
    tx.execute(
        "INSERT INTO change_sets (from_scan_id, to_scan_id, added, removed, modified, unchanged)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            from.get(),
            to.get(),
            c.added as i64,
            c.removed as i64,
            c.modified as i64,
            c.unchanged as i64
        ],
    )
    .map_err(|e| from_rusqlite(e).with_op("insert_change_set"))?;

    let mut stmt = tx
        .prepare(
            "INSERT INTO changes (from_scan_id, to_scan_id, kind, namespace, name,
                                  change_kind, delta_json, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(from_rusqlite)?;
    for record in result.changes() {
        let delta_json = serde_json::to_string(&record.delta)?;
        stmt.execute(rusqlite::params![
            from.get(),
            to.get(),
            record.identity.kind,
            record.identity.namespace,
            record.identity.name,
            record.kind.as_str(),
            delta_json,
            summarize_record(record),
        ])
        .map_err(|e| {
            from_rusqlite(e)
                .with_op("insert_change")
                .with_entity_id(record.identity.to_string())
        })?;
    }
    Ok(())
}
