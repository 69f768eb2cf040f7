//! Retention manager.
//!
//! Removes whole scans strictly older than the keep window, measured back
//! from the most recent scan's timestamp. The most recent scan itself is never
//! removed, so the next ingest always has a baseline. Resources, change sets
//! and change rows go with their scan through `ON DELETE CASCADE`.
//!
//! Each scan is deleted in its own transaction and the cancel flag is polled
//! between scans: a cancelled sweep stops after the last committed delete and
//! reports exactly what it removed.

use crate::db::HistoryStore;
use crate::errors::{from_rusqlite, Result};
use crate::scan::query::latest_scan;
use chrono::{DateTime, Duration, Utc};
use kubetrail_core::model::window::ensure_positive;
use kubetrail_core::{CancelFlag, ScanId};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionReport {
    /// Oldest first
    pub removed_scan_ids: Vec<ScanId>,
    pub freed_resource_count: usize,
    /// Scans older than this were eligible
    pub cutoff: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Cancellation stopped the sweep early
    pub interrupted: bool,
}

struct Candidate {
    id: ScanId,
    resources: usize,
}

/// Remove scans older than `keep_window` before the most recent scan.
///
/// With `dry_run` the same report is computed and nothing is modified.
///
/// # Errors
///
/// - `InvalidWindow`: `keep_window` is zero or negative (checked before any
///   mutation)
/// - `WriteContention`: a delete could not obtain the write lock
/// - `Persistence`: SQLite failed
pub fn cleanup(
    store: &mut HistoryStore,
    keep_window: Duration,
    dry_run: bool,
    cancel: &CancelFlag,
) -> Result<RetentionReport> {
    ensure_positive("cleanup", keep_window)?;

    let mut report = RetentionReport {
        dry_run,
        ..Default::default()
    };
    let Some(latest) = latest_scan(store.connection(), None)? else {
        return Ok(report);
    };
    let cutoff = latest.timestamp - keep_window;
    report.cutoff = Some(cutoff);

    let candidates = find_candidates(store.connection(), cutoff, latest.id)?;

    if dry_run {
        for c in candidates {
            report.removed_scan_ids.push(c.id);
            report.freed_resource_count += c.resources;
        }
        return Ok(report);
    }

    for candidate in candidates {
        if cancel.is_cancelled() {
            tracing::warn!(
                removed = report.removed_scan_ids.len(),
                "retention sweep cancelled"
            );
            report.interrupted = true;
            break;
        }
        if delete_scan(store, &candidate)? {
            report.removed_scan_ids.push(candidate.id);
            report.freed_resource_count += candidate.resources;
        }
    }
    Ok(report)
}

fn find_candidates(conn: &Connection, cutoff: DateTime<Utc>, keep: ScanId) -> Result<Vec<Candidate>> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, (SELECT COUNT(*) FROM resources r WHERE r.scan_id = s.id)
             FROM scans s
             WHERE s.timestamp_ms < ?1 AND s.id != ?2
             ORDER BY s.timestamp_ms, s.id",
        )
        .map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<Candidate>, _> = stmt
        .query_map(
            rusqlite::params![cutoff.timestamp_millis(), keep.get()],
            |row| {
                Ok(Candidate {
                    id: ScanId(row.get(0)?),
                    resources: row.get::<_, i64>(1)? as usize,
                })
            },
        )
        .map_err(from_rusqlite)?
        .collect();
    rows.map_err(from_rusqlite)
}

/// Delete one scan; `false` if another process already removed it.
fn delete_scan(store: &mut HistoryStore, candidate: &Candidate) -> Result<bool> {
    let tx = store
        .connection_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| from_rusqlite(e).with_op("cleanup"))?;

    let still_there = tx
        .query_row("SELECT 1 FROM scans WHERE id = ?1", [candidate.id.get()], |_| Ok(()))
        .optional()
        .map_err(from_rusqlite)?
        .is_some();
    if still_there {
        tx.execute("DELETE FROM scans WHERE id = ?1", [candidate.id.get()])
            .map_err(|e| from_rusqlite(e).with_op("cleanup").with_scan_id(candidate.id.get()))?;
    }

    tx.commit().map_err(|e| from_rusqlite(e).with_op("cleanup"))?;
    if still_there {
        tracing::debug!(scan_id = candidate.id.get(), "removed scan");
    }
    Ok(still_there)
}
