//! Read-only scan history queries.
//!
//! Every function takes a plain `&Connection` so it can run either on the
//! store connection or inside an open transaction (`Transaction` derefs to
//! `Connection`).

use crate::errors::{corrupt_row, from_rusqlite, Result};
use chrono::{DateTime, TimeZone, Utc};
use kubetrail_core::diff::{ChangeCounts, ChangeKind, ChangeRecord, Delta};
use kubetrail_core::errors::{ExError, ExErrorKind};
use kubetrail_core::stability::TimelineEntry;
use kubetrail_core::{
    CanonicalResource, Fingerprint, ResourceIdentity, Scan, ScanId, ScanMetadata, ScanScope,
    ScanSummary, TimeWindow,
};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

const SCAN_COLUMNS: &str =
    "id, timestamp_ms, scope_json, resource_count, cluster_version, node_count";

/// A change row as persisted, with its one-line summary.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChange {
    pub from_scan_id: ScanId,
    pub to_scan_id: ScanId,
    pub record: ChangeRecord,
    pub summary: String,
}

pub(crate) fn ms_to_datetime(op: &str, ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt_row(op, format!("timestamp {} out of range", ms)))
}

/// Raw scan row before decoding JSON and timestamps
struct ScanRow {
    id: i64,
    timestamp_ms: i64,
    scope_json: String,
    resource_count: i64,
    cluster_version: Option<String>,
    node_count: Option<i64>,
}

fn row_to_scan_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRow> {
    Ok(ScanRow {
        id: row.get(0)?,
        timestamp_ms: row.get(1)?,
        scope_json: row.get(2)?,
        resource_count: row.get(3)?,
        cluster_version: row.get(4)?,
        node_count: row.get(5)?,
    })
}

fn decode_summary(row: ScanRow) -> Result<ScanSummary> {
    let scope: ScanScope = serde_json::from_str(&row.scope_json)
        .map_err(|e| corrupt_row("decode_scan", e.to_string()).with_scan_id(row.id))?;
    Ok(ScanSummary {
        id: ScanId(row.id),
        timestamp: ms_to_datetime("decode_scan", row.timestamp_ms)?,
        scope,
        metadata: ScanMetadata {
            cluster_version: row.cluster_version,
            node_count: row.node_count.and_then(|n| u32::try_from(n).ok()),
        },
        resource_count: usize::try_from(row.resource_count).unwrap_or_default(),
    })
}

fn collect_summaries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ScanSummary>> {
    let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<ScanRow>, _> = stmt
        .query_map(params, row_to_scan_row)
        .map_err(from_rusqlite)?
        .collect();
    rows.map_err(from_rusqlite)?
        .into_iter()
        .map(decode_summary)
        .collect()
}

fn scan_not_found(op: &str, id: ScanId) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op(op.to_string())
        .with_scan_id(id.get())
        .with_message("scan not found")
}

/// Fetch a scan header by id.
///
/// # Errors
///
/// - `NotFound`: no scan with this id
/// - `Persistence`: SQLite read failed
pub fn fetch_scan_summary(conn: &Connection, id: ScanId) -> Result<ScanSummary> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM scans WHERE id = ?1", SCAN_COLUMNS),
            [id.get()],
            row_to_scan_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .ok_or_else(|| scan_not_found("fetch_scan_summary", id))?;
    decode_summary(row)
}

/// Fetch a scan with all of its resources.
///
/// # Errors
///
/// - `NotFound`: no scan with this id
/// - `Serialization`: a stored resource can no longer be decoded
pub fn fetch_scan(conn: &Connection, id: ScanId) -> Result<Scan> {
    let summary = fetch_scan_summary(conn, id)?;
    let resources = fetch_resources(conn, id)?;
    Ok(Scan {
        id: summary.id,
        timestamp: summary.timestamp,
        scope: summary.scope,
        metadata: summary.metadata,
        resources,
    })
}

/// Resources of one scan, sorted by identity.
///
/// # Errors
///
/// `Serialization` when a stored canonical document no longer parses.
pub fn fetch_resources(conn: &Connection, scan_id: ScanId) -> Result<Vec<CanonicalResource>> {
    let mut stmt = conn
        .prepare(
            "SELECT canonical_json FROM resources WHERE scan_id = ?1
             ORDER BY kind, namespace, name",
        )
        .map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<String>, _> = stmt
        .query_map([scan_id.get()], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect();
    rows.map_err(from_rusqlite)?
        .iter()
        .map(|json| {
            CanonicalResource::from_canonical_json(json).map_err(|e| {
                corrupt_row("fetch_resources", e.to_string()).with_scan_id(scan_id.get())
            })
        })
        .collect()
}

/// Most recent scan (greatest timestamp, then id), optionally with an exact
/// scope match.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn latest_scan(conn: &Connection, scope: Option<&ScanScope>) -> Result<Option<ScanSummary>> {
    let mut found = list_scans(conn, Some(1), scope)?;
    Ok(found.pop())
}

/// Most recent scan of exactly `scope` whose timestamp is not after `at`.
///
/// This is the baseline a scan taken at `at` diffs against, even when scans
/// are ingested out of timestamp order.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn latest_scan_at_or_before(
    conn: &Connection,
    scope: &ScanScope,
    at: DateTime<Utc>,
) -> Result<Option<ScanSummary>> {
    let mut found = collect_summaries(
        conn,
        &format!(
            "SELECT {} FROM scans WHERE scope_json = ?1 AND timestamp_ms <= ?2
             ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
            SCAN_COLUMNS
        ),
        rusqlite::params![scope.scope_key(), at.timestamp_millis()],
    )?;
    Ok(found.pop())
}

/// Scan headers, newest first.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn list_scans(
    conn: &Connection,
    limit: Option<usize>,
    scope: Option<&ScanScope>,
) -> Result<Vec<ScanSummary>> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    match scope {
        None => collect_summaries(
            conn,
            &format!(
                "SELECT {} FROM scans ORDER BY timestamp_ms DESC, id DESC LIMIT ?1",
                SCAN_COLUMNS
            ),
            rusqlite::params![limit],
        ),
        Some(scope) => collect_summaries(
            conn,
            &format!(
                "SELECT {} FROM scans WHERE scope_json = ?1
                 ORDER BY timestamp_ms DESC, id DESC LIMIT ?2",
                SCAN_COLUMNS
            ),
            rusqlite::params![scope.scope_key(), limit],
        ),
    }
}

/// Scan headers whose timestamp falls inside `window`, oldest first.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn list_scans_in_range(
    conn: &Connection,
    window: &TimeWindow,
    scope: Option<&ScanScope>,
) -> Result<Vec<ScanSummary>> {
    let start = window.start.timestamp_millis();
    let end = window.end.timestamp_millis();
    match scope {
        None => collect_summaries(
            conn,
            &format!(
                "SELECT {} FROM scans WHERE timestamp_ms BETWEEN ?1 AND ?2
                 ORDER BY timestamp_ms, id",
                SCAN_COLUMNS
            ),
            rusqlite::params![start, end],
        ),
        Some(scope) => collect_summaries(
            conn,
            &format!(
                "SELECT {} FROM scans WHERE timestamp_ms BETWEEN ?1 AND ?2 AND scope_json = ?3
                 ORDER BY timestamp_ms, id",
                SCAN_COLUMNS
            ),
            rusqlite::params![start, end, scope.scope_key()],
        ),
    }
}

/// Counts recorded when `to` was ingested against baseline `from`.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn fetch_change_set(conn: &Connection, from: ScanId, to: ScanId) -> Result<Option<ChangeCounts>> {
    conn.query_row(
        "SELECT added, removed, modified, unchanged FROM change_sets
         WHERE from_scan_id = ?1 AND to_scan_id = ?2",
        [from.get(), to.get()],
        |row| {
            Ok(ChangeCounts {
                added: row.get::<_, i64>(0)? as usize,
                removed: row.get::<_, i64>(1)? as usize,
                modified: row.get::<_, i64>(2)? as usize,
                unchanged: row.get::<_, i64>(3)? as usize,
            })
        },
    )
    .optional()
    .map_err(from_rusqlite)
}

struct ChangeRow {
    from: i64,
    to: i64,
    kind: String,
    namespace: String,
    name: String,
    change_kind: String,
    delta_json: String,
    summary: String,
}

fn row_to_change_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeRow> {
    Ok(ChangeRow {
        from: row.get(0)?,
        to: row.get(1)?,
        kind: row.get(2)?,
        namespace: row.get(3)?,
        name: row.get(4)?,
        change_kind: row.get(5)?,
        delta_json: row.get(6)?,
        summary: row.get(7)?,
    })
}

fn decode_change(row: ChangeRow) -> Result<StoredChange> {
    let kind = ChangeKind::parse(&row.change_kind).ok_or_else(|| {
        corrupt_row("decode_change", format!("unknown change kind '{}'", row.change_kind))
    })?;
    let delta: Delta = serde_json::from_str(&row.delta_json)
        .map_err(|e| corrupt_row("decode_change", e.to_string()))?;
    Ok(StoredChange {
        from_scan_id: ScanId(row.from),
        to_scan_id: ScanId(row.to),
        record: ChangeRecord::new(ResourceIdentity::new(row.kind, row.namespace, row.name), kind)
            .with_delta(delta),
        summary: row.summary,
    })
}

const CHANGE_COLUMNS: &str =
    "from_scan_id, to_scan_id, kind, namespace, name, change_kind, delta_json, summary";

fn collect_changes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<StoredChange>> {
    let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<ChangeRow>, _> = stmt
        .query_map(params, row_to_change_row)
        .map_err(from_rusqlite)?
        .collect();
    rows.map_err(from_rusqlite)?
        .into_iter()
        .map(decode_change)
        .collect()
}

/// Stored change rows for the ingest pair `(from, to)`, sorted by identity.
///
/// # Errors
///
/// - `NotFound`: either scan does not exist
/// - `Serialization`: a stored delta can no longer be decoded
pub fn fetch_changes(conn: &Connection, from: ScanId, to: ScanId) -> Result<Vec<StoredChange>> {
    fetch_scan_summary(conn, from)?;
    fetch_scan_summary(conn, to)?;
    collect_changes(
        conn,
        &format!(
            "SELECT {} FROM changes WHERE from_scan_id = ?1 AND to_scan_id = ?2
             ORDER BY kind, namespace, name",
            CHANGE_COLUMNS
        ),
        [from.get(), to.get()],
    )
}

/// Change rows whose target scan falls inside `window`.
///
/// # Errors
///
/// `Persistence` / `Serialization` as for [`fetch_changes`].
pub fn list_changes_in_range(
    conn: &Connection,
    window: &TimeWindow,
    scope: Option<&ScanScope>,
) -> Result<Vec<StoredChange>> {
    let start = window.start.timestamp_millis();
    let end = window.end.timestamp_millis();
    let scope_key = scope.map(ScanScope::scope_key);
    collect_changes(
        conn,
        "SELECT c.from_scan_id, c.to_scan_id, c.kind, c.namespace, c.name,
                c.change_kind, c.delta_json, c.summary
         FROM changes c JOIN scans s ON s.id = c.to_scan_id
         WHERE s.timestamp_ms BETWEEN ?1 AND ?2
           AND (?3 IS NULL OR s.scope_json = ?3)
         ORDER BY s.timestamp_ms, s.id, c.kind, c.namespace, c.name",
        rusqlite::params![start, end, scope_key],
    )
}

/// Whether `identity` appears in any stored scan.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn identity_exists(conn: &Connection, identity: &ResourceIdentity) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM resources WHERE kind = ?1 AND namespace = ?2 AND name = ?3 LIMIT 1",
        [&identity.kind, &identity.namespace, &identity.name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(from_rusqlite)
}

fn identity_not_found(identity: &ResourceIdentity) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op("resource_timeline")
        .with_entity_id(identity.to_string())
        .with_message("identity not present in any scan")
}

/// Every scan of a scope that held the identity at least once, joined with
/// the identity's fingerprint in that scan (NULL when absent).
const SCOPED_TIMELINE_SQL: &str = "SELECT s.id, s.timestamp_ms, s.scope_json, r.fingerprint
     FROM scans s
     LEFT JOIN resources r
       ON r.scan_id = s.id AND r.kind = ?1 AND r.namespace = ?2 AND r.name = ?3
     WHERE s.scope_json IN (
             SELECT DISTINCT s2.scope_json FROM scans s2
             JOIN resources r2 ON r2.scan_id = s2.id
             WHERE r2.kind = ?1 AND r2.namespace = ?2 AND r2.name = ?3)
       AND (?4 IS NULL OR s.scope_json = ?4)
       AND (?5 IS NULL OR s.timestamp_ms >= ?5)
       AND (?6 IS NULL OR s.timestamp_ms <= ?6)
     ORDER BY s.scope_json, s.timestamp_ms, s.id";

type ScopedEntry = (String, TimelineEntry);

fn scoped_timeline(
    conn: &Connection,
    identity: &ResourceIdentity,
    scope: Option<&ScanScope>,
    window: Option<&TimeWindow>,
) -> Result<Vec<ScopedEntry>> {
    if !identity_exists(conn, identity)? {
        return Err(identity_not_found(identity));
    }

    let scope_key = scope.map(ScanScope::scope_key);
    let start = window.map(|w| w.start.timestamp_millis());
    let end = window.map(|w| w.end.timestamp_millis());

    let mut stmt = conn.prepare(SCOPED_TIMELINE_SQL).map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<(i64, i64, String, Option<String>)>, _> = stmt
        .query_map(
            rusqlite::params![
                identity.kind,
                identity.namespace,
                identity.name,
                scope_key,
                start,
                end
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(from_rusqlite)?
        .collect();

    rows.map_err(from_rusqlite)?
        .into_iter()
        .map(|(id, ts, scope_json, fp)| {
            let entry = TimelineEntry {
                scan_id: ScanId(id),
                timestamp: ms_to_datetime("resource_timeline", ts)?,
                fingerprint: fp.map(Fingerprint::from_hex),
            };
            Ok((scope_json, entry))
        })
        .collect()
}

/// The state of `identity` in every scan of the scopes that ever held it
/// (optionally restricted to an exact scope and a window), ordered by
/// `(timestamp, id)`. Scans where the identity was absent carry
/// `fingerprint: None`.
///
/// Scans of scopes that never contained the identity are left out: a scan
/// that did not look at a namespace says nothing about what lives there.
///
/// # Errors
///
/// - `NotFound`: the identity is not present in any stored scan
/// - `Persistence`: SQLite read failed
pub fn resource_timeline(
    conn: &Connection,
    identity: &ResourceIdentity,
    scope: Option<&ScanScope>,
    window: Option<&TimeWindow>,
) -> Result<Vec<TimelineEntry>> {
    let mut entries: Vec<TimelineEntry> = scoped_timeline(conn, identity, scope, window)?
        .into_iter()
        .map(|(_, entry)| entry)
        .collect();
    entries.sort_by_key(|e| (e.timestamp, e.scan_id));
    Ok(entries)
}

/// Like [`resource_timeline`] without a scope filter, but split into one
/// timeline per scope so that consecutive scans are only ever compared
/// within the same scope.
///
/// # Errors
///
/// - `NotFound`: the identity is not present in any stored scan
/// - `Serialization`: a stored scope can no longer be decoded
/// - `Persistence`: SQLite read failed
pub fn resource_timelines_by_scope(
    conn: &Connection,
    identity: &ResourceIdentity,
    window: Option<&TimeWindow>,
) -> Result<Vec<(ScanScope, Vec<TimelineEntry>)>> {
    let mut grouped: Vec<(String, Vec<TimelineEntry>)> = Vec::new();
    for (scope_json, entry) in scoped_timeline(conn, identity, None, window)? {
        match grouped.last_mut() {
            Some((key, entries)) if *key == scope_json => entries.push(entry),
            _ => grouped.push((scope_json, vec![entry])),
        }
    }
    grouped
        .into_iter()
        .map(|(scope_json, entries)| {
            let scope: ScanScope = serde_json::from_str(&scope_json)
                .map_err(|e| corrupt_row("resource_timelines_by_scope", e.to_string()))?;
            Ok((scope, entries))
        })
        .collect()
}

/// Timelines of every identity seen in the window. Each identity gets one
/// timeline per scope it was present in, covering every scan of that scope
/// in the window.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn timelines_in_range(
    conn: &Connection,
    window: &TimeWindow,
    scope: Option<&ScanScope>,
) -> Result<BTreeMap<ResourceIdentity, Vec<Vec<TimelineEntry>>>> {
    let scans = list_scans_in_range(conn, window, scope)?;
    let mut scans_by_scope: BTreeMap<String, Vec<&ScanSummary>> = BTreeMap::new();
    for scan in &scans {
        scans_by_scope.entry(scan.scope.scope_key()).or_default().push(scan);
    }
    let scan_ids: BTreeSet<i64> = scans.iter().map(|s| s.id.get()).collect();

    let mut stmt = conn
        .prepare(
            "SELECT r.scan_id, r.kind, r.namespace, r.name, r.fingerprint
             FROM resources r JOIN scans s ON s.id = r.scan_id
             WHERE s.timestamp_ms BETWEEN ?1 AND ?2",
        )
        .map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<(i64, String, String, String, String)>, _> = stmt
        .query_map(
            rusqlite::params![window.start.timestamp_millis(), window.end.timestamp_millis()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .map_err(from_rusqlite)?
        .collect();

    let mut present: BTreeMap<ResourceIdentity, BTreeMap<i64, String>> = BTreeMap::new();
    for (scan_id, kind, namespace, name, fp) in rows.map_err(from_rusqlite)? {
        if scan_ids.contains(&scan_id) {
            present
                .entry(ResourceIdentity::new(kind, namespace, name))
                .or_default()
                .insert(scan_id, fp);
        }
    }

    Ok(present
        .into_iter()
        .map(|(identity, by_scan)| {
            let segments: Vec<Vec<TimelineEntry>> = scans_by_scope
                .values()
                .filter(|group| group.iter().any(|s| by_scan.contains_key(&s.id.get())))
                .map(|group| {
                    group
                        .iter()
                        .map(|s| TimelineEntry {
                            scan_id: s.id,
                            timestamp: s.timestamp,
                            fingerprint: by_scan
                                .get(&s.id.get())
                                .cloned()
                                .map(Fingerprint::from_hex),
                        })
                        .collect::<Vec<TimelineEntry>>()
                })
                .collect();
            (identity, segments)
        })
        .collect())
}

/// Resource count per namespace in one scan (`""` for cluster-scoped).
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn namespace_counts(conn: &Connection, scan_id: ScanId) -> Result<BTreeMap<String, usize>> {
    let mut stmt = conn
        .prepare("SELECT namespace, COUNT(*) FROM resources WHERE scan_id = ?1 GROUP BY namespace")
        .map_err(from_rusqlite)?;
    let rows: std::result::Result<Vec<(String, i64)>, _> = stmt
        .query_map([scan_id.get()], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(from_rusqlite)?
        .collect();
    Ok(rows
        .map_err(from_rusqlite)?
        .into_iter()
        .map(|(ns, n)| (ns, n as usize))
        .collect())
}

/// Helm release recorded for `identity` in one scan.
///
/// # Errors
///
/// `Persistence` when SQLite read fails.
pub fn helm_release_of(
    conn: &Connection,
    scan_id: ScanId,
    identity: &ResourceIdentity,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT helm_release FROM resources
         WHERE scan_id = ?1 AND kind = ?2 AND namespace = ?3 AND name = ?4",
        rusqlite::params![scan_id.get(), identity.kind, identity.namespace, identity.name],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
    .map_err(from_rusqlite)
}
