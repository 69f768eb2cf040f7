//! Stability scoring over a resource timeline.
//!
//! The score is `1 - change_count / max(observation_count, 1)` clamped to
//! `[0, 1]`. An identity never observed in the window has no score at all:
//! missing data is not reported as stability.

use crate::diff::ChangeKind;
use crate::model::{Fingerprint, ResourceIdentity, ScanId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// State of one identity in one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub scan_id: ScanId,
    pub timestamp: DateTime<Utc>,
    /// `None` when the identity was absent from that scan
    pub fingerprint: Option<Fingerprint>,
}

/// Breakdown of `change_count` by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChurnSummary {
    fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Removed => self.removed += 1,
            ChangeKind::Modified => self.modified += 1,
            ChangeKind::Unchanged => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityResult {
    pub identity: ResourceIdentity,
    /// `None` when `observation_count == 0`
    pub score: Option<f64>,
    pub observation_count: usize,
    pub change_count: usize,
    pub last_changed_at: Option<DateTime<Utc>>,
    pub churn: ChurnSummary,
}

impl StabilityResult {
    pub fn is_observed(&self) -> bool {
        self.observation_count > 0
    }
}

fn transition(prev: Option<&Fingerprint>, next: Option<&Fingerprint>) -> ChangeKind {
    match (prev, next) {
        (None, Some(_)) => ChangeKind::Added,
        (Some(_), None) => ChangeKind::Removed,
        (Some(a), Some(b)) if a != b => ChangeKind::Modified,
        _ => ChangeKind::Unchanged,
    }
}

/// Score one identity from its timeline. Entries may come in any order; they
/// are compared in `(timestamp, scan_id)` order.
pub fn score_timeline(identity: &ResourceIdentity, entries: &[TimelineEntry]) -> StabilityResult {
    score_segments(identity, [entries])
}

/// Score one identity from several independent timelines, one per scan
/// scope. Transitions are only counted inside a segment, never across two:
/// scans of different scopes are not comparable.
pub fn score_segments<'a, I>(identity: &ResourceIdentity, segments: I) -> StabilityResult
where
    I: IntoIterator<Item = &'a [TimelineEntry]>,
{
    let mut observation_count = 0;
    let mut churn = ChurnSummary::default();
    let mut change_count = 0;
    let mut last_changed_at: Option<DateTime<Utc>> = None;

    for entries in segments {
        let mut ordered: Vec<&TimelineEntry> = entries.iter().collect();
        ordered.sort_by_key(|e| (e.timestamp, e.scan_id));
        observation_count += ordered.iter().filter(|e| e.fingerprint.is_some()).count();

        for pair in ordered.windows(2) {
            let kind = transition(pair[0].fingerprint.as_ref(), pair[1].fingerprint.as_ref());
            if kind.is_change() {
                change_count += 1;
                churn.record(kind);
                last_changed_at = last_changed_at.max(Some(pair[1].timestamp));
            }
        }
    }

    let score = (observation_count > 0).then(|| {
        let raw = 1.0 - change_count as f64 / observation_count.max(1) as f64;
        raw.clamp(0.0, 1.0)
    });

    StabilityResult {
        identity: identity.clone(),
        score,
        observation_count,
        change_count,
        last_changed_at,
        churn,
    }
}

/// Least stable first: lowest score, then most changes, then identity.
/// Unobserved identities are dropped.
pub fn least_stable(mut results: Vec<StabilityResult>, limit: usize) -> Vec<StabilityResult> {
    results.retain(StabilityResult::is_observed);
    results.sort_by(|a, b| {
        let sa = a.score.unwrap_or(1.0);
        let sb = b.score.unwrap_or(1.0);
        sa.partial_cmp(&sb)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.change_count.cmp(&a.change_count))
            .then_with(|| a.identity.cmp(&b.identity))
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id() -> ResourceIdentity {
        ResourceIdentity::new("Deployment", "default", "app")
    }

    fn entry(n: i64, fp: Option<&str>) -> TimelineEntry {
        TimelineEntry {
            scan_id: ScanId(n),
            timestamp: Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap(),
            fingerprint: fp.map(Fingerprint::from_hex),
        }
    }

    #[test]
    fn test_no_changes_scores_one() {
        let r = score_timeline(&id(), &[entry(1, Some("a")), entry(2, Some("a")), entry(3, Some("a"))]);
        assert_eq!(r.score, Some(1.0));
        assert_eq!(r.observation_count, 3);
        assert_eq!(r.change_count, 0);
        assert_eq!(r.last_changed_at, None);
    }

    #[test]
    fn test_changes_counted_across_consecutive_pairs() {
        let entries = [
            entry(1, Some("a")),
            entry(2, Some("b")),
            entry(3, None),
            entry(4, Some("b")),
        ];
        let r = score_timeline(&id(), &entries);
        assert_eq!(r.observation_count, 3);
        assert_eq!(r.change_count, 3);
        assert_eq!(r.churn, ChurnSummary { added: 1, removed: 1, modified: 1 });
        assert_eq!(r.score, Some(0.0));
        assert_eq!(r.last_changed_at, Some(entries[3].timestamp));
    }

    #[test]
    fn test_entries_are_ordered_before_scoring() {
        let r = score_timeline(&id(), &[entry(3, Some("b")), entry(1, Some("a")), entry(2, Some("a"))]);
        assert_eq!(r.change_count, 1);
        assert!((r.score.unwrap() - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_segments_are_not_compared_to_each_other() {
        // Two scopes scanned alternately, each holding its own stable copy.
        let team_a = [entry(1, Some("a")), entry(3, Some("a"))];
        let team_b = [entry(2, None), entry(4, None)];
        let r = score_segments(&id(), [&team_a[..], &team_b[..]]);
        assert_eq!(r.score, Some(1.0));
        assert_eq!(r.change_count, 0);
        assert_eq!(r.observation_count, 2);

        let merged = score_timeline(&id(), &[team_a[0].clone(), team_b[0].clone(), team_a[1].clone(), team_b[1].clone()]);
        assert_eq!(merged.change_count, 3);
    }

    #[test]
    fn test_segment_totals_are_summed() {
        let first = [entry(1, Some("a")), entry(2, Some("b"))];
        let second = [entry(3, Some("x")), entry(5, None)];
        let r = score_segments(&id(), [&first[..], &second[..]]);
        assert_eq!(r.observation_count, 3);
        assert_eq!(r.change_count, 2);
        assert_eq!(r.churn, ChurnSummary { added: 0, removed: 1, modified: 1 });
        assert_eq!(r.last_changed_at, Some(second[1].timestamp));
    }

    #[test]
    fn test_unobserved_identity_has_no_score() {
        let r = score_timeline(&id(), &[entry(1, None), entry(2, None)]);
        assert_eq!(r.observation_count, 0);
        assert_eq!(r.score, None);
        assert!(score_timeline(&id(), &[]).score.is_none());
    }

    #[test]
    fn test_least_stable_orders_and_drops_unobserved() {
        let churny = score_timeline(&ResourceIdentity::new("ConfigMap", "d", "a"), &[entry(1, Some("a")), entry(2, Some("b"))]);
        let calm = score_timeline(&ResourceIdentity::new("ConfigMap", "d", "b"), &[entry(1, Some("a")), entry(2, Some("a"))]);
        let missing = score_timeline(&ResourceIdentity::new("ConfigMap", "d", "c"), &[entry(1, None)]);
        let ranked = least_stable(vec![calm, missing, churny], 5);
        let names: Vec<_> = ranked.iter().map(|r| r.identity.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
