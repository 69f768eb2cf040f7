//! kubetrail engine - orchestration layer
//!
//! Coordinates the pure core (normalizer, diff engine, stability scorer,
//! drift comparator) with the history store. Every operation takes an
//! explicitly passed [`HistoryStore`](kubetrail_store::HistoryStore) opened
//! once per invocation; nothing here holds global state.

pub mod commands;

pub use commands::{
    cleanup, compare_scans, drift, get_changes, get_history, get_resource_timeline,
    get_summary, ingest, open_store, score_identity, HistorySummary, IngestOptions,
    IngestOutcome,
};
