//! Diff engine.
//!
//! Classifies every identity of two resource collections as added, removed,
//! modified or unchanged, and describes modifications as a bounded list of
//! field changes.
//!
//! ## Entry point
//!
//! ```ignore
//! use kubetrail_core::diff::{diff_resources, DiffOptions};
//!
//! let result = diff_resources(&old, &new, &DiffOptions::default());
//! for record in result.changes() {
//!     println!("{}", kubetrail_core::diff::summarize_record(record));
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: records are sorted by identity, field changes by path.
//! - **Affected-set symmetry**: swapping the operands swaps added/removed but
//!   leaves the set of affected identities unchanged.
//! - **Boundedness**: deltas respect [`DiffLimits`].

pub mod engine;
pub mod human_summary;
pub mod model;
pub mod structural;

pub use engine::{diff_resources, diff_scans, DiffOptions};
pub use human_summary::{summarize_field_change, summarize_record};
pub use model::{ChangeCounts, ChangeKind, ChangeRecord, Delta, DiffResult, FieldChange, FieldOp};
pub use structural::{structural_diff, DiffLimits};
