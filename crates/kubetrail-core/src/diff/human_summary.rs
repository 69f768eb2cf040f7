//! Human-readable renderings of diff output.
//!
//! Informational only: nothing here feeds back into classification.

use crate::diff::model::{ChangeKind, ChangeRecord, FieldChange, FieldOp};
use serde_json::Value;

const MAX_VALUE_CHARS: usize = 60;
const MAX_FIELDS_IN_LINE: usize = 3;

/// One line for a field change, e.g. `spec.replicas: 2 → 3`.
pub fn summarize_field_change(change: &FieldChange) -> String {
    let path = if change.path.is_empty() {
        "<root>"
    } else {
        change.path.as_str()
    };
    match change.op {
        FieldOp::Changed => format!(
            "{}: {} → {}",
            path,
            render_value(change.old.as_ref()),
            render_value(change.new.as_ref())
        ),
        FieldOp::Added => format!("+{}: {}", path, render_value(change.new.as_ref())),
        FieldOp::Removed => format!("-{}: {}", path, render_value(change.old.as_ref())),
        FieldOp::Replaced => format!("~{}: replaced", path),
    }
}

/// One line for a change record, as stored next to each change row.
pub fn summarize_record(record: &ChangeRecord) -> String {
    match record.kind {
        ChangeKind::Added => format!("added {}", record.identity),
        ChangeKind::Removed => format!("removed {}", record.identity),
        ChangeKind::Unchanged => format!("unchanged {}", record.identity),
        ChangeKind::Modified => {
            let changes = &record.delta.changes;
            let mut parts: Vec<String> = changes
                .iter()
                .take(MAX_FIELDS_IN_LINE)
                .map(summarize_field_change)
                .collect();
            if changes.len() > MAX_FIELDS_IN_LINE {
                parts.push(format!("(+{} more)", changes.len() - MAX_FIELDS_IN_LINE));
            }
            if record.delta.truncated {
                parts.push("(truncated)".to_string());
            }
            parts.join("; ")
        }
    }
}

fn render_value(value: Option<&Value>) -> String {
    let text = match value {
        None => return "∅".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if text.chars().count() > MAX_VALUE_CHARS {
        let cut: String = text.chars().take(MAX_VALUE_CHARS).collect();
        format!("{}…", cut)
    } else {
        text
    }
}
