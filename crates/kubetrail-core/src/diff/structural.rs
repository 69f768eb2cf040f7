//! Bounded structural diff of two canonical trees.
//!
//! Walks both trees path by path. A key or index on one side only is an
//! add/remove at that path; a differing leaf is a value change; a container
//! type mismatch is one replacement and the walk does not descend further.
//! Arrays are compared index-wise.
//!
//! Two bounds keep work and memory finite on arbitrarily nested documents:
//! at `max_depth` a differing subtree is reported as one replacement, and
//! after `max_changes` entries the delta is marked truncated.

use crate::config::DiffConfig;
use crate::diff::model::{Delta, FieldChange, FieldOp};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    pub max_depth: usize,
    pub max_changes: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        DiffLimits::from(&DiffConfig::default())
    }
}

impl From<&DiffConfig> for DiffLimits {
    fn from(config: &DiffConfig) -> Self {
        Self {
            max_depth: config.max_depth.max(1),
            max_changes: config.max_changes.max(1),
        }
    }
}

pub fn structural_diff(old: &Value, new: &Value, limits: DiffLimits) -> Delta {
    let mut walker = Walker {
        limits,
        delta: Delta::default(),
    };
    walker.walk(old, new, &mut String::new(), 0);
    walker.delta
}

struct Walker {
    limits: DiffLimits,
    delta: Delta,
}

impl Walker {
    fn push(&mut self, path: &str, op: FieldOp, old: Option<&Value>, new: Option<&Value>) {
        if self.delta.changes.len() >= self.limits.max_changes {
            self.delta.truncated = true;
            return;
        }
        self.delta.changes.push(FieldChange {
            path: path.to_string(),
            op,
            old: old.cloned(),
            new: new.cloned(),
        });
    }

    fn full(&self) -> bool {
        self.delta.truncated
    }

    fn walk(&mut self, old: &Value, new: &Value, path: &mut String, depth: usize) {
        if old == new || self.full() {
            return;
        }
        let descend = depth < self.limits.max_depth;
        match (old, new) {
            (Value::Object(a), Value::Object(b)) if descend => {
                let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
                for key in keys {
                    if self.full() {
                        return;
                    }
                    let mark = path.len();
                    push_key(path, key);
                    self.child(a.get(key), b.get(key), path, depth);
                    path.truncate(mark);
                }
            }
            (Value::Array(a), Value::Array(b)) if descend => {
                for i in 0..a.len().max(b.len()) {
                    if self.full() {
                        return;
                    }
                    let mark = path.len();
                    path.push_str(&format!("[{}]", i));
                    self.child(a.get(i), b.get(i), path, depth);
                    path.truncate(mark);
                }
            }
            _ if is_container(old) || is_container(new) => {
                self.push(path, FieldOp::Replaced, Some(old), Some(new));
            }
            _ => self.push(path, FieldOp::Changed, Some(old), Some(new)),
        }
    }

    fn child(&mut self, old: Option<&Value>, new: Option<&Value>, path: &mut String, depth: usize) {
        match (old, new) {
            (Some(o), Some(n)) => self.walk(o, n, path, depth + 1),
            (Some(o), None) => self.push(path, FieldOp::Removed, Some(o), None),
            (None, Some(n)) => self.push(path, FieldOp::Added, None, Some(n)),
            (None, None) => {}
        }
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn push_key(path: &mut String, key: &str) {
    if key.contains('.') || key.contains('[') {
        path.push_str(&format!("[{}]", Value::String(key.to_string())));
    } else {
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(delta: &Delta) -> Vec<(&str, FieldOp)> {
        delta.changes.iter().map(|c| (c.path.as_str(), c.op)).collect()
    }

    #[test]
    fn test_identical_trees_yield_empty_delta() {
        let v = json!({"spec": {"replicas": 2, "ports": [80]}});
        assert!(structural_diff(&v, &v, DiffLimits::default()).is_empty());
    }

    #[test]
    fn test_leaf_change_reports_dotted_path() {
        let old = json!({"spec": {"replicas": 2}});
        let new = json!({"spec": {"replicas": 3}});
        let delta = structural_diff(&old, &new, DiffLimits::default());
        assert_eq!(delta.changes.len(), 1);
        let change = &delta.changes[0];
        assert_eq!(change.path, "spec.replicas");
        assert_eq!(change.op, FieldOp::Changed);
        assert_eq!(change.old, Some(json!(2)));
        assert_eq!(change.new, Some(json!(3)));
    }

    #[test]
    fn test_added_and_removed_keys() {
        let old = json!({"data": {"a": "1", "b": "2"}});
        let new = json!({"data": {"b": "2", "c": "3"}});
        let delta = structural_diff(&old, &new, DiffLimits::default());
        assert_eq!(
            paths(&delta),
            vec![("data.a", FieldOp::Removed), ("data.c", FieldOp::Added)]
        );
    }

    #[test]
    fn test_arrays_are_compared_index_wise() {
        let old = json!({"ports": [{"port": 80}, {"port": 443}]});
        let new = json!({"ports": [{"port": 8080}]});
        let delta = structural_diff(&old, &new, DiffLimits::default());
        assert_eq!(
            paths(&delta),
            vec![("ports[0].port", FieldOp::Changed), ("ports[1]", FieldOp::Removed)]
        );
    }

    #[test]
    fn test_type_mismatch_is_a_replacement() {
        let old = json!({"spec": {"selector": {"app": "web"}}});
        let new = json!({"spec": {"selector": "app=web"}});
        let delta = structural_diff(&old, &new, DiffLimits::default());
        assert_eq!(paths(&delta), vec![("spec.selector", FieldOp::Replaced)]);
    }

    #[test]
    fn test_dotted_keys_are_quoted() {
        let old = json!({"metadata": {"labels": {"app.kubernetes.io/name": "a"}}});
        let new = json!({"metadata": {"labels": {"app.kubernetes.io/name": "b"}}});
        let delta = structural_diff(&old, &new, DiffLimits::default());
        assert_eq!(delta.changes[0].path, r#"metadata.labels["app.kubernetes.io/name"]"#);
    }

    #[test]
    fn test_depth_bound_replaces_subtree() {
        let old = json!({"a": {"b": {"c": {"d": 1}}}});
        let new = json!({"a": {"b": {"c": {"d": 2}}}});
        let limits = DiffLimits {
            max_depth: 2,
            max_changes: 100,
        };
        let delta = structural_diff(&old, &new, limits);
        assert_eq!(paths(&delta), vec![("a.b", FieldOp::Replaced)]);
    }

    #[test]
    fn test_change_bound_marks_truncated() {
        let old = json!({"a": 1, "b": 1, "c": 1, "d": 1});
        let new = json!({"a": 2, "b": 2, "c": 2, "d": 2});
        let limits = DiffLimits {
            max_depth: 8,
            max_changes: 2,
        };
        let delta = structural_diff(&old, &new, limits);
        assert_eq!(delta.changes.len(), 2);
        assert!(delta.truncated);
    }
}
