#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use kubetrail_core::EngineConfig;
use kubetrail_engine::{ingest, IngestOptions, IngestOutcome};
use kubetrail_core::ScanScope;
use kubetrail_store::HistoryStore;
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn deployment(name: &str, replicas: i64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": "default",
            "uid": format!("uid-{}-{}", name, replicas),
            "resourceVersion": format!("{}", 1000 + replicas),
            "creationTimestamp": "2024-01-01T00:00:00Z"
        },
        "spec": {
            "replicas": replicas,
            "progressDeadlineSeconds": 600,
            "template": {"spec": {"containers": [{"name": "app", "image": "app:1.0"}]}}
        },
        "status": {"readyReplicas": replicas}
    })
}

pub fn service(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": name, "namespace": "default"},
        "spec": {"clusterIP": "10.0.0.12", "ports": [{"port": 80}]}
    })
}

pub fn config_map(namespace: &str, name: &str, value: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": namespace},
        "data": {"LOG_LEVEL": value}
    })
}

/// File-backed store in a scratch directory; keep the `TempDir` alive.
pub fn scratch_store() -> (TempDir, HistoryStore) {
    let dir = TempDir::new().unwrap();
    let store =
        HistoryStore::open(&dir.path().join("history.db"), std::time::Duration::from_secs(5))
            .unwrap();
    (dir, store)
}

pub fn ago(d: Duration) -> DateTime<Utc> {
    Utc::now() - d
}

pub fn ingest_at(store: &mut HistoryStore, docs: &[Value], at: DateTime<Utc>) -> IngestOutcome {
    ingest(
        store,
        &EngineConfig::default(),
        &ScanScope::default(),
        docs,
        IngestOptions::default().at(at),
    )
    .unwrap()
}

pub fn ingest_scoped(
    store: &mut HistoryStore,
    namespace: &str,
    docs: &[Value],
    at: DateTime<Utc>,
) -> IngestOutcome {
    ingest(
        store,
        &EngineConfig::default(),
        &ScanScope::new(None, Some(namespace.to_string())),
        docs,
        IngestOptions::default().at(at),
    )
    .unwrap()
}
