#![allow(clippy::unwrap_used, clippy::expect_used)]

use kubetrail_core::drift::{drift_documents, DriftCategory, DriftOptions, SystemFilter};
use kubetrail_core::{EngineConfig, Normalizer, ResourceIdentity};
use serde_json::{json, Value};

fn config_map(ns: &str, name: &str, data: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": ns},
        "data": data
    })
}

/// The cluster export of a manifest carries server-populated fields the
/// declared copy never has.
fn as_exported(mut doc: Value) -> Value {
    let metadata = doc["metadata"].as_object_mut().unwrap();
    metadata.insert("uid".into(), json!("5f0c-11ee"));
    metadata.insert("resourceVersion".into(), json!("48213"));
    metadata.insert("creationTimestamp".into(), json!("2024-03-01T10:00:00Z"));
    metadata.insert(
        "annotations".into(),
        json!({"kubectl.kubernetes.io/last-applied-configuration": "{...}"}),
    );
    doc
}

#[test]
fn test_declared_config_map_missing_from_cluster_is_only_declared() {
    let declared = vec![config_map("default", "cfg", json!({"k": "v"}))];
    let actual: Vec<Value> = Vec::new();

    let report = drift_documents(
        &Normalizer::default(),
        &declared,
        &actual,
        &SystemFilter::default(),
        &DriftOptions { hide_system: false, ..Default::default() },
    );

    assert_eq!(report.results.len(), 1);
    assert_eq!(
        report.category_of(&ResourceIdentity::new("ConfigMap", "default", "cfg")),
        Some(DriftCategory::OnlyDeclared)
    );
    assert_eq!(report.counts.only_declared, 1);
}

#[test]
fn test_server_populated_fields_do_not_count_as_drift() {
    let manifest = config_map("default", "app-config", json!({"LOG_LEVEL": "info"}));
    let declared = vec![manifest.clone()];
    let actual = vec![as_exported(manifest)];

    let report = drift_documents(
        &Normalizer::default(),
        &declared,
        &actual,
        &SystemFilter::default(),
        &DriftOptions::default(),
    );

    assert_eq!(report.counts.matches, 1);
    assert!(!report.has_drift());
}

#[test]
fn test_differs_carries_field_delta() {
    let declared = vec![config_map("default", "app-config", json!({"LOG_LEVEL": "info"}))];
    let actual = vec![as_exported(config_map(
        "default",
        "app-config",
        json!({"LOG_LEVEL": "debug"}),
    ))];

    let report = drift_documents(
        &Normalizer::default(),
        &declared,
        &actual,
        &SystemFilter::default(),
        &DriftOptions::default(),
    );

    assert_eq!(report.results[0].category, DriftCategory::Differs);
    let change = &report.results[0].delta.changes[0];
    assert_eq!(change.path, "data.LOG_LEVEL");
    assert_eq!(change.old, Some(json!("info")));
    assert_eq!(change.new, Some(json!("debug")));
    assert_eq!(report.counts.match_ratio(), Some(0.0));
}

#[test]
fn test_system_filter_from_config() {
    let config = EngineConfig::from_toml_str(
        r#"
        [drift]
        system_namespaces = ["platform"]
        system_kinds = []
        system_name_prefixes = []
        system_label_keys = ["platform.example.com/owned"]
        "#,
    )
    .unwrap();
    let filter = SystemFilter::new(config.drift);

    let actual = vec![
        config_map("platform", "agent", json!({})),
        config_map("kube-system", "coredns", json!({})),
        json!({
            "kind": "ConfigMap",
            "metadata": {
                "name": "labelled",
                "namespace": "apps",
                "labels": {"platform.example.com/owned": "true"}
            }
        }),
    ];
    let report = drift_documents(
        &Normalizer::default(),
        &[],
        &actual,
        &filter,
        &DriftOptions { hide_system: true, ..Default::default() },
    );

    assert_eq!(report.hidden_system_count, 2);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].identity.namespace, "kube-system");
    assert_eq!(report.results[0].category, DriftCategory::OnlyActual);
}
