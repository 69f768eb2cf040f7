#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use kubetrail_core::drift::DriftCategory;
use kubetrail_core::{EngineConfig, ResourceIdentity};
use kubetrail_engine::drift;

#[test]
fn test_declared_only_config_map() {
    let declared = vec![config_map("default", "cfg", "info")];
    let report = drift(&EngineConfig::default(), &declared, &[], false);

    assert_eq!(
        report.category_of(&ResourceIdentity::new("ConfigMap", "default", "cfg")),
        Some(DriftCategory::OnlyDeclared)
    );
    assert_eq!(report.counts.only_declared, 1);
    assert!(report.has_drift());
}

#[test]
fn test_cluster_bookkeeping_is_not_drift() {
    let declared = vec![deployment("app", 2), service("web")];
    let mut live_svc = service("web");
    live_svc["spec"]["clusterIP"] = serde_json::json!("10.96.0.4");
    let actual = vec![deployment("app", 2), live_svc];

    let report = drift(&EngineConfig::default(), &declared, &actual, false);
    assert_eq!(report.counts.matches, 2);
    assert_eq!(report.counts.match_ratio(), Some(1.0));
    assert!(!report.has_drift());
}

#[test]
fn test_hide_system_uses_configured_filter() {
    let declared = vec![config_map("default", "cfg", "info")];
    let actual = vec![
        config_map("default", "cfg", "debug"),
        config_map("kube-system", "coredns", "x"),
        config_map("platform", "agent", "x"),
    ];

    let mut config = EngineConfig::default();
    config.drift.system_namespaces.push("platform".to_string());

    let report = drift(&config, &declared, &actual, true);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.hidden_system_count, 2);
    assert_eq!(report.counts.differs, 1);
    assert_eq!(report.counts.match_ratio(), Some(0.0));

    let delta = &report.results[0].delta;
    assert_eq!(delta.changes[0].path, "data.LOG_LEVEL");
}
