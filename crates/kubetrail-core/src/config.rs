//! Engine configuration.
//!
//! Every section carries built-in defaults, so an empty TOML document (or no
//! file at all) yields a working configuration. A config file only needs the
//! keys it wants to change:
//!
//! ```toml
//! [diff]
//! max_depth = 16
//!
//! [[normalizer.strip_rules]]
//! path = "spec.template.metadata.annotations.checksum/config"
//! kinds = ["Deployment"]
//! ```

use crate::errors::{ExError, ExErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the store location
pub const STORE_PATH_ENV: &str = "KUBETRAIL_STORE";

const STORE_DIR: &str = ".kubetrail";
const STORE_FILE: &str = "history.db";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub diff: DiffConfig,
    pub drift: DriftConfig,
    pub store: StoreConfig,
}

/// Which fields the normalizer removes before fingerprinting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Keys removed from `metadata`
    pub volatile_metadata: Vec<String>,
    /// Keys removed from `metadata.annotations`
    pub volatile_annotations: Vec<String>,
    /// Keys removed from `metadata.labels`
    pub volatile_labels: Vec<String>,
    /// Extra removals addressed by dotted path
    pub strip_rules: Vec<StripRule>,
    /// Kinds whose `status` subtree is kept (all others lose it)
    pub retain_status_kinds: Vec<String>,
}

/// Remove the field at `path` (dotted, from the document root).
///
/// When `kinds` is non-empty the rule applies only to those kinds. When
/// `when_equals` is set the field is removed only if it holds exactly that
/// value, which is how API-server defaults are dropped without hiding
/// deliberate overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripRule {
    pub path: String,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub when_equals: Option<Value>,
}

impl StripRule {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kinds: Vec::new(),
            when_equals: None,
        }
    }

    pub fn for_kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    pub fn when_equals(mut self, value: Value) -> Self {
        self.when_equals = Some(value);
        self
    }

    pub fn applies_to(&self, kind: &str) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k == kind)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }
}

/// Bounds on structural delta computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Nesting depth below which a differing subtree is reported as one replacement
    pub max_depth: usize,
    /// Field changes recorded per resource before the delta is marked truncated
    pub max_changes: usize,
}

/// Platform-managed resources hidden by `hide_system`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub system_namespaces: Vec<String>,
    pub system_kinds: Vec<String>,
    pub system_name_prefixes: Vec<String>,
    pub system_label_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Explicit store file; `None` means the per-user default
    pub path: Option<PathBuf>,
    /// How long a writer waits for the store lock
    pub lock_timeout_ms: u64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            volatile_metadata: strings(&[
                "uid",
                "resourceVersion",
                "generation",
                "creationTimestamp",
                "deletionTimestamp",
                "deletionGracePeriodSeconds",
                "managedFields",
                "selfLink",
            ]),
            volatile_annotations: strings(&[
                "kubectl.kubernetes.io/last-applied-configuration",
                "deployment.kubernetes.io/revision",
                "kubectl.kubernetes.io/restartedAt",
            ]),
            volatile_labels: strings(&["pod-template-hash", "controller-revision-hash"]),
            strip_rules: vec![
                StripRule::new("spec.clusterIP").for_kind("Service"),
                StripRule::new("spec.clusterIPs").for_kind("Service"),
                StripRule::new("secrets").for_kind("ServiceAccount"),
                StripRule::new("spec.progressDeadlineSeconds")
                    .for_kind("Deployment")
                    .when_equals(Value::from(600)),
                StripRule::new("spec.revisionHistoryLimit")
                    .for_kind("Deployment")
                    .when_equals(Value::from(10)),
            ],
            retain_status_kinds: strings(&["Namespace"]),
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_changes: 256,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            system_namespaces: strings(&["kube-system", "kube-public", "kube-node-lease"]),
            system_kinds: strings(&[
                "Node",
                "ComponentStatus",
                "APIService",
                "ValidatingWebhookConfiguration",
                "MutatingWebhookConfiguration",
                "CSIDriver",
                "CSINode",
                "StorageClass",
                "PriorityClass",
                "FlowSchema",
                "PriorityLevelConfiguration",
            ]),
            system_name_prefixes: strings(&["system:", "eks:", "aws-", "kube-"]),
            system_label_keys: strings(&[
                "kubernetes.io/bootstrapping",
                "eks.amazonaws.com/component",
            ]),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            lock_timeout_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on syntax errors, unknown value types, or failed
    /// validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_op("config_load")
                .with_message(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, otherwise as [`EngineConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("config_load")
                .with_entity_id(path.display().to_string())
                .with_message(e.to_string())
        })?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| {
            Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_op("config_validate")
                .with_message(msg.to_string()))
        };
        if self.diff.max_depth == 0 {
            return invalid("diff.max_depth must be at least 1");
        }
        if self.diff.max_changes == 0 {
            return invalid("diff.max_changes must be at least 1");
        }
        for rule in &self.normalizer.strip_rules {
            if rule.path.trim().is_empty() || rule.segments().any(str::is_empty) {
                return invalid("normalizer.strip_rules entries need a non-empty dotted path");
            }
        }
        Ok(())
    }

    /// Resolved store location: `KUBETRAIL_STORE`, then `store.path`, then
    /// `~/.kubetrail/history.db`.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when no home directory can be determined.
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(STORE_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => default_store_path(),
        }
    }
}

/// `~/.kubetrail/history.db`
///
/// # Errors
///
/// `StoreUnavailable` when no home directory can be determined.
pub fn default_store_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(STORE_DIR).join(STORE_FILE))
        .ok_or_else(|| {
            ExError::new(ExErrorKind::StoreUnavailable)
                .with_op("store_path")
                .with_message("cannot determine home directory")
        })
}
