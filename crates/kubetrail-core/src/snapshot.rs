//! Snapshot builder: groups the normalized resources of one scan invocation.
//!
//! Malformed documents and repeated identities do not abort the scan. Each is
//! logged, recorded as a [`NormalizationIssue`] and left out of the draft, so
//! the caller can report exactly what was skipped.

use crate::cancel::CancelFlag;
use crate::errors::{NormalizeError, Result};
use crate::model::{CanonicalResource, ResourceIdentity, Scan, ScanId, ScanMetadata, ScanScope};
use crate::normalize::Normalizer;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// One skipped input document
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationIssue {
    /// Position of the document in the input sequence
    pub index: usize,
    pub error: NormalizeError,
}

/// A scan that has been built but not yet persisted (no id yet).
#[derive(Debug, Clone)]
pub struct ScanDraft {
    pub timestamp: DateTime<Utc>,
    pub scope: ScanScope,
    pub metadata: ScanMetadata,
    /// Sorted by identity
    pub resources: Vec<CanonicalResource>,
    pub issues: Vec<NormalizationIssue>,
}

impl ScanDraft {
    pub fn skipped_count(&self) -> usize {
        self.issues.len()
    }

    /// Attach the store-assigned id.
    pub fn into_scan(self, id: ScanId) -> Scan {
        Scan {
            id,
            timestamp: self.timestamp,
            scope: self.scope,
            metadata: self.metadata,
            resources: self.resources,
        }
    }
}

pub struct SnapshotBuilder<'a> {
    normalizer: &'a Normalizer,
    timestamp: DateTime<Utc>,
    scope: ScanScope,
    metadata: ScanMetadata,
    resources: BTreeMap<ResourceIdentity, CanonicalResource>,
    issues: Vec<NormalizationIssue>,
    next_index: usize,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(normalizer: &'a Normalizer, scope: ScanScope, timestamp: DateTime<Utc>) -> Self {
        Self {
            normalizer,
            timestamp,
            scope: scope.normalized(),
            metadata: ScanMetadata::default(),
            resources: BTreeMap::new(),
            issues: Vec::new(),
            next_index: 0,
        }
    }

    pub fn with_metadata(mut self, metadata: ScanMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Normalize and add one raw document. The first occurrence of an
    /// identity wins.
    pub fn push(&mut self, raw: &Value) {
        let index = self.next_index;
        self.next_index += 1;

        let resource = match self.normalizer.normalize(raw) {
            Ok(resource) => resource,
            Err(error) => return self.skip(index, error),
        };
        let identity = resource.identity().clone();
        if self.resources.contains_key(&identity) {
            return self.skip(
                index,
                NormalizeError::DuplicateIdentity {
                    identity: identity.to_string(),
                },
            );
        }
        self.resources.insert(identity, resource);
    }

    fn skip(&mut self, index: usize, error: NormalizeError) {
        tracing::warn!(
            component = module_path!(),
            index,
            reason = %error,
            "skipping malformed resource"
        );
        self.issues.push(NormalizationIssue { index, error });
    }

    pub fn finish(self) -> ScanDraft {
        ScanDraft {
            timestamp: self.timestamp,
            scope: self.scope,
            metadata: self.metadata,
            resources: self.resources.into_values().collect(),
            issues: self.issues,
        }
    }
}

/// Build a draft from a sequence of raw documents, polling `cancel` between
/// documents.
///
/// # Errors
///
/// `Cancelled` when the flag is raised before every document was processed.
pub fn build_snapshot<'v, I>(
    normalizer: &Normalizer,
    scope: ScanScope,
    metadata: ScanMetadata,
    timestamp: DateTime<Utc>,
    documents: I,
    cancel: &CancelFlag,
) -> Result<ScanDraft>
where
    I: IntoIterator<Item = &'v Value>,
{
    let mut builder = SnapshotBuilder::new(normalizer, scope, timestamp).with_metadata(metadata);
    for raw in documents {
        cancel.check("build_snapshot")?;
        builder.push(raw);
    }
    Ok(builder.finish())
}
