use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// A release accepted from the trigger, before it runs
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRequest {
    pub run_id: Uuid,
    pub commit: String,
    pub branch: String,
    pub delivery_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ReleaseRequest {
    pub fn new(commit: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            commit: commit.into(),
            branch: branch.into(),
            delivery_id: None,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Upload,
    Delete,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOperation::Upload => write!(f, "upload"),
            SyncOperation::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub path: String,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedOperation {
    pub path: String,
    pub operation: SyncOperation,
    pub error: String,
}

/// What a synchronizer run actually did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uploaded: Vec<UploadedObject>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
    pub failed: Option<FailedOperation>,
}

impl SyncReport {
    pub fn new(unchanged: usize) -> Self {
        Self {
            unchanged,
            ..Default::default()
        }
    }

    pub fn completed_operations(&self) -> usize {
        self.uploaded.len() + self.deleted.len()
    }

    /// Keys whose remote state changed during the run
    pub fn changed_paths(&self) -> BTreeSet<String> {
        self.uploaded
            .iter()
            .map(|u| u.path.clone())
            .chain(self.deleted.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InvalidationOutcome {
    /// Nothing changed at origin, so nothing to invalidate
    NotNeeded,
    Submitted {
        request_id: String,
        distribution_id: String,
        paths: Vec<String>,
    },
    Failed {
        distribution_id: String,
        paths: Vec<String>,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Published,
    /// Stored at origin; edge caches may still serve the previous content
    PublishedNotFresh { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    pub run_id: Uuid,
    pub commit: String,
    pub branch: String,
    pub bucket: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sync: SyncReport,
    pub invalidation: InvalidationOutcome,
    pub outcome: ReleaseOutcome,
}

impl ReleaseReport {
    pub fn is_fresh(&self) -> bool {
        matches!(self.outcome, ReleaseOutcome::Published)
    }

    /// Invalidation id to check freshness with, when one was submitted
    pub fn invalidation_id(&self) -> Option<&str> {
        match &self.invalidation {
            InvalidationOutcome::Submitted { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub path: String,
    pub restored_version_id: String,
    pub new_version_id: Option<String>,
    pub invalidation: InvalidationOutcome,
}
