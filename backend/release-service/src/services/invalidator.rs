//! Edge cache invalidation after a successful sync

use crate::error::{ReleaseError, Result};
use crate::models::InvalidationOutcome;
use crate::services::remote::call_edge;
use async_trait::async_trait;
use parking_lot::Mutex;
use resilience::ServiceConfig;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Paths submitted per request before falling back to the wildcard
pub const MAX_PATHS_PER_REQUEST: usize = 1000;

pub const WILDCARD_PATH: &str = "/*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidationScope {
    /// One path per changed object
    #[default]
    PerPath,
    /// Always invalidate the whole tree
    Wildcard,
}

impl FromStr for InvalidationScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-path" | "paths" => Ok(InvalidationScope::PerPath),
            "wildcard" | "all" => Ok(InvalidationScope::Wildcard),
            other => Err(format!(
                "unknown invalidation scope '{}', expected per-path or wildcard",
                other
            )),
        }
    }
}

/// One invalidation submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub paths: Vec<String>,
    /// Resubmitting the same reference returns the original invalidation
    pub caller_reference: String,
}

impl InvalidationRequest {
    pub fn new(
        distribution_id: impl Into<String>,
        paths: Vec<String>,
        caller_reference: impl Into<String>,
    ) -> Self {
        Self {
            distribution_id: distribution_id.into(),
            paths,
            caller_reference: caller_reference.into(),
        }
    }

    /// Request covering the object keys a sync changed; `None` when nothing changed
    pub fn for_changes(
        distribution_id: &str,
        changed_keys: &BTreeSet<String>,
        scope: InvalidationScope,
        caller_reference: &str,
    ) -> Option<Self> {
        if changed_keys.is_empty() {
            return None;
        }

        let paths = match scope {
            InvalidationScope::Wildcard => vec![WILDCARD_PATH.to_string()],
            InvalidationScope::PerPath => {
                let paths = edge_paths(changed_keys);
                if paths.len() > MAX_PATHS_PER_REQUEST {
                    vec![WILDCARD_PATH.to_string()]
                } else {
                    paths.into_iter().collect()
                }
            }
        };

        Some(Self::new(distribution_id, paths, caller_reference))
    }

    pub fn is_wildcard(&self) -> bool {
        self.paths.iter().any(|p| p == WILDCARD_PATH)
    }
}

/// Viewer paths that may be serving a changed object key
///
/// An `index.html` is also reachable through its directory URL, so the
/// directory path is invalidated alongside it.
pub fn edge_paths(changed_keys: &BTreeSet<String>) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();

    for key in changed_keys {
        let key = key.trim_start_matches('/');
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        paths.insert(format!("/{}", encoded.join("/")));

        if let Some((last, dirs)) = encoded.split_last() {
            if last == "index.html" {
                if dirs.is_empty() {
                    paths.insert("/".to_string());
                } else {
                    paths.insert(format!("/{}/", dirs.join("/")));
                }
            }
        }
    }

    paths
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationState {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationStatus {
    pub id: String,
    pub state: InvalidationState,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidationError {
    #[error("Access denied: {action} on {resource}")]
    AccessDenied { action: String, resource: String },

    #[error("Distribution not found: {0}")]
    DistributionNotFound(String),

    /// Throttling, too many invalidations in flight, or a network failure
    #[error("Transient invalidation error during {action}: {message}")]
    Transient { action: String, message: String },

    #[error("Invalidation rejected: {0}")]
    Rejected(String),
}

impl InvalidationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvalidationError::Transient { .. })
    }
}

/// Edge distribution control plane
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EdgeInvalidator: Send + Sync {
    /// Submit an invalidation and return its id without waiting for completion
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> std::result::Result<String, InvalidationError>;

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> std::result::Result<InvalidationStatus, InvalidationError>;
}

/// Submits invalidations with transport-level retry
#[derive(Clone)]
pub struct CacheInvalidator {
    edge: Arc<dyn EdgeInvalidator>,
    config: ServiceConfig,
    scope: InvalidationScope,
}

impl CacheInvalidator {
    pub fn new(edge: Arc<dyn EdgeInvalidator>, config: ServiceConfig, scope: InvalidationScope) -> Self {
        Self {
            edge,
            config,
            scope,
        }
    }

    pub fn scope(&self) -> InvalidationScope {
        self.scope
    }

    pub async fn submit(&self, request: &InvalidationRequest) -> Result<String> {
        let id = call_edge(&self.config, "cloudfront:CreateInvalidation", || {
            self.edge.create_invalidation(request)
        })
        .await?;

        info!(
            distribution_id = %request.distribution_id,
            invalidation_id = %id,
            paths = request.paths.len(),
            wildcard = request.is_wildcard(),
            "Invalidation submitted"
        );
        Ok(id)
    }

    /// Invalidate the viewer paths behind `changed_keys`
    ///
    /// Never fails: a submission error is reported as [`InvalidationOutcome::Failed`]
    /// since the content is already at origin.
    pub async fn invalidate_changes(
        &self,
        distribution_id: &str,
        changed_keys: &BTreeSet<String>,
        caller_reference: &str,
    ) -> InvalidationOutcome {
        let request = match InvalidationRequest::for_changes(
            distribution_id,
            changed_keys,
            self.scope,
            caller_reference,
        ) {
            Some(request) => request,
            None => return InvalidationOutcome::NotNeeded,
        };

        match self.submit(&request).await {
            Ok(request_id) => InvalidationOutcome::Submitted {
                request_id,
                distribution_id: request.distribution_id,
                paths: request.paths,
            },
            Err(err) => {
                warn!(
                    distribution_id = %request.distribution_id,
                    error = %err,
                    "Invalidation failed; retry with the invalidate command"
                );
                InvalidationOutcome::Failed {
                    distribution_id: request.distribution_id,
                    paths: request.paths,
                    reason: err.to_string(),
                }
            }
        }
    }

    pub async fn status(&self, distribution_id: &str, invalidation_id: &str) -> Result<InvalidationStatus> {
        call_edge(&self.config, "cloudfront:GetInvalidation", || {
            self.edge.invalidation_status(distribution_id, invalidation_id)
        })
        .await
        .map_err(ReleaseError::from)
    }
}

/// In-memory edge control plane that records every submission
///
/// Honours caller references the way the real service does. Used for dry
/// runs and tests.
#[derive(Default)]
pub struct RecordingInvalidator {
    submitted: Mutex<Vec<InvalidationRequest>>,
    by_reference: Mutex<HashMap<String, String>>,
    failure: Mutex<Option<InvalidationError>>,
    next_id: AtomicU64,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every submission with `error` until [`RecordingInvalidator::recover`]
    pub fn fail_with(&self, error: InvalidationError) {
        *self.failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Distinct submissions, in order
    pub fn requests(&self) -> Vec<InvalidationRequest> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl EdgeInvalidator for RecordingInvalidator {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> std::result::Result<String, InvalidationError> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }

        let mut by_reference = self.by_reference.lock();
        if let Some(id) = by_reference.get(&request.caller_reference) {
            return Ok(id.clone());
        }

        let id = format!("I{:012}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        by_reference.insert(request.caller_reference.clone(), id.clone());
        self.submitted.lock().push(request.clone());
        Ok(id)
    }

    async fn invalidation_status(
        &self,
        _distribution_id: &str,
        invalidation_id: &str,
    ) -> std::result::Result<InvalidationStatus, InvalidationError> {
        if self
            .by_reference
            .lock()
            .values()
            .any(|id| id == invalidation_id)
        {
            Ok(InvalidationStatus {
                id: invalidation_id.to_string(),
                state: InvalidationState::Completed,
            })
        } else {
            Err(InvalidationError::Rejected(format!(
                "NoSuchInvalidation: {}",
                invalidation_id
            )))
        }
    }
}
