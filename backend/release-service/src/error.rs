use crate::models::{SyncOperation, SyncReport};
use crate::services::invalidator::InvalidationError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use resilience::RetryError;
use s3_utils::StorageError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Operator-facing failure categories with stable reason codes and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Configuration,
    TransientNetwork,
    Permission,
    /// Content is at origin but the edge cache was not invalidated
    PartialRelease,
    Cancelled,
    Storage,
    RejectedTrigger,
}

impl FailureCategory {
    pub fn reason_code(&self) -> &'static str {
        match self {
            FailureCategory::Configuration => "configuration_error",
            FailureCategory::TransientNetwork => "transient_network_error",
            FailureCategory::Permission => "permission_denied",
            FailureCategory::PartialRelease => "partial_release",
            FailureCategory::Cancelled => "cancelled",
            FailureCategory::Storage => "storage_error",
            FailureCategory::RejectedTrigger => "rejected_trigger",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            FailureCategory::Configuration => 2,
            FailureCategory::Permission => 3,
            FailureCategory::TransientNetwork => 4,
            FailureCategory::Storage => 5,
            FailureCategory::Cancelled => 6,
            FailureCategory::RejectedTrigger => 7,
            FailureCategory::PartialRelease => 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Missing/invalid identifiers or a content path outside the allowed scope
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure that outlived the retry budget
    #[error("Network error during {action} on {resource} after {attempts} attempt(s): {message}")]
    TransientNetwork {
        action: String,
        resource: String,
        attempts: u32,
        message: String,
    },

    /// The principal lacks `action` on `resource`
    #[error("Permission denied: {action} on {resource}")]
    PermissionDenied { action: String, resource: String },

    #[error("Storage error: {0}")]
    Storage(String),

    /// A single object operation failed; `report` lists what already completed
    #[error("Sync aborted at {path} ({operation}): {source}")]
    SyncAborted {
        report: SyncReport,
        path: String,
        operation: SyncOperation,
        #[source]
        source: Box<ReleaseError>,
    },

    /// Run was cancelled; `report` is empty when nothing had been applied yet
    #[error("Release cancelled after {} completed operation(s)", .report.completed_operations())]
    Cancelled { report: SyncReport },

    #[error("Unauthorized trigger: {0}")]
    Unauthorized(String),

    #[error("Invalid trigger event: {0}")]
    InvalidEvent(String),
}

impl ReleaseError {
    pub fn category(&self) -> FailureCategory {
        match self {
            ReleaseError::Configuration(_) => FailureCategory::Configuration,
            ReleaseError::TransientNetwork { .. } => FailureCategory::TransientNetwork,
            ReleaseError::PermissionDenied { .. } => FailureCategory::Permission,
            ReleaseError::Storage(_) => FailureCategory::Storage,
            ReleaseError::SyncAborted { source, .. } => source.category(),
            ReleaseError::Cancelled { .. } => FailureCategory::Cancelled,
            ReleaseError::Unauthorized(_) | ReleaseError::InvalidEvent(_) => {
                FailureCategory::RejectedTrigger
            }
        }
    }

    /// Operations that completed before the failure, when any were attempted
    pub fn partial_report(&self) -> Option<&SyncReport> {
        match self {
            ReleaseError::SyncAborted { report, .. } | ReleaseError::Cancelled { report } => {
                Some(report)
            }
            _ => None,
        }
    }

    /// Denied IAM action, for correcting the credential scope
    pub fn denied_action(&self) -> Option<&str> {
        match self {
            ReleaseError::PermissionDenied { action, .. } => Some(action),
            ReleaseError::SyncAborted { source, .. } => source.denied_action(),
            _ => None,
        }
    }
}

impl From<StorageError> for ReleaseError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AccessDenied { action, resource } => {
                ReleaseError::PermissionDenied { action, resource }
            }
            StorageError::BucketNotFound(bucket) => ReleaseError::Configuration(format!(
                "bucket {} does not exist; it must be created by the provisioning stack",
                bucket
            )),
            StorageError::Transient {
                action,
                resource,
                message,
            } => ReleaseError::TransientNetwork {
                action,
                resource,
                attempts: 1,
                message,
            },
            other @ (StorageError::NotFound { .. } | StorageError::Service { .. }) => {
                ReleaseError::Storage(other.to_string())
            }
        }
    }
}

impl From<RetryError<StorageError>> for ReleaseError {
    fn from(err: RetryError<StorageError>) -> Self {
        let attempts = err.attempts();
        match ReleaseError::from(err.into_inner()) {
            ReleaseError::TransientNetwork {
                action,
                resource,
                message,
                ..
            } => ReleaseError::TransientNetwork {
                action,
                resource,
                attempts,
                message,
            },
            other => other,
        }
    }
}

impl From<InvalidationError> for ReleaseError {
    fn from(err: InvalidationError) -> Self {
        match err {
            InvalidationError::AccessDenied { action, resource } => {
                ReleaseError::PermissionDenied { action, resource }
            }
            InvalidationError::DistributionNotFound(id) => ReleaseError::Configuration(format!(
                "distribution {} does not exist; it must be created by the provisioning stack",
                id
            )),
            InvalidationError::Transient { action, message } => ReleaseError::TransientNetwork {
                action,
                resource: "cloudfront".to_string(),
                attempts: 1,
                message,
            },
            InvalidationError::Rejected(message) => ReleaseError::Storage(message),
        }
    }
}

impl From<RetryError<InvalidationError>> for ReleaseError {
    fn from(err: RetryError<InvalidationError>) -> Self {
        let attempts = err.attempts();
        match ReleaseError::from(err.into_inner()) {
            ReleaseError::TransientNetwork {
                action,
                resource,
                message,
                ..
            } => ReleaseError::TransientNetwork {
                action,
                resource,
                attempts,
                message,
            },
            other => other,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub reason: &'static str,
    pub code: u16,
}

impl ResponseError for ReleaseError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReleaseError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ReleaseError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            ReleaseError::Cancelled { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        HttpResponse::build(code).json(ErrorResponse {
            error: self.to_string(),
            reason: self.category().reason_code(),
            code: code.as_u16(),
        })
    }
}
