//! Error types for object storage operations

use thiserror::Error;

/// Object storage errors
///
/// `action` fields carry the IAM action the failing call required
/// (for example `s3:PutObject`), so a denial can be traced back to the grant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Target bucket does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Object or object version does not exist
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// Credentials lack the required action on the resource
    #[error("Access denied: {action} on {resource}")]
    AccessDenied { action: String, resource: String },

    /// Connection, timeout or throttling failure; safe to retry
    #[error("Transient storage error during {action} on {resource}: {message}")]
    Transient {
        action: String,
        resource: String,
        message: String,
    },

    /// Any other service-side failure
    #[error("Storage error during {action} on {resource}: {message}")]
    Service {
        action: String,
        resource: String,
        message: String,
    },
}

impl StorageError {
    /// Whether the failure is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }

    pub fn transient(action: &str, resource: &str, message: impl Into<String>) -> Self {
        StorageError::Transient {
            action: action.to_string(),
            resource: resource.to_string(),
            message: message.into(),
        }
    }
}

/// Service error codes that indicate throttling or a server-side hiccup
const TRANSIENT_CODES: &[&str] = &[
    "SlowDown",
    "InternalError",
    "ServiceUnavailable",
    "RequestTimeout",
    "Throttling",
    "ThrottlingException",
    "RequestTimeTooSkewed",
];

const DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

/// Classify an S3 service error code into a [`StorageError`]
pub fn classify_error_code(
    action: &str,
    resource: &str,
    code: Option<&str>,
    message: Option<&str>,
) -> StorageError {
    let message = message.unwrap_or("no error message").to_string();

    match code {
        Some(code) if DENIED_CODES.contains(&code) => StorageError::AccessDenied {
            action: action.to_string(),
            resource: resource.to_string(),
        },
        Some("NoSuchBucket") => StorageError::BucketNotFound(resource.to_string()),
        Some("NoSuchKey") | Some("NoSuchVersion") | Some("NotFound") => StorageError::NotFound {
            key: resource.to_string(),
        },
        Some(code) if TRANSIENT_CODES.contains(&code) => StorageError::Transient {
            action: action.to_string(),
            resource: resource.to_string(),
            message: format!("{}: {}", code, message),
        },
        Some(code) => StorageError::Service {
            action: action.to_string(),
            resource: resource.to_string(),
            message: format!("{}: {}", code, message),
        },
        None => StorageError::Service {
            action: action.to_string(),
            resource: resource.to_string(),
            message,
        },
    }
}
