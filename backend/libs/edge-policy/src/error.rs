//! Error types for edge policy configuration

use thiserror::Error;

/// Raised when the static edge configuration is unusable
///
/// Request evaluation itself never fails; only building the policy can.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostPolicyError {
    #[error("Invalid canonical host: {0}")]
    InvalidCanonicalHost(String),

    #[error("Invalid alias: {0}")]
    InvalidAlias(String),

    #[error("Canonical host {canonical} is not an alias of the distribution")]
    CanonicalNotAliased { canonical: String },

    #[error("Unknown viewer protocol policy: {0}")]
    UnknownProtocolPolicy(String),
}
