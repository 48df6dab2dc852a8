//! Release pipeline services
//!
//! Control flow for one release:
//! trigger -> per-target lock -> synchronizer (through the credential scope) -> cache invalidator.
//! The version ledger is only consulted by rollback.

pub mod cloudfront;
pub mod content;
pub mod credentials;
pub mod invalidator;
pub mod ledger;
pub mod locks;
pub mod pipeline;
mod remote;
pub mod synchronizer;
pub mod trigger;

pub use cloudfront::CloudFrontInvalidator;
pub use content::ContentRoot;
pub use credentials::{
    Action, CredentialGrant, GrantKind, GrantViolation, ScopedInvalidator, ScopedStore,
};
pub use invalidator::{
    CacheInvalidator, EdgeInvalidator, InvalidationError, InvalidationRequest, InvalidationScope,
    InvalidationState, InvalidationStatus, RecordingInvalidator,
};
pub use ledger::VersionLedger;
pub use locks::TargetLocks;
pub use pipeline::{PipelineOptions, ReleasePipeline, ReleaseTarget};
pub use synchronizer::{CancelFlag, ContentSynchronizer};
pub use trigger::{PushEvent, ReleaseTrigger};
