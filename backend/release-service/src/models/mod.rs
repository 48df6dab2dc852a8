//! Data carried through a single release run

pub mod content;
pub mod plan;
pub mod release;

pub use content::ContentObject;
pub use plan::{SyncOptions, SyncPlan};
pub use release::{
    FailedOperation, InvalidationOutcome, ReleaseOutcome, ReleaseReport, ReleaseRequest,
    RollbackReport, SyncOperation, SyncReport, UploadedObject,
};
