//! Release Service
//!
//! Publishes a static site: mirrors the content tree into the origin bucket,
//! invalidates the edge cache for what changed, and restores prior object
//! versions on request. Runs from a push webhook or the command line.

pub mod aws;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod server;
pub mod services;

pub use config::ReleaseConfig;
pub use error::{FailureCategory, ReleaseError, Result};
