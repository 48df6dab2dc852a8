/// Shared S3 utilities for the site release pipeline
///
/// Provides the object store abstraction the pipeline publishes through,
/// its AWS S3 implementation, and a versioned in-memory store.

use aws_sdk_s3::Client;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod memory;
pub mod operations;
pub mod store;

pub use config::{is_valid_bucket_name, S3Config};
pub use error::{classify_error_code, StorageError};
pub use memory::InMemoryObjectStore;
pub use operations::S3Operations;
pub use store::{
    content_etag, normalize_etag, sort_newest_first, ObjectStore, ObjectVersion, PutOutcome,
    PutRequest, RemoteObject,
};

/// Shared S3 client wrapper
#[derive(Clone)]
pub struct S3Client {
    client: Arc<Client>,
    config: S3Config,
}

impl S3Client {
    /// Create new S3 client from an already-resolved AWS SDK configuration
    ///
    /// Credentials and region come from `sdk_config`; the caller decides where
    /// they were sourced from.
    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig, config: S3Config) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(config.path_style);

        Self {
            client: Arc::new(Client::from_conf(builder.build())),
            config,
        }
    }

    /// Object store bound to the configured bucket
    pub fn operations(&self) -> S3Operations {
        S3Operations::new(self.client.clone(), self.config.clone())
    }
}
