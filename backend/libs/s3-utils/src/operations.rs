/// S3 implementation of the object store used for publishing and rollback
use crate::config::S3Config;
use crate::error::{classify_error_code, StorageError};
use crate::store::{
    normalize_etag, sort_newest_first, ObjectStore, ObjectVersion, PutOutcome, PutRequest,
    RemoteObject,
};
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct S3Operations {
    client: Arc<Client>,
    config: S3Config,
}

impl S3Operations {
    pub fn new(client: Arc<Client>, config: S3Config) -> Self {
        Self { client, config }
    }

    fn object_resource(&self, key: &str) -> String {
        format!("{}/{}", self.config.bucket, key)
    }
}

/// Map an SDK failure to a [`StorageError`], keeping the IAM action that was attempted
pub(crate) fn classify_sdk_error<E, R>(action: &str, resource: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::transient(action, resource, DisplayErrorContext(&err).to_string())
        }
        SdkError::ServiceError(ctx) => {
            classify_error_code(action, resource, ctx.err().code(), ctx.err().message())
        }
        _ => StorageError::Service {
            action: action.to_string(),
            resource: resource.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn to_chrono(ts: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

#[async_trait]
impl ObjectStore for S3Operations {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn head_bucket(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| classify_sdk_error("s3:ListBucket", &self.config.bucket, e))
            .map_err(|e| match e {
                StorageError::NotFound { .. } => {
                    StorageError::BucketNotFound(self.config.bucket.clone())
                }
                other => other,
            })?;

        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify_sdk_error("s3:ListBucket", &self.config.bucket, e))?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| RemoteObject {
                    key: key.to_string(),
                    etag: obj.e_tag().map(normalize_etag),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_chrono(obj.last_modified()),
                })
            }));

            if response.is_truncated().unwrap_or(false) {
                continuation = response.next_continuation_token().map(str::to_string);
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!(bucket = %self.config.bucket, count = objects.len(), "Listed remote objects");
        Ok(objects)
    }

    async fn put_object(&self, request: PutRequest) -> Result<PutOutcome, StorageError> {
        let resource = self.object_resource(&request.key);

        let response = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&request.key)
            .content_type(&request.content_type)
            .set_cache_control(request.cache_control)
            .body(ByteStream::from(request.body))
            .send()
            .await
            .map_err(|e| classify_sdk_error("s3:PutObject", &resource, e))?;

        Ok(PutOutcome {
            version_id: response.version_id().map(str::to_string),
            etag: response.e_tag().map(normalize_etag),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        let resource = self.object_resource(key);

        let response = self
            .client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error("s3:DeleteObject", &resource, e))?;

        Ok(response.version_id().map(str::to_string))
    }

    async fn list_object_versions(&self, key: &str) -> Result<Vec<ObjectVersion>, StorageError> {
        let mut versions = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_object_versions()
                .bucket(&self.config.bucket)
                .prefix(key)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|e| {
                    classify_sdk_error("s3:ListBucketVersions", &self.config.bucket, e)
                })?;

            // Prefix listing also returns longer keys; keep the exact key only
            versions.extend(
                response
                    .versions()
                    .iter()
                    .filter(|v| v.key() == Some(key))
                    .filter_map(|v| {
                        v.version_id().map(|id| ObjectVersion {
                            key: key.to_string(),
                            version_id: id.to_string(),
                            last_modified: to_chrono(v.last_modified()),
                            is_latest: v.is_latest().unwrap_or(false),
                            is_delete_marker: false,
                            etag: v.e_tag().map(normalize_etag),
                        })
                    }),
            );
            versions.extend(
                response
                    .delete_markers()
                    .iter()
                    .filter(|m| m.key() == Some(key))
                    .filter_map(|m| {
                        m.version_id().map(|id| ObjectVersion {
                            key: key.to_string(),
                            version_id: id.to_string(),
                            last_modified: to_chrono(m.last_modified()),
                            is_latest: m.is_latest().unwrap_or(false),
                            is_delete_marker: true,
                            etag: None,
                        })
                    }),
            );

            if response.is_truncated().unwrap_or(false) {
                key_marker = response.next_key_marker().map(str::to_string);
                version_marker = response.next_version_id_marker().map(str::to_string);
                if key_marker.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        sort_newest_first(&mut versions);
        Ok(versions)
    }

    async fn restore_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> Result<PutOutcome, StorageError> {
        let resource = self.object_resource(key);
        let copy_source = format!(
            "{}/{}?versionId={}",
            self.config.bucket,
            urlencoding::encode(key),
            urlencoding::encode(version_id)
        );

        let response = self
            .client
            .copy_object()
            .bucket(&self.config.bucket)
            .copy_source(copy_source)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error("s3:GetObjectVersion", &resource, e))?;

        Ok(PutOutcome {
            version_id: response.version_id().map(str::to_string),
            etag: response
                .copy_object_result()
                .and_then(|r| r.e_tag())
                .map(normalize_etag),
        })
    }
}
