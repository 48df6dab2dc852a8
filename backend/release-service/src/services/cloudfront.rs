/// CloudFront implementation of the edge control plane
use crate::services::invalidator::{
    EdgeInvalidator, InvalidationError, InvalidationRequest, InvalidationState, InvalidationStatus,
};
use async_trait::async_trait;
use aws_sdk_cloudfront::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client;
use std::sync::Arc;
use tracing::debug;

const CREATE_ACTION: &str = "cloudfront:CreateInvalidation";
const STATUS_ACTION: &str = "cloudfront:GetInvalidation";

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyInvalidationsInProgress",
    "ServiceUnavailable",
    "InternalError",
    "RequestTimeout",
];

const DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

#[derive(Clone)]
pub struct CloudFrontInvalidator {
    client: Arc<Client>,
}

impl CloudFrontInvalidator {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

/// Classify a CloudFront service error code
pub fn classify_error_code(
    action: &str,
    distribution_id: &str,
    code: Option<&str>,
    message: Option<&str>,
) -> InvalidationError {
    let message = message.unwrap_or("no error message");

    match code {
        Some(code) if DENIED_CODES.contains(&code) => InvalidationError::AccessDenied {
            action: action.to_string(),
            resource: distribution_id.to_string(),
        },
        Some("NoSuchDistribution") => {
            InvalidationError::DistributionNotFound(distribution_id.to_string())
        }
        Some(code) if TRANSIENT_CODES.contains(&code) => InvalidationError::Transient {
            action: action.to_string(),
            message: format!("{}: {}", code, message),
        },
        Some(code) => InvalidationError::Rejected(format!("{}: {}", code, message)),
        None => InvalidationError::Rejected(message.to_string()),
    }
}

fn classify_sdk_error<E, R>(action: &str, distribution_id: &str, err: SdkError<E, R>) -> InvalidationError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            InvalidationError::Transient {
                action: action.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            }
        }
        SdkError::ServiceError(ctx) => {
            classify_error_code(action, distribution_id, ctx.err().code(), ctx.err().message())
        }
        _ => InvalidationError::Rejected(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl EdgeInvalidator for CloudFrontInvalidator {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<String, InvalidationError> {
        let paths = Paths::builder()
            .quantity(request.paths.len() as i32)
            .set_items(Some(request.paths.clone()))
            .build()
            .map_err(|e| InvalidationError::Rejected(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(&request.caller_reference)
            .build()
            .map_err(|e| InvalidationError::Rejected(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(&request.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| classify_sdk_error(CREATE_ACTION, &request.distribution_id, e))?;

        let invalidation = output.invalidation().ok_or_else(|| {
            InvalidationError::Rejected("response carried no invalidation".to_string())
        })?;

        debug!(
            invalidation_id = %invalidation.id(),
            status = %invalidation.status(),
            "CloudFront accepted invalidation"
        );
        Ok(invalidation.id().to_string())
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, InvalidationError> {
        let output = self
            .client
            .get_invalidation()
            .distribution_id(distribution_id)
            .id(invalidation_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(STATUS_ACTION, distribution_id, e))?;

        let invalidation = output.invalidation().ok_or_else(|| {
            InvalidationError::Rejected("response carried no invalidation".to_string())
        })?;

        let state = if invalidation.status().eq_ignore_ascii_case("Completed") {
            InvalidationState::Completed
        } else {
            InvalidationState::InProgress
        };

        Ok(InvalidationStatus {
            id: invalidation.id().to_string(),
            state,
        })
    }
}
