//! AWS SDK wiring for the S3 origin and the CloudFront distribution

use crate::config::ReleaseConfig;
use crate::services::CloudFrontInvalidator;
use aws_config::SdkConfig;
use aws_sdk_s3::config::{Credentials, Region};
use s3_utils::{S3Client, S3Operations};
use secrecy::ExposeSecret;

/// Resolve region and credentials
///
/// Static keys from the configuration win; otherwise the default provider
/// chain (environment, profile, instance role) is used.
pub async fn load_sdk_config(config: &ReleaseConfig) -> SdkConfig {
    let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.aws.region.clone()));

    if let (Some(access_key_id), Some(secret_access_key)) =
        (&config.aws.access_key_id, &config.aws.secret_access_key)
    {
        let credentials = Credentials::new(
            access_key_id.expose_secret(),
            secret_access_key.expose_secret(),
            None,
            None,
            "release_service",
        );
        builder = builder.credentials_provider(credentials);
    }

    builder.load().await
}

/// Production store and edge clients for the configured target
pub fn clients(sdk_config: &SdkConfig, config: &ReleaseConfig) -> (S3Operations, CloudFrontInvalidator) {
    let s3 = S3Client::from_sdk_config(sdk_config, config.s3_config());
    (s3.operations(), CloudFrontInvalidator::from_sdk_config(sdk_config))
}
