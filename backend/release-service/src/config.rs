/// Configuration for release-service
///
/// Every run receives an explicit [`ReleaseConfig`]; nothing is read from the
/// environment after startup.
use crate::error::{ReleaseError, Result};
use crate::services::pipeline::{PipelineOptions, ReleaseTarget};
use crate::services::{InvalidationScope, TargetLocks};
use edge_policy::{CanonicalHost, DistributionAliases, EdgePolicy, ViewerProtocolPolicy};
use s3_utils::{is_valid_bucket_name, S3Config};
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub aws: AwsConfig,
    pub target: TargetConfig,
    pub content: ContentConfig,
    pub trigger: TriggerConfig,
    pub edge: EdgeConfig,
    pub invalidation: InvalidationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    /// Static credentials; when absent the default provider chain is used
    pub access_key_id: Option<SecretString>,
    pub secret_access_key: Option<SecretString>,
    /// Needed to scope the distribution ARN in rendered policies
    pub account_id: Option<String>,
    /// S3-compatible endpoint override
    pub s3_endpoint: Option<String>,
}

/// Identifiers of resources created by the provisioning stack
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub bucket: String,
    pub distribution_id: String,
    /// Directory of per-bucket lock files shared by every release process on the host
    pub lock_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ContentConfig {
    pub repo_root: PathBuf,
    pub content_dir: PathBuf,
    pub cache_control: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub production_branch: String,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub canonical_host: Option<String>,
    pub aliases: Vec<String>,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
}

#[derive(Debug, Clone)]
pub struct InvalidationConfig {
    pub scope: InvalidationScope,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ReleaseConfig {
    /// Load from the process environment, reading `.env` first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| ReleaseError::Configuration(format!("{} is not set", key)))
        };

        let config = ReleaseConfig {
            aws: AwsConfig {
                region: require("AWS_REGION")?,
                access_key_id: get("AWS_ACCESS_KEY_ID").map(SecretString::from),
                secret_access_key: get("AWS_SECRET_ACCESS_KEY").map(SecretString::from),
                account_id: get("RELEASE_ACCOUNT_ID"),
                s3_endpoint: get("RELEASE_S3_ENDPOINT"),
            },
            target: TargetConfig {
                bucket: require("RELEASE_BUCKET")?,
                distribution_id: require("RELEASE_DISTRIBUTION_ID")?,
                lock_dir: get("RELEASE_LOCK_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| std::env::temp_dir().join("release-service")),
            },
            content: ContentConfig {
                repo_root: PathBuf::from(get("RELEASE_REPO_ROOT").unwrap_or_else(|| ".".to_string())),
                content_dir: PathBuf::from(
                    get("RELEASE_CONTENT_DIR").unwrap_or_else(|| "public".to_string()),
                ),
                cache_control: get("RELEASE_CACHE_CONTROL"),
            },
            trigger: TriggerConfig {
                production_branch: get("RELEASE_PRODUCTION_BRANCH")
                    .unwrap_or_else(|| "main".to_string()),
                webhook_secret: get("RELEASE_WEBHOOK_SECRET").map(SecretString::from),
            },
            edge: EdgeConfig {
                canonical_host: get("RELEASE_CANONICAL_HOST"),
                aliases: get("RELEASE_DISTRIBUTION_ALIASES")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                viewer_protocol_policy: match get("RELEASE_VIEWER_PROTOCOL_POLICY") {
                    Some(raw) => raw.parse().map_err(|e| {
                        ReleaseError::Configuration(format!("RELEASE_VIEWER_PROTOCOL_POLICY: {}", e))
                    })?,
                    None => ViewerProtocolPolicy::default(),
                },
            },
            invalidation: InvalidationConfig {
                scope: match get("RELEASE_INVALIDATION_SCOPE") {
                    Some(raw) => raw.parse().map_err(|e| {
                        ReleaseError::Configuration(format!("RELEASE_INVALIDATION_SCOPE: {}", e))
                    })?,
                    None => InvalidationScope::default(),
                },
            },
            server: ServerConfig {
                host: get("RELEASE_HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: match get("RELEASE_HTTP_PORT") {
                    Some(raw) => raw.parse().map_err(|_| {
                        ReleaseError::Configuration(format!(
                            "RELEASE_HTTP_PORT '{}' is not a port number",
                            raw
                        ))
                    })?,
                    None => 8080,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check identifier shapes; the resources themselves are never created here
    pub fn validate(&self) -> Result<()> {
        if !is_valid_bucket_name(&self.target.bucket) {
            return Err(ReleaseError::Configuration(format!(
                "RELEASE_BUCKET '{}' is not a valid bucket name",
                self.target.bucket
            )));
        }

        let id = &self.target.distribution_id;
        if id.len() < 10
            || id.len() > 32
            || !id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(ReleaseError::Configuration(format!(
                "RELEASE_DISTRIBUTION_ID '{}' is not a distribution id",
                id
            )));
        }

        if let Some(account) = &self.aws.account_id {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(ReleaseError::Configuration(format!(
                    "RELEASE_ACCOUNT_ID '{}' is not a 12-digit account id",
                    account
                )));
            }
        }

        if self.aws.access_key_id.is_some() != self.aws.secret_access_key.is_some() {
            return Err(ReleaseError::Configuration(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }

        if self.edge.canonical_host.is_some() {
            self.edge_policy()?;
        }

        Ok(())
    }

    pub fn release_target(&self) -> ReleaseTarget {
        ReleaseTarget {
            bucket: self.target.bucket.clone(),
            distribution_id: self.target.distribution_id.clone(),
            repo_root: self.content.repo_root.clone(),
            content_dir: self.content.content_dir.clone(),
        }
    }

    /// Locks held for the whole of a release, rollback or sync
    pub fn target_locks(&self) -> TargetLocks {
        TargetLocks::new().with_lock_dir(&self.target.lock_dir)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            scope: self.invalidation.scope,
            cache_control: self.content.cache_control.clone(),
            ..PipelineOptions::default()
        }
    }

    pub fn s3_config(&self) -> S3Config {
        S3Config {
            endpoint: self.aws.s3_endpoint.clone(),
            path_style: self.aws.s3_endpoint.is_some(),
            ..S3Config::new(&self.target.bucket, &self.aws.region)
        }
    }

    /// Edge policy for the canonical host, checked against the alias set
    pub fn edge_policy(&self) -> Result<EdgePolicy> {
        let host = self.edge.canonical_host.as_deref().ok_or_else(|| {
            ReleaseError::Configuration("RELEASE_CANONICAL_HOST is not set".to_string())
        })?;
        let canonical = CanonicalHost::new(host)
            .map_err(|e| ReleaseError::Configuration(format!("RELEASE_CANONICAL_HOST: {}", e)))?;

        if !self.edge.aliases.is_empty() {
            DistributionAliases::new(self.edge.aliases.iter())
                .and_then(|aliases| aliases.validate(&canonical))
                .map_err(|e| {
                    ReleaseError::Configuration(format!("RELEASE_DISTRIBUTION_ALIASES: {}", e))
                })?;
        }

        Ok(EdgePolicy::new(canonical, self.edge.viewer_protocol_policy))
    }
}
