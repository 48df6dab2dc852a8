//! Command surface
//!
//! Every command prints one JSON object on stdout and exits with the code of
//! its failure category (0 on full success).

use crate::aws;
use crate::config::ReleaseConfig;
use crate::error::{FailureCategory, ReleaseError, Result};
use crate::models::{ReleaseOutcome, SyncOptions};
use crate::server;
use crate::services::{
    CancelFlag, CredentialGrant, PushEvent, ReleasePipeline, ReleaseTrigger,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "release-service",
    version,
    about = "Publish a static site to its origin bucket and invalidate the edge cache"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the push webhook server
    Serve,
    /// Release a commit of the production branch
    Release {
        /// Commit hash the content tree was built from
        #[arg(long, env = "RELEASE_COMMIT")]
        commit: String,
        /// Branch the commit was pushed to (defaults to the production branch)
        #[arg(long)]
        branch: Option<String>,
    },
    /// Mirror a content directory into the bucket without invalidating
    Sync {
        /// Directory to publish, relative to the repository root
        #[arg(long)]
        source: PathBuf,
        /// Target bucket (defaults to RELEASE_BUCKET)
        #[arg(long)]
        bucket: Option<String>,
        /// Keep remote objects that no longer exist locally
        #[arg(long)]
        no_delete: bool,
    },
    /// Invalidate path patterns on the distribution
    Invalidate {
        /// Distribution id (defaults to RELEASE_DISTRIBUTION_ID)
        #[arg(long)]
        distribution_id: Option<String>,
        /// Path patterns such as /index.html or /*
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Check whether an invalidation has completed
    InvalidationStatus {
        invalidation_id: String,
    },
    /// List the version history of a path
    Versions {
        path: String,
    },
    /// Restore a path to a prior version and invalidate it
    Rollback {
        path: String,
        #[arg(long)]
        version_id: String,
    },
    /// Print the IAM policy for a principal and check it is minimal
    Policy {
        #[arg(long, value_enum, default_value_t = Principal::Pipeline)]
        principal: Principal,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Principal {
    Pipeline,
    Operator,
}

/// JSON result line plus the category that decides the exit code
#[derive(Debug)]
pub struct CommandOutput {
    pub body: Value,
    pub category: Option<FailureCategory>,
}

impl CommandOutput {
    fn success(body: Value) -> Self {
        Self {
            body,
            category: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category.map(|c| c.exit_code()).unwrap_or(0)
    }
}

/// JSON line describing a failed command
pub fn failure_body(err: &ReleaseError) -> Value {
    let category = err.category();
    json!({
        "status": "failed",
        "reason": category.reason_code(),
        "exit_code": category.exit_code(),
        "error": err.to_string(),
        "denied_action": err.denied_action(),
        "completed": err.partial_report(),
    })
}

fn grant_for(config: &ReleaseConfig, principal: Principal) -> CredentialGrant {
    let bucket = config.target.bucket.clone();
    let distribution_id = config.target.distribution_id.clone();
    let account_id = config.aws.account_id.clone();
    match principal {
        Principal::Pipeline => CredentialGrant::pipeline(bucket, distribution_id, account_id),
        Principal::Operator => CredentialGrant::operator(bucket, distribution_id, account_id),
    }
}

async fn build_pipeline(config: &ReleaseConfig, principal: Principal) -> ReleasePipeline {
    let sdk_config = aws::load_sdk_config(config).await;
    let (store, edge) = aws::clients(&sdk_config, config);

    ReleasePipeline::new(
        config.release_target(),
        Arc::new(store),
        Arc::new(edge),
        grant_for(config, principal),
        config.pipeline_options(),
    )
    .with_locks(config.target_locks())
}

/// Cancel flag tripped by Ctrl-C
fn interrupt_flag() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    actix_web::rt::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping at the next operation boundary");
            flag.cancel();
        }
    });
    cancel
}

pub async fn execute(command: Command, mut config: ReleaseConfig) -> Result<CommandOutput> {
    match command {
        Command::Serve => {
            let pipeline = build_pipeline(&config, Principal::Pipeline).await;
            server::serve(&config, pipeline).await?;
            Ok(CommandOutput::success(json!({ "status": "stopped" })))
        }

        Command::Release { commit, branch } => {
            let trigger = ReleaseTrigger::new(config.trigger.production_branch.clone(), None);
            let branch = branch.unwrap_or_else(|| config.trigger.production_branch.clone());
            let request = trigger
                .accept(&PushEvent::new(&branch, &commit), None)?
                .ok_or_else(|| {
                    ReleaseError::InvalidEvent(format!(
                        "branch {} is not the production branch {}",
                        branch,
                        trigger.production_branch()
                    ))
                })?;

            let pipeline = build_pipeline(&config, Principal::Pipeline).await;
            let report = pipeline.run(&request, &interrupt_flag()).await?;

            Ok(match &report.outcome {
                ReleaseOutcome::Published => {
                    CommandOutput::success(json!({ "status": "published", "report": report }))
                }
                ReleaseOutcome::PublishedNotFresh { reason } => CommandOutput {
                    body: json!({
                        "status": "published_not_fresh",
                        "reason": FailureCategory::PartialRelease.reason_code(),
                        "exit_code": FailureCategory::PartialRelease.exit_code(),
                        "error": reason,
                        "guidance": "content is live at origin; run `release-service invalidate /*` to refresh the edge cache",
                        "report": report,
                    }),
                    category: Some(FailureCategory::PartialRelease),
                },
            })
        }

        Command::Sync {
            source,
            bucket,
            no_delete,
        } => {
            if let Some(bucket) = bucket {
                config.target.bucket = bucket;
                config.validate()?;
            }
            let options = SyncOptions {
                delete_extraneous: !no_delete,
                cache_control: config.content.cache_control.clone(),
            };

            let pipeline = build_pipeline(&config, Principal::Pipeline).await;
            let report = pipeline.sync(&source, &options, &interrupt_flag()).await?;
            Ok(CommandOutput::success(
                json!({ "status": "synced", "bucket": config.target.bucket, "report": report }),
            ))
        }

        Command::Invalidate {
            distribution_id,
            paths,
        } => {
            if let Some(distribution_id) = distribution_id {
                config.target.distribution_id = distribution_id;
                config.validate()?;
            }

            let pipeline = build_pipeline(&config, Principal::Pipeline).await;
            let invalidation_id = pipeline.invalidate(paths.clone()).await?;
            Ok(CommandOutput::success(json!({
                "status": "submitted",
                "distribution_id": config.target.distribution_id,
                "invalidation_id": invalidation_id,
                "paths": paths,
            })))
        }

        Command::InvalidationStatus { invalidation_id } => {
            let pipeline = build_pipeline(&config, Principal::Operator).await;
            let status = pipeline.invalidation_status(&invalidation_id).await?;
            Ok(CommandOutput::success(json!({ "status": "ok", "invalidation": status })))
        }

        Command::Versions { path } => {
            let pipeline = build_pipeline(&config, Principal::Operator).await;
            let versions: Vec<Value> = pipeline
                .versions(&path)
                .await?
                .into_iter()
                .map(|v| {
                    json!({
                        "version_id": v.version_id,
                        "last_modified": v.last_modified,
                        "is_latest": v.is_latest,
                        "is_delete_marker": v.is_delete_marker,
                        "etag": v.etag,
                    })
                })
                .collect();
            Ok(CommandOutput::success(
                json!({ "status": "ok", "path": path, "versions": versions }),
            ))
        }

        Command::Rollback { path, version_id } => {
            let pipeline = build_pipeline(&config, Principal::Operator).await;
            let report = pipeline.rollback(&path, &version_id).await?;
            Ok(CommandOutput::success(json!({ "status": "rolled_back", "report": report })))
        }

        Command::Policy { principal } => {
            let grant = grant_for(&config, principal);
            let violations: Vec<String> = grant.validate().iter().map(|v| v.to_string()).collect();
            let edge = match config.edge.canonical_host {
                Some(_) => {
                    let policy = config.edge_policy()?;
                    json!({
                        "canonical_host": policy.canonical().as_str(),
                        "viewer_protocol_policy": policy.protocol().as_str(),
                    })
                }
                None => Value::Null,
            };
            let body = json!({
                "status": if violations.is_empty() { "ok" } else { "failed" },
                "principal": grant.principal,
                "policy": grant.policy_document(),
                "violations": violations,
                "edge": edge,
            });

            Ok(CommandOutput {
                category: (!violations.is_empty()).then_some(FailureCategory::Configuration),
                body,
            })
        }
    }
}
