/// Webhook server wiring
use crate::config::ReleaseConfig;
use crate::error::{ReleaseError, Result};
use crate::handlers::{self, AppState, RunRegistry};
use crate::services::{ReleasePipeline, ReleaseTrigger};
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::info;

/// Shared handler state for a pipeline; the trigger always verifies signatures
pub fn app_state(config: &ReleaseConfig, pipeline: ReleasePipeline) -> Result<AppState> {
    let secret = config.trigger.webhook_secret.clone().ok_or_else(|| {
        ReleaseError::Configuration(
            "RELEASE_WEBHOOK_SECRET is required to accept webhooks".to_string(),
        )
    })?;

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        trigger: Arc::new(ReleaseTrigger::new(
            config.trigger.production_branch.clone(),
            Some(secret),
        )),
        runs: RunRegistry::new(),
    })
}

pub async fn serve(config: &ReleaseConfig, pipeline: ReleasePipeline) -> Result<()> {
    let state = app_state(config, pipeline)?;
    let host = config.server.host.clone();
    let port = config.server.port;

    info!(
        %host,
        port,
        bucket = %config.target.bucket,
        production_branch = %config.trigger.production_branch,
        "release-service HTTP listening"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))
    .map_err(|e| ReleaseError::Configuration(format!("cannot bind {}:{}: {}", host, port, e)))?
    .run()
    .await
    .map_err(|e| ReleaseError::Configuration(format!("webhook server stopped: {}", e)))
}
