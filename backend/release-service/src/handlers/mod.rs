/// HTTP handlers for the release webhook server
///
/// - `POST /hooks/push`: signed push events start a release
/// - `GET /releases/{run_id}`: state of a release started by this process
/// - `GET /health`
pub mod health;
pub mod releases;
pub mod webhook;

pub use health::health;
pub use releases::{get_release, RunRegistry, RunState};
pub use webhook::push_hook;

use crate::services::{ReleasePipeline, ReleaseTrigger};
use actix_web::web;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReleasePipeline>,
    pub trigger: Arc<ReleaseTrigger>,
    pub runs: RunRegistry,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/hooks/push", web::post().to(push_hook))
        .route("/releases/{run_id}", web::get().to(get_release));
}
