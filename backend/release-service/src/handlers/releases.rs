/// Release run tracking for the webhook server
use crate::error::Result as ReleaseResult;
use crate::models::{ReleaseReport, ReleaseRequest, SyncReport};
use actix_web::{web, HttpResponse};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};
use uuid::Uuid;

use super::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Running,
    Finished {
        report: ReleaseReport,
    },
    Failed {
        reason: &'static str,
        error: String,
        /// Operations that were live before the failure
        completed: Option<SyncReport>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub request: ReleaseRequest,
    #[serde(flatten)]
    pub state: RunState,
}

/// How long a finished run stays queryable
pub const DEFAULT_RUN_RETENTION: Duration = Duration::from_secs(6 * 60 * 60);

/// Upper bound on finished runs kept; running ones are never evicted
pub const MAX_FINISHED_RUNS: usize = 256;

#[derive(Debug, Clone)]
struct TrackedRun {
    record: RunRecord,
    updated_at: Instant,
}

impl TrackedRun {
    fn is_finished(&self) -> bool {
        !matches!(self.record.state, RunState::Running)
    }
}

/// Runs started by this process, keyed by run id
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<DashMap<Uuid, TrackedRun>>,
    retention: Duration,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            retention: DEFAULT_RUN_RETENTION,
        }
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn start(&self, request: &ReleaseRequest) {
        self.evict_finished();
        self.runs.insert(
            request.run_id,
            TrackedRun {
                record: RunRecord {
                    request: request.clone(),
                    state: RunState::Running,
                },
                updated_at: Instant::now(),
            },
        );
    }

    pub fn finish(&self, run_id: Uuid, result: ReleaseResult<ReleaseReport>) {
        let state = match result {
            Ok(report) => RunState::Finished { report },
            Err(err) => {
                error!(
                    run_id = %run_id,
                    reason = err.category().reason_code(),
                    action = err.denied_action().unwrap_or("-"),
                    error = %err,
                    "Release failed"
                );
                RunState::Failed {
                    reason: err.category().reason_code(),
                    error: err.to_string(),
                    completed: err.partial_report().cloned(),
                }
            }
        };

        match self.runs.get_mut(&run_id) {
            Some(mut run) => {
                run.record.state = state;
                run.updated_at = Instant::now();
            }
            None => warn!(run_id = %run_id, "Finished run was never registered"),
        }
    }

    pub fn get(&self, run_id: &Uuid) -> Option<RunRecord> {
        self.runs.get(run_id).map(|run| run.record.clone())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Drop finished runs past retention, then the oldest finished ones over the cap
    fn evict_finished(&self) {
        let retention = self.retention;
        self.runs
            .retain(|_, run| !(run.is_finished() && run.updated_at.elapsed() > retention));

        let mut finished: Vec<(Instant, Uuid)> = self
            .runs
            .iter()
            .filter(|run| run.is_finished())
            .map(|run| (run.updated_at, *run.key()))
            .collect();
        if finished.len() <= MAX_FINISHED_RUNS {
            return;
        }

        finished.sort();
        let excess = finished.len() - MAX_FINISHED_RUNS;
        for (_, run_id) in finished.into_iter().take(excess) {
            self.runs.remove(&run_id);
        }
    }
}

/// Get the state of a release run
pub async fn get_release(state: web::Data<AppState>, run_id: web::Path<String>) -> HttpResponse {
    let run_id = match Uuid::parse_str(&run_id) {
        Ok(id) => id,
        Err(_) => {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "error": "Invalid run ID", "reason": "invalid_run_id" }))
        }
    };

    match state.runs.get(&run_id) {
        Some(record) => HttpResponse::Ok().json(record),
        None => HttpResponse::NotFound()
            .json(serde_json::json!({ "error": "Run not found", "reason": "not_found" })),
    }
}
