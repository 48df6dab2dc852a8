/// Push webhook: verifies, filters and starts releases
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::debug;

use super::AppState;
use crate::error::{ReleaseError, Result};
use crate::services::trigger::{DELIVERY_HEADER, SIGNATURE_HEADER};
use crate::services::{CancelFlag, PushEvent};

const EVENT_HEADER: &str = "X-GitHub-Event";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Accept a push event and run the release in the background
///
/// Responds `202` with the run id as soon as the release is accepted; the
/// outcome is available from `GET /releases/{run_id}`.
pub async fn push_hook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    state
        .trigger
        .verify_signature(&body, header(&req, SIGNATURE_HEADER))?;

    match header(&req, EVENT_HEADER) {
        Some("ping") => return Ok(HttpResponse::Ok().json(json!({ "status": "pong" }))),
        Some(event) if event != "push" => {
            debug!(event = %event, "Ignoring non-push event");
            return Ok(HttpResponse::Accepted().json(json!({ "status": "ignored" })));
        }
        _ => {}
    }

    let event: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| ReleaseError::InvalidEvent(format!("malformed push payload: {}", e)))?;

    let request = match state.trigger.accept(&event, header(&req, DELIVERY_HEADER))? {
        Some(request) => request,
        None => return Ok(HttpResponse::Accepted().json(json!({ "status": "ignored" }))),
    };

    state.runs.start(&request);
    let pipeline = state.pipeline.clone();
    let runs = state.runs.clone();
    let run_request = request.clone();
    actix_web::rt::spawn(async move {
        let result = pipeline.run(&run_request, &CancelFlag::new()).await;
        runs.finish(run_request.run_id, result);
    });

    Ok(HttpResponse::Accepted().json(json!({
        "status": "accepted",
        "run_id": request.run_id,
        "commit": request.commit,
    })))
}
