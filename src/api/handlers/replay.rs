use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::state::AppState;
use crate::coordinator::{OrchestratorRequest, OrchestratorResponse, Routed};
use crate::error::{AppError, Result};
use crate::models::{GenericResponse, ReplayStatusResponse};

/// Start a replay pass over the whole log
pub async fn start_replay(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<GenericResponse>)> {
    let orchestrator = &state.orchestrator;
    let request = Routed {
        from: None,
        request: OrchestratorRequest::ReplayEvents,
    };
    let limit = orchestrator.engine().config().rpc_timeout;

    match orchestrator.client().call_timeout(request, limit).await? {
        OrchestratorResponse::ReplayStarted => {
            tracing::info!("Replay started from the API");
            Ok((StatusCode::ACCEPTED, Json(GenericResponse::new("started"))))
        }
        OrchestratorResponse::Rejected { reason } => Err(AppError::Conflict(reason)),
        other => Err(AppError::ReplayError(format!("unexpected answer {:?}", other))),
    }
}

pub async fn get_replay_status(State(state): State<Arc<AppState>>) -> Json<ReplayStatusResponse> {
    let engine = state.orchestrator.engine();
    Json(ReplayStatusResponse {
        state: engine.state().await,
        mode: state.orchestrator.mode(),
        report: engine.last_report().await,
    })
}
