use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    AppendedResponse, EditRecordRequest, EventsResponse, GenericResponse, ReplaceEventsRequest,
};

/// Current log snapshot
pub async fn list_events(State(state): State<Arc<AppState>>) -> Json<EventsResponse> {
    Json(EventsResponse {
        events: state.orchestrator.log().get().to_vec(),
    })
}

pub async fn clear_events(State(state): State<Arc<AppState>>) -> Result<Json<GenericResponse>> {
    state.orchestrator.log().clear().await?;
    tracing::info!("Event log cleared");
    Ok(Json(GenericResponse::new("cleared")))
}

pub async fn replace_events(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReplaceEventsRequest>,
) -> Result<Json<GenericResponse>> {
    let count = request.events.len();
    state.orchestrator.log().replace(request.events).await?;
    tracing::info!("Event log replaced with {} record(s)", count);
    Ok(Json(GenericResponse::new("replaced")))
}

pub async fn edit_event(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Json(request): Json<EditRecordRequest>,
) -> Result<Json<GenericResponse>> {
    if !state.orchestrator.log().edit(&uid, &request.input_value).await? {
        return Err(AppError::RecordNotFound(uid));
    }
    Ok(Json(GenericResponse::new("updated")))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<GenericResponse>> {
    if !state.orchestrator.log().delete(&uid).await? {
        return Err(AppError::RecordNotFound(uid));
    }
    Ok(Json(GenericResponse::new("deleted")))
}

/// Append an `accept-popup` record after the last one
pub async fn add_popup(State(state): State<Arc<AppState>>) -> Result<Json<AppendedResponse>> {
    let uid = state.orchestrator.append_popup().await?;
    Ok(Json(AppendedResponse { uid }))
}
