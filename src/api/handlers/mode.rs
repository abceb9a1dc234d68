use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::{Mode, ModeResponse, SetModeRequest};

pub async fn get_mode(State(state): State<Arc<AppState>>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: state.orchestrator.mode(),
    })
}

/// Switch between `recording` and `stopped`; replay is started through `/replay`
pub async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetModeRequest>,
) -> Result<Json<ModeResponse>> {
    let mode = match request.mode.parse::<Mode>() {
        Ok(Mode::Replaying) => {
            return Err(AppError::ValidationError(
                "start a replay with POST /replay".to_string(),
            ))
        }
        Ok(mode) => mode,
        Err(()) => {
            return Err(AppError::ValidationError(format!(
                "unknown mode '{}'",
                request.mode
            )))
        }
    };
    state.orchestrator.set_mode(mode).await?;
    Ok(Json(ModeResponse { mode }))
}
