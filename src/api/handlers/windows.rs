use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::{OpenWindowRequest, OpenWindowResponse};

/// Open a recording window at a URL
pub async fn open_window(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenWindowRequest>,
) -> Result<Json<OpenWindowResponse>> {
    if request.url.trim().is_empty() {
        return Err(AppError::ValidationError("url is required".to_string()));
    }
    let context = state
        .orchestrator
        .open_window(&request.url)
        .await
        .map_err(|e| AppError::BrowserError(e.to_string()))?;
    Ok(Json(OpenWindowResponse { context }))
}
