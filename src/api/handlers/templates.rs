use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{TemplateDataMap, TemplatesResponse};

pub async fn get_templates(State(state): State<Arc<AppState>>) -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: state.orchestrator.templates().await,
    })
}

/// Replace the whole template map
pub async fn set_templates(
    State(state): State<Arc<AppState>>,
    Json(templates): Json<TemplateDataMap>,
) -> Result<Json<TemplatesResponse>> {
    state.orchestrator.set_templates(templates.clone()).await?;
    tracing::info!("Template data replaced ({} key(s))", templates.len());
    Ok(Json(TemplatesResponse { templates }))
}
