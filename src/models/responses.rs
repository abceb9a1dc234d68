use serde::Serialize;

use super::event_record::{ContextId, EventRecord};
use super::mode::Mode;
use super::TemplateDataMap;
use crate::replay::{EngineState, ReplayReport};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub mode: Mode,
    /// Attached document agents
    pub documents: usize,
    /// Connected WebSocket clients
    pub clients: usize,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
pub struct AppendedResponse {
    pub uid: String,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: Mode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenWindowResponse {
    #[serde(flatten)]
    pub context: ContextId,
}

#[derive(Debug, Serialize)]
pub struct ReplayStatusResponse {
    pub state: EngineState,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReplayReport>,
}

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub templates: TemplateDataMap,
}

#[derive(Debug, Serialize)]
pub struct GenericResponse {
    pub status: String,
}

impl GenericResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into() }
    }
}
