use serde::Deserialize;

use super::event_record::EventRecord;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecordRequest {
    pub input_value: String,
}

/// Whole-log replacement, e.g. restoring an exported recording
#[derive(Debug, Deserialize)]
pub struct ReplaceEventsRequest {
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    /// `recording` or `stopped`
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenWindowRequest {
    pub url: String,
}
