use serde::{Deserialize, Serialize};

use super::rpc::{Envelope, RpcClient};
use crate::models::{ContextId, EventRecord};

/// Orchestrator → document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "camelCase")]
pub enum DocumentCommand {
    ActivateEventTracking,
    DeactivateEventTracking,
    ReplayEvent(EventRecord),
}

/// Outcome of replaying one record in a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEventResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Text read by an `extract` record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<String>,
}

impl ReplayEventResult {
    pub fn succeeded(extracted: Option<String>) -> Self {
        Self {
            success: true,
            error: None,
            extracted,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            extracted: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentResponse {
    Ack,
    Replayed(ReplayEventResult),
}

/// Document → orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrchestratorRequest {
    GetContextId,
    ReplayEvents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrchestratorResponse {
    ContextId(ContextId),
    ReplayStarted,
    Rejected { reason: String },
}

/// A request as the orchestrator receives it: the sending context is
/// filled in by the channel, `None` for the operator surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub from: Option<ContextId>,
    pub request: OrchestratorRequest,
}

pub type DocumentClient = RpcClient<DocumentCommand, DocumentResponse>;
pub type OrchestratorClient = RpcClient<Routed, OrchestratorResponse>;
pub type OrchestratorEnvelope = Envelope<Routed, OrchestratorResponse>;

/// A document's connection to the orchestrator. Requests sent through it
/// are stamped with the document's context.
#[derive(Debug, Clone)]
pub struct OrchestratorLink {
    context: ContextId,
    client: OrchestratorClient,
}

impl OrchestratorLink {
    pub fn new(context: ContextId, client: OrchestratorClient) -> Self {
        Self { context, client }
    }

    pub async fn call(
        &self,
        request: OrchestratorRequest,
        limit: std::time::Duration,
    ) -> Result<OrchestratorResponse, super::rpc::RpcError> {
        self.client
            .call_timeout(
                Routed {
                    from: Some(self.context),
                    request,
                },
                limit,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, RecordDraft};

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(DocumentCommand::ActivateEventTracking).unwrap();
        assert_eq!(json["type"], "activateEventTracking");

        let record = RecordDraft::element(EventKind::Click, "id=go", "https://example.com")
            .into_record("u1".to_string());
        let json = serde_json::to_value(DocumentCommand::ReplayEvent(record)).unwrap();
        assert_eq!(json["type"], "replayEvent");
        assert_eq!(json["event"]["targetId"], "id=go");

        let json = serde_json::to_value(DocumentResponse::Replayed(ReplayEventResult::failed("gone"))).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "gone");

        assert_eq!(
            serde_json::to_value(OrchestratorRequest::GetContextId).unwrap(),
            "getContextId"
        );
    }
}
