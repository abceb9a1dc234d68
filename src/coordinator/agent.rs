//! Per-document task: owns the capture machine for one browsing context and
//! executes replayed records in it. Commands and captured events are handled
//! one at a time, so capture and replay never interleave in a context.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::{
    DocumentClient, DocumentCommand, DocumentResponse, OrchestratorLink, OrchestratorRequest,
    OrchestratorResponse, ReplayEventResult,
};
use super::rpc::{Envelope, Inbox};
use crate::browser::{DocumentAttach, PageDriver};
use crate::event_log::EventLog;
use crate::keypad::KeypadConfig;
use crate::models::{ContextId, RecordDraft};
use crate::recording::{CaptureAction, CaptureConfig, CaptureMachine, CapturedEvent};
use crate::replay::actions;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub capture: CaptureConfig,
    pub keypad: KeypadConfig,
    /// Bound on orchestrator round trips
    pub rpc_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            keypad: KeypadConfig::default(),
            rpc_timeout: Duration::from_secs(60),
        }
    }
}

pub struct DocumentAgent {
    context: ContextId,
    url: String,
    page: Arc<dyn PageDriver>,
    capture: CaptureMachine,
    log: EventLog,
    link: OrchestratorLink,
    keypad: KeypadConfig,
    rpc_timeout: Duration,
    /// Uid and target of the record this agent appended last, target of
    /// amendments
    last_appended: Option<(String, String)>,
}

impl DocumentAgent {
    /// Start the agent for a freshly attached document. The agent starts
    /// inactive and runs until both its command inbox and the capture feed
    /// are closed.
    pub fn spawn(
        attach: DocumentAttach,
        log: EventLog,
        link: OrchestratorLink,
        config: AgentConfig,
    ) -> (DocumentClient, JoinHandle<()>) {
        let (client, inbox) = DocumentClient::channel(64);
        let agent = Self {
            context: attach.context,
            url: attach.url,
            page: attach.page,
            capture: CaptureMachine::new(config.capture),
            log,
            link,
            keypad: config.keypad,
            rpc_timeout: config.rpc_timeout,
            last_appended: None,
        };
        let handle = tokio::spawn(agent.run(inbox, attach.events));
        (client, handle)
    }

    async fn run(
        mut self,
        mut inbox: Inbox<DocumentCommand, DocumentResponse>,
        mut events: mpsc::Receiver<CapturedEvent>,
    ) {
        tracing::debug!("Document agent started for tab {} ({})", self.context.tab_id, self.url);
        loop {
            // captured events queued before a command are handled before it
            tokio::select! {
                biased;
                Some(captured) = events.recv() => self.on_captured(captured).await,
                Some(envelope) = inbox.recv() => self.on_command(envelope).await,
                else => break,
            }
        }
        tracing::debug!("Document agent for tab {} stopped", self.context.tab_id);
    }

    async fn on_command(&mut self, envelope: Envelope<DocumentCommand, DocumentResponse>) {
        let (command, responder) = envelope.into_parts();
        let response = match command {
            DocumentCommand::ActivateEventTracking => {
                self.set_tracking(true).await;
                DocumentResponse::Ack
            }
            DocumentCommand::DeactivateEventTracking => {
                self.set_tracking(false).await;
                DocumentResponse::Ack
            }
            DocumentCommand::ReplayEvent(record) => {
                let result = match actions::execute(self.page.as_ref(), &record, &self.keypad).await {
                    Ok(extracted) => ReplayEventResult::succeeded(extracted),
                    Err(e) => ReplayEventResult::failed(e.to_string()),
                };
                DocumentResponse::Replayed(result)
            }
        };
        responder.respond(response);
    }

    async fn set_tracking(&mut self, enabled: bool) {
        if enabled {
            self.capture.activate();
        } else {
            self.capture.deactivate();
        }
        if let Err(e) = self.page.set_tracking(enabled).await {
            tracing::warn!("Could not switch tracking in tab {}: {}", self.context.tab_id, e);
        }
    }

    async fn on_captured(&mut self, captured: CapturedEvent) {
        if !captured.document.url.is_empty() {
            self.url = captured.document.url.clone();
        }
        for action in self.capture.handle(&captured.document, captured.event) {
            match action {
                CaptureAction::Append(draft) => self.append(draft).await,
                CaptureAction::Amend(draft) => self.amend(draft).await,
            }
        }
    }

    async fn append(&mut self, draft: RecordDraft) {
        if self.try_append(draft).await.is_none() {
            self.last_appended = None;
            self.capture.forget_last();
        }
    }

    async fn try_append(&mut self, draft: RecordDraft) -> Option<String> {
        let context = match self.link.call(OrchestratorRequest::GetContextId, self.rpc_timeout).await {
            Ok(OrchestratorResponse::ContextId(context)) => context,
            Ok(other) => {
                tracing::warn!("Dropping {} record, orchestrator answered {:?}", draft.kind, other);
                return None;
            }
            Err(e) => {
                tracing::warn!("Dropping {} record, no context id: {}", draft.kind, e);
                return None;
            }
        };

        let (kind, target_id) = (draft.kind, draft.target_id.clone());
        match self.log.append(draft.with_context(context)).await {
            Ok(uid) => {
                tracing::debug!("Captured {} in tab {} as {}", kind, context.tab_id, uid);
                self.last_appended = Some((uid.clone(), target_id));
                Some(uid)
            }
            Err(e) => {
                tracing::warn!("Could not append {} record: {}", kind, e);
                None
            }
        }
    }

    /// Set the final value on the last record when it belongs to the same
    /// field, append the draft otherwise
    async fn amend(&mut self, draft: RecordDraft) {
        let uid = match &self.last_appended {
            Some((uid, target_id)) if *target_id == draft.target_id => uid.clone(),
            _ => {
                tracing::debug!("No record to amend for '{}', appending", draft.target_id);
                return self.append(draft).await;
            }
        };
        let value = draft.input_value.clone().unwrap_or_default();
        match self.log.edit(&uid, &value).await {
            Ok(true) => tracing::debug!("Amended record {}", uid),
            // deleted by the operator in the meantime
            Ok(false) => self.append(draft).await,
            Err(e) => tracing::warn!("Could not amend record {}: {}", uid, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::dom::Document;
    use crate::browser::{MemoryPage, PageAction};
    use crate::coordinator::protocol::OrchestratorClient;
    use crate::event_log::MemoryLogStore;
    use crate::models::{EventKind, ReplayStatus};
    use crate::recording::RawEvent;

    /// Orchestrator stand-in that answers context requests from the
    /// routing stamp
    fn orchestrator() -> OrchestratorClient {
        let (client, mut inbox) = OrchestratorClient::channel(16);
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let response = match envelope.request.from {
                    Some(context) => OrchestratorResponse::ContextId(context),
                    None => OrchestratorResponse::Rejected {
                        reason: "unrouted".to_string(),
                    },
                };
                envelope.respond(response);
            }
        });
        client
    }

    /// Orchestrator stand-in that rejects the `n`th context request
    fn orchestrator_failing_at(n: usize) -> OrchestratorClient {
        let (client, mut inbox) = OrchestratorClient::channel(16);
        tokio::spawn(async move {
            let mut seen = 0;
            while let Some(envelope) = inbox.recv().await {
                seen += 1;
                let response = match envelope.request.from {
                    Some(context) if seen != n => OrchestratorResponse::ContextId(context),
                    _ => OrchestratorResponse::Rejected {
                        reason: "unavailable".to_string(),
                    },
                };
                envelope.respond(response);
            }
        });
        client
    }

    fn start(doc: Document) -> (DocumentClient, Arc<MemoryPage>, mpsc::Sender<CapturedEvent>, EventLog) {
        start_with(doc, orchestrator())
    }

    fn start_with(
        doc: Document,
        orchestrator: OrchestratorClient,
    ) -> (DocumentClient, Arc<MemoryPage>, mpsc::Sender<CapturedEvent>, EventLog) {
        let context = ContextId::new(3, 1);
        let page = Arc::new(MemoryPage::new(doc));
        let (tx, rx) = mpsc::channel(16);
        let log = EventLog::spawn(Arc::new(MemoryLogStore::new()));
        let (client, _) = DocumentAgent::spawn(
            DocumentAttach {
                context,
                url: "https://example.com".to_string(),
                page: page.clone(),
                events: rx,
            },
            log.clone(),
            OrchestratorLink::new(context, orchestrator),
            AgentConfig::default(),
        );
        (client, page, tx, log)
    }

    fn button_page() -> Document {
        let mut doc = Document::new("https://example.com");
        let body = doc.append_element(doc.root(), "body", &[]);
        let go = doc.append_element(body, "button", &[("id", "go")]);
        doc.set_cursor(go, "pointer");
        doc
    }

    #[tokio::test]
    async fn test_captures_only_while_active() {
        let doc = button_page();
        let go = doc.find_by_attr("id", "go").unwrap();
        let (client, page, tx, log) = start(doc.clone());
        let click = || CapturedEvent {
            document: doc.clone(),
            event: RawEvent::Click { target: go },
        };

        // inactive: ignored
        tx.send(click()).await.unwrap();
        assert_eq!(client.call(DocumentCommand::ActivateEventTracking).await, Ok(DocumentResponse::Ack));
        assert!(page.is_tracking());
        tx.send(click()).await.unwrap();
        // a command round trip orders after the click
        client.call(DocumentCommand::DeactivateEventTracking).await.unwrap();
        assert!(!page.is_tracking());

        let records = log.get();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EventKind::Click);
        assert_eq!(records[0].target_id, "id=go");
        assert_eq!(records[0].context(), ContextId::new(3, 1));
        assert_eq!(records[0].replayed, ReplayStatus::Pending);
    }

    #[tokio::test]
    async fn test_replays_records_sent_to_it() {
        let doc = button_page();
        let go = doc.find_by_attr("id", "go").unwrap();
        let (client, page, _tx, _log) = start(doc);

        let record = RecordDraft::element(EventKind::Click, "id=go", "https://example.com")
            .into_record("r1".to_string());
        let response = client.call(DocumentCommand::ReplayEvent(record)).await.unwrap();
        assert_eq!(response, DocumentResponse::Replayed(ReplayEventResult::succeeded(None)));
        assert_eq!(page.actions(), vec![PageAction::Click(go)]);

        let missing = RecordDraft::element(EventKind::Click, "id=gone", "https://example.com")
            .into_record("r2".to_string());
        match client.call(DocumentCommand::ReplayEvent(missing)).await.unwrap() {
            DocumentResponse::Replayed(result) => {
                assert!(!result.success);
                assert!(result.error.unwrap().contains("id=gone"));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_input_record_leaves_earlier_record_alone() {
        let mut doc = Document::new("https://example.com");
        let body = doc.append_element(doc.root(), "body", &[]);
        let go = doc.append_element(body, "button", &[("id", "go")]);
        doc.set_cursor(go, "pointer");
        let amt = doc.append_element(body, "input", &[("id", "amt")]);
        let (client, _page, tx, log) = start_with(doc.clone(), orchestrator_failing_at(2));
        client.call(DocumentCommand::ActivateEventTracking).await.unwrap();

        let send = |doc: &Document, event: RawEvent| {
            tx.try_send(CapturedEvent {
                document: doc.clone(),
                event,
            })
            .unwrap()
        };
        send(&doc, RawEvent::Click { target: go });
        send(&doc, RawEvent::Focus { target: amt });
        // this click's input record is dropped: no context id
        send(&doc, RawEvent::Click { target: amt });
        doc.set_value(amt, "5000");
        send(&doc, RawEvent::Input { target: amt });
        send(&doc, RawEvent::Blur { target: amt });
        client.call(DocumentCommand::DeactivateEventTracking).await.unwrap();

        let records: Vec<_> = log
            .get()
            .iter()
            .map(|r| (r.kind, r.target_id.clone(), r.input_value.clone()))
            .collect();
        assert_eq!(
            records,
            vec![
                (EventKind::Click, "id=go".to_string(), None),
                (EventKind::Input, "id=amt".to_string(), Some("5000".to_string())),
            ]
        );
    }
}
