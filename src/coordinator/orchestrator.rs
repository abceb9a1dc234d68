use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use super::agent::{AgentConfig, DocumentAgent};
use super::protocol::{
    DocumentCommand, OrchestratorClient, OrchestratorEnvelope, OrchestratorLink, OrchestratorRequest,
    OrchestratorResponse, Routed,
};
use super::registry::DocumentRegistry;
use super::rpc::Inbox;
use crate::browser::{ContextHost, DocumentAttach, HostEvent, HostEvents, Transition};
use crate::event_log::{EventLog, LogError, LogStore};
use crate::models::{ContextId, EventKind, Mode, RecordDraft, TemplateDataMap, NO_TARGET};
use crate::replay::{EngineState, ReplayConfig, ReplayEngine, ReplayEnv, ReplayError};

/// Url schemes of browser-internal pages, never recorded
const INTERNAL_URL_PREFIXES: &[&str] = &["chrome://", "about:", "chrome-extension://", "devtools://"];

pub fn is_internal_url(url: &str) -> bool {
    INTERNAL_URL_PREFIXES.iter().any(|p| url.starts_with(p))
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub agent: AgentConfig,
    pub replay: ReplayConfig,
}

/// Background coordinator: owns the mode, the document agents and the
/// replay engine, and records browsing-context lifecycle changes.
pub struct Orchestrator {
    host: Arc<dyn ContextHost>,
    log: EventLog,
    store: Arc<dyn LogStore>,
    documents: Arc<DocumentRegistry>,
    engine: Arc<ReplayEngine>,
    mode: watch::Sender<Mode>,
    templates: RwLock<TemplateDataMap>,
    /// Last known url per context, for records of removed tabs
    tab_urls: DashMap<ContextId, String>,
    client: OrchestratorClient,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build the orchestrator and start serving host events and requests
    pub fn start(
        host: Arc<dyn ContextHost>,
        host_events: HostEvents,
        log: EventLog,
        store: Arc<dyn LogStore>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let mode = match store.load_mode() {
            // a pass cannot survive a restart
            Ok(Some(Mode::Replaying)) | Ok(None) => Mode::Stopped,
            Ok(Some(mode)) => mode,
            Err(e) => {
                tracing::warn!("Failed to load stored mode: {}", e);
                Mode::Stopped
            }
        };
        let templates = store.load_templates().unwrap_or_else(|e| {
            tracing::warn!("Failed to load template data: {}", e);
            TemplateDataMap::new()
        });
        tracing::info!("Orchestrator starting in {} mode", mode.as_str());

        let (client, inbox) = OrchestratorClient::channel(256);
        let (mode, _) = watch::channel(mode);

        let orchestrator = Arc::new(Self {
            host,
            log,
            store,
            documents: Arc::new(DocumentRegistry::new()),
            engine: Arc::new(ReplayEngine::new(config.replay.clone())),
            mode,
            templates: RwLock::new(templates),
            tab_urls: DashMap::new(),
            client,
            config,
        });

        tokio::spawn(Arc::clone(&orchestrator).serve_host_events(host_events));
        tokio::spawn(Arc::clone(&orchestrator).serve_requests(inbox));
        orchestrator
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn engine(&self) -> &ReplayEngine {
        &self.engine
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<Mode> {
        self.mode.subscribe()
    }

    /// Client for requests from outside any document
    pub fn client(&self) -> OrchestratorClient {
        self.client.clone()
    }

    /// Switch between recording and stopped, telling every document
    pub async fn set_mode(&self, mode: Mode) -> Result<(), ReplayError> {
        if self.engine.state().await == EngineState::Running || self.mode() == Mode::Replaying {
            return Err(ReplayError::AlreadyRunning);
        }
        self.apply_mode(mode).await;
        Ok(())
    }

    async fn apply_mode(&self, mode: Mode) {
        self.publish_mode(mode);
        let command = Self::tracking_command(mode);
        self.documents.broadcast(command, self.config.agent.rpc_timeout).await;
    }

    fn publish_mode(&self, mode: Mode) {
        if let Err(e) = self.store.save_mode(mode) {
            tracing::warn!("Failed to persist mode: {}", e);
        }
        self.mode.send_replace(mode);
        tracing::info!("Mode is now {}", mode.as_str());
    }

    fn tracking_command(mode: Mode) -> DocumentCommand {
        if mode.is_recording() {
            DocumentCommand::ActivateEventTracking
        } else {
            DocumentCommand::DeactivateEventTracking
        }
    }

    /// Start a replay pass in the background. The mode is `replaying`
    /// until the pass ends, then `stopped`.
    pub async fn start_replay(self: &Arc<Self>) -> Result<(), ReplayError> {
        self.engine.begin().await?;
        self.publish_mode(Mode::Replaying);

        let env = ReplayEnv {
            host: Arc::clone(&self.host),
            documents: Arc::clone(&self.documents),
            log: self.log.clone(),
            templates: self.templates.read().await.clone(),
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.documents
                .broadcast(DocumentCommand::DeactivateEventTracking, this.config.agent.rpc_timeout)
                .await;
            this.engine.run(env).await;
            this.apply_mode(Mode::Stopped).await;
        });
        Ok(())
    }

    /// Open a top-level context for recording
    pub async fn open_window(&self, url: &str) -> anyhow::Result<ContextId> {
        let context = self.host.open_window(url).await?;
        tracing::info!("Opened window {} at {}", context.window_id, url);
        Ok(context)
    }

    /// Append an `accept-popup` record in the context of the last record
    pub async fn append_popup(&self) -> Result<String, LogError> {
        let records = self.log.get();
        let (url, context) = records
            .last()
            .map(|r| (r.url.clone(), r.context()))
            .unwrap_or_default();
        self.log
            .append(RecordDraft::lifecycle(EventKind::AcceptPopup, url, context))
            .await
    }

    pub async fn templates(&self) -> TemplateDataMap {
        self.templates.read().await.clone()
    }

    /// Replace the template data used by later passes
    pub async fn set_templates(&self, templates: TemplateDataMap) -> anyhow::Result<()> {
        self.store.save_templates(&templates)?;
        *self.templates.write().await = templates;
        Ok(())
    }

    async fn serve_host_events(self: Arc<Self>, mut events: HostEvents) {
        while let Some(event) = events.recv().await {
            self.on_host_event(event).await;
        }
        tracing::debug!("Host event stream ended");
    }

    async fn on_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::DocumentReady(attach) => self.attach_document(attach).await,
            HostEvent::WindowCreated { context, url } => {
                self.tab_urls.insert(context, url.clone());
                self.record_lifecycle(EventKind::WindowCreated, &url, context).await;
            }
            HostEvent::TabCreated { context, url } => {
                self.tab_urls.insert(context, url.clone());
                self.record_lifecycle(EventKind::TabCreated, &url, context).await;
            }
            HostEvent::TabRemoved { context } => {
                self.documents.remove(&context);
                let url = self
                    .tab_urls
                    .remove(&context)
                    .map(|(_, url)| url)
                    .unwrap_or_else(|| NO_TARGET.to_string());
                self.record_lifecycle(EventKind::TabRemoved, &url, context).await;
            }
            HostEvent::Navigated {
                context,
                url,
                transition,
            } => {
                self.tab_urls.insert(context, url.clone());
                let kind = match transition {
                    Transition::Typed => EventKind::NavigationUrl,
                    Transition::BackForward => EventKind::NavigationBackForward,
                    Transition::Other => return,
                };
                self.record_lifecycle(kind, &url, context).await;
            }
        }
    }

    async fn attach_document(&self, attach: DocumentAttach) {
        let context = attach.context;
        self.tab_urls.insert(context, attach.url.clone());
        let link = OrchestratorLink::new(context, self.client.clone());
        let (client, _) = DocumentAgent::spawn(attach, self.log.clone(), link, self.config.agent.clone());
        self.documents.insert(context, client.clone());

        let command = Self::tracking_command(self.mode());
        if let Err(e) = client.call_timeout(command, self.config.agent.rpc_timeout).await {
            tracing::warn!("New document in tab {} did not take its mode: {}", context.tab_id, e);
        }
    }

    async fn record_lifecycle(&self, kind: EventKind, url: &str, context: ContextId) {
        if !self.mode().is_recording() || is_internal_url(url) {
            return;
        }
        match self.log.append(RecordDraft::lifecycle(kind, url, context)).await {
            Ok(uid) => tracing::debug!("Recorded {} for tab {} as {}", kind, context.tab_id, uid),
            Err(e) => tracing::warn!("Could not record {}: {}", kind, e),
        }
    }

    async fn serve_requests(self: Arc<Self>, mut inbox: Inbox<Routed, OrchestratorResponse>) {
        while let Some(envelope) = inbox.recv().await {
            self.on_request(envelope).await;
        }
    }

    async fn on_request(self: &Arc<Self>, envelope: OrchestratorEnvelope) {
        let (routed, responder) = envelope.into_parts();
        let response = match routed.request {
            OrchestratorRequest::GetContextId => match routed.from {
                Some(context) => OrchestratorResponse::ContextId(context),
                None => OrchestratorResponse::Rejected {
                    reason: "request did not come from a document".to_string(),
                },
            },
            OrchestratorRequest::ReplayEvents => match self.start_replay().await {
                Ok(()) => OrchestratorResponse::ReplayStarted,
                Err(e) => OrchestratorResponse::Rejected { reason: e.to_string() },
            },
        };
        responder.respond(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_urls() {
        assert!(is_internal_url("chrome://newtab/"));
        assert!(is_internal_url("about:blank"));
        assert!(is_internal_url("devtools://devtools/bundled/inspector.html"));
        assert!(!is_internal_url("https://bank.example/about:us"));
    }
}
