use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

use super::template::substitute;
use super::ReplayError;
use crate::browser::ContextHost;
use crate::coordinator::protocol::{DocumentCommand, DocumentResponse};
use crate::coordinator::DocumentRegistry;
use crate::event_log::EventLog;
use crate::models::{ContextId, EventKind, EventRecord, ReplayOutcome, TemplateDataMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    /// The last pass stopped on a fatal error
    Failed,
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Pause after every record
    pub settle: Duration,
    /// Bound on opening or navigating a context until its document loads
    pub load_timeout: Duration,
    /// Bound on one document round trip, keypad sequences included
    pub rpc_timeout: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1000),
            load_timeout: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub outcome: ReplayOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<String>,
}

/// Summary of one pass over the log
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RecordOutcome>,
    /// Error that ended the pass early
    pub fatal: Option<String>,
}

impl ReplayReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == ReplayOutcome::Succeeded)
            .count()
    }

    /// Texts read by `extract` records, by record uid
    pub fn extracted(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.extracted.as_deref().map(|text| (o.uid.as_str(), text)))
            .collect()
    }
}

/// Pushed to subscribers while a pass runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "progress", rename_all = "snake_case")]
pub enum ReplayProgress {
    Started { total: usize },
    Record(RecordOutcome),
    Finished(ReplayReport),
}

/// What a pass runs against
#[derive(Clone)]
pub struct ReplayEnv {
    pub host: Arc<dyn ContextHost>,
    pub documents: Arc<DocumentRegistry>,
    pub log: EventLog,
    pub templates: TemplateDataMap,
}

/// Replays the event log record by record, one pass at a time
pub struct ReplayEngine {
    config: ReplayConfig,
    state: Mutex<EngineState>,
    last_report: Mutex<Option<ReplayReport>>,
    progress: broadcast::Sender<ReplayProgress>,
}

impl ReplayEngine {
    pub fn new(config: ReplayConfig) -> Self {
        let (progress, _) = broadcast::channel(256);
        Self {
            config,
            state: Mutex::new(EngineState::Idle),
            last_report: Mutex::new(None),
            progress,
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub async fn state(&self) -> EngineState {
        *self.state.lock().await
    }

    pub async fn last_report(&self) -> Option<ReplayReport> {
        self.last_report.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayProgress> {
        self.progress.subscribe()
    }

    /// Claim the engine for a pass. Fails while another pass is running.
    pub async fn begin(&self) -> Result<(), ReplayError> {
        let mut state = self.state.lock().await;
        if *state == EngineState::Running {
            return Err(ReplayError::AlreadyRunning);
        }
        *state = EngineState::Running;
        Ok(())
    }

    /// [`ReplayEngine::begin`] followed by [`ReplayEngine::run`]
    pub async fn replay(&self, env: ReplayEnv) -> Result<ReplayReport, ReplayError> {
        self.begin().await?;
        Ok(self.run(env).await)
    }

    /// Run a pass claimed with [`ReplayEngine::begin`]
    pub async fn run(&self, env: ReplayEnv) -> ReplayReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::new();
        let mut fatal = None;

        match env.log.reset_replay_status().await {
            Ok(()) => {
                let records = env.log.get();
                tracing::info!("Starting replay of {} record(s)", records.len());
                let _ = self.progress.send(ReplayProgress::Started { total: records.len() });

                let mut active: Option<ContextId> = None;
                for (index, record) in records.iter().enumerate() {
                    tracing::debug!(
                        "Replaying record {}/{}: {} {}",
                        index + 1,
                        records.len(),
                        record.kind,
                        record.target_id
                    );
                    let result = self.replay_record(&env, record, &mut active).await;

                    let (outcome, error, extracted) = match &result {
                        Ok(extracted) => (ReplayOutcome::Succeeded, None, extracted.clone()),
                        Err(e) => {
                            tracing::warn!("Record {} ({}) failed: {}", record.uid, record.kind, e);
                            (ReplayOutcome::Errored, Some(e.to_string()), None)
                        }
                    };
                    if let Err(e) = env.log.mark_replayed(&record.uid, outcome).await {
                        tracing::warn!("Could not mark record {}: {}", record.uid, e);
                    }

                    let outcome = RecordOutcome {
                        uid: record.uid.clone(),
                        kind: record.kind,
                        outcome,
                        error,
                        extracted,
                    };
                    let _ = self.progress.send(ReplayProgress::Record(outcome.clone()));
                    outcomes.push(outcome);

                    if let Err(e) = result {
                        if e.is_fatal() {
                            fatal = Some(e.to_string());
                            break;
                        }
                    }
                    tokio::time::sleep(self.config.settle).await;
                }
            }
            Err(e) => fatal = Some(e.to_string()),
        }

        let report = ReplayReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
            fatal,
        };
        match &report.fatal {
            Some(e) => tracing::error!("Replay stopped: {}", e),
            None => tracing::info!(
                "Replay finished: {}/{} record(s) succeeded",
                report.succeeded(),
                report.outcomes.len()
            ),
        }

        *self.state.lock().await = if report.fatal.is_some() {
            EngineState::Failed
        } else {
            EngineState::Idle
        };
        *self.last_report.lock().await = Some(report.clone());
        let _ = self.progress.send(ReplayProgress::Finished(report.clone()));
        report
    }

    async fn replay_record(
        &self,
        env: &ReplayEnv,
        record: &EventRecord,
        active: &mut Option<ContextId>,
    ) -> Result<Option<String>, ReplayError> {
        let host = env.host.as_ref();
        match record.kind {
            EventKind::WindowCreated => {
                let context = self
                    .until_loaded(host, async { host.open_window(&record.url).await })
                    .await?;
                *active = Some(context);
                Ok(None)
            }
            EventKind::TabCreated => {
                let window_id = self.target(env, record, *active)?.window_id;
                let context = self
                    .until_loaded(host, async { host.open_tab(window_id, &record.url).await })
                    .await?;
                *active = Some(context);
                Ok(None)
            }
            EventKind::NavigationUrl | EventKind::NavigationBackForward => {
                let context = self.target(env, record, *active)?;
                self.until_loaded(host, async {
                    host.navigate(context, &record.url).await?;
                    Ok(context)
                })
                .await?;
                Ok(None)
            }
            EventKind::TabRemoved | EventKind::WindowRemoved => {
                let context = self.target(env, record, *active)?;
                host.close(context).await?;
                *active = None;
                Ok(None)
            }
            EventKind::AcceptPopup => {
                let context = self.target(env, record, *active)?;
                host.accept_dialog(context).await?;
                Ok(None)
            }
            _ => self.replay_in_document(env, record, *active).await,
        }
    }

    async fn replay_in_document(
        &self,
        env: &ReplayEnv,
        record: &EventRecord,
        active: Option<ContextId>,
    ) -> Result<Option<String>, ReplayError> {
        let context = self.target(env, record, active)?;
        let client = env
            .documents
            .wait_for(context, self.config.rpc_timeout)
            .await
            .ok_or(ReplayError::NoTarget(record.kind))?;

        let mut record = record.clone();
        if record.kind == EventKind::Input {
            if let Some(value) = &record.input_value {
                let substitution = substitute(value, &env.templates);
                if !substitution.unresolved.is_empty() {
                    tracing::debug!(
                        "No template data for {:?}, keeping the placeholders",
                        substitution.unresolved
                    );
                }
                record.input_value = Some(substitution.value);
            }
        }

        let response = client
            .call_timeout(DocumentCommand::ReplayEvent(record), self.config.rpc_timeout)
            .await?;
        match response {
            DocumentResponse::Replayed(result) if result.success => Ok(result.extracted),
            DocumentResponse::Replayed(result) => Err(ReplayError::Action(
                result.error.unwrap_or_else(|| "document reported failure".to_string()),
            )),
            DocumentResponse::Ack => Err(ReplayError::Action(
                "document acknowledged without replaying".to_string(),
            )),
        }
    }

    /// The context a record runs in: the active replay target, else the
    /// recorded context when a document is attached to it
    fn target(
        &self,
        env: &ReplayEnv,
        record: &EventRecord,
        active: Option<ContextId>,
    ) -> Result<ContextId, ReplayError> {
        active
            .or_else(|| {
                let recorded = record.context();
                env.documents.get(&recorded).map(|_| recorded)
            })
            .ok_or(ReplayError::NoTarget(record.kind))
    }

    /// Run `open` and wait for the context it yields to load, all within the
    /// load timeout
    async fn until_loaded<F>(&self, host: &dyn ContextHost, open: F) -> Result<ContextId, ReplayError>
    where
        F: Future<Output = anyhow::Result<ContextId>>,
    {
        let limit = self.config.load_timeout;
        let load = async {
            let context = open.await?;
            host.wait_for_load(context).await?;
            Ok::<_, anyhow::Error>(context)
        };
        let context = tokio::time::timeout(limit, load)
            .await
            .map_err(|_| ReplayError::ContextLoadTimeout(limit))??;
        Ok(context)
    }
}
