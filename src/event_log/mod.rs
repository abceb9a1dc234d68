//! The replayable action log.
//!
//! All mutations go through one actor task, so exactly one is in flight at
//! a time and every caller observes a total order. Readers get the latest
//! committed snapshot from a `watch` channel and never wait on writers.

pub mod store;

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use uuid::Uuid;

use crate::models::{EventRecord, RecordDraft, ReplayOutcome, ReplayStatus, NO_TARGET};

pub use store::{LogStore, MemoryLogStore, SqliteLogStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("event log is closed")]
    Closed,
    #[error("invalid records: {0}")]
    Invalid(String),
}

/// A committed change, pushed to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum LogChange {
    Appended { record: EventRecord },
    Updated { record: EventRecord },
    Deleted { uid: String },
    StatusReset,
    Cleared,
    Replaced { count: usize },
}

enum LogCommand {
    Append {
        draft: RecordDraft,
        reply: oneshot::Sender<String>,
    },
    Edit {
        uid: String,
        value: String,
        reply: oneshot::Sender<bool>,
    },
    Delete {
        uid: String,
        reply: oneshot::Sender<bool>,
    },
    MarkReplayed {
        uid: String,
        outcome: ReplayOutcome,
        reply: oneshot::Sender<bool>,
    },
    ResetReplayStatus {
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Replace {
        records: Vec<EventRecord>,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the event log actor
#[derive(Clone)]
pub struct EventLog {
    commands: mpsc::Sender<LogCommand>,
    snapshot: watch::Receiver<Arc<Vec<EventRecord>>>,
    changes: broadcast::Sender<LogChange>,
}

impl EventLog {
    /// Start the actor with the records already in `store`
    pub fn spawn(store: Arc<dyn LogStore>) -> Self {
        let records = store.load_records().unwrap_or_else(|e| {
            tracing::warn!("Failed to load stored event log: {}", e);
            Vec::new()
        });
        tracing::info!("Event log opened with {} record(s)", records.len());

        let (commands, inbox) = mpsc::channel(256);
        let (snapshot_tx, snapshot) = watch::channel(Arc::new(records.clone()));
        let (changes, _) = broadcast::channel(256);

        let actor = LogActor {
            records,
            store,
            snapshot: snapshot_tx,
            changes: changes.clone(),
        };
        tokio::spawn(actor.run(inbox));

        Self {
            commands,
            snapshot,
            changes,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> LogCommand) -> Result<T, LogError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| LogError::Closed)?;
        response.await.map_err(|_| LogError::Closed)
    }

    /// Append a captured record; returns its uid
    pub async fn append(&self, draft: RecordDraft) -> Result<String, LogError> {
        self.request(|reply| LogCommand::Append { draft, reply }).await
    }

    /// Change a record's input value. Returns false when no record has `uid`.
    pub async fn edit(&self, uid: &str, value: &str) -> Result<bool, LogError> {
        let (uid, value) = (uid.to_string(), value.to_string());
        self.request(|reply| LogCommand::Edit { uid, value, reply }).await
    }

    pub async fn delete(&self, uid: &str) -> Result<bool, LogError> {
        let uid = uid.to_string();
        self.request(|reply| LogCommand::Delete { uid, reply }).await
    }

    pub async fn mark_replayed(&self, uid: &str, outcome: ReplayOutcome) -> Result<bool, LogError> {
        let uid = uid.to_string();
        self.request(|reply| LogCommand::MarkReplayed { uid, outcome, reply })
            .await
    }

    /// Set every record back to pending
    pub async fn reset_replay_status(&self) -> Result<(), LogError> {
        self.request(|reply| LogCommand::ResetReplayStatus { reply }).await
    }

    pub async fn clear(&self) -> Result<(), LogError> {
        self.request(|reply| LogCommand::Clear { reply }).await
    }

    /// Swap in a whole log. Rejected as a whole when a uid is empty or
    /// repeated, or an element record has no target.
    pub async fn replace(&self, records: Vec<EventRecord>) -> Result<(), LogError> {
        validate(&records)?;
        self.request(|reply| LogCommand::Replace { records, reply }).await
    }

    /// Latest committed snapshot
    pub fn get(&self) -> Arc<Vec<EventRecord>> {
        Arc::clone(&*self.snapshot.borrow())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogChange> {
        self.changes.subscribe()
    }
}

fn validate(records: &[EventRecord]) -> Result<(), LogError> {
    let mut seen = HashSet::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if record.uid.is_empty() {
            return Err(LogError::Invalid(format!("record {} has no uid", i)));
        }
        if !seen.insert(record.uid.as_str()) {
            return Err(LogError::Invalid(format!("uid {} appears more than once", record.uid)));
        }
        if !record.kind.is_lifecycle() && (record.target_id.is_empty() || record.target_id == NO_TARGET) {
            return Err(LogError::Invalid(format!(
                "{} record {} has no target",
                record.kind, record.uid
            )));
        }
    }
    Ok(())
}

struct LogActor {
    records: Vec<EventRecord>,
    store: Arc<dyn LogStore>,
    snapshot: watch::Sender<Arc<Vec<EventRecord>>>,
    changes: broadcast::Sender<LogChange>,
}

impl LogActor {
    async fn run(mut self, mut inbox: mpsc::Receiver<LogCommand>) {
        while let Some(command) = inbox.recv().await {
            self.apply(command);
        }
        tracing::debug!("Event log actor stopped");
    }

    fn apply(&mut self, command: LogCommand) {
        match command {
            LogCommand::Append { draft, reply } => {
                let uid = Uuid::new_v4().to_string();
                let record = draft.into_record(uid.clone());
                tracing::debug!("Appending {} on '{}' as {}", record.kind, record.target_id, uid);
                self.records.push(record.clone());
                self.commit(LogChange::Appended { record });
                let _ = reply.send(uid);
            }
            LogCommand::Edit { uid, value, reply } => {
                let updated = self.update(&uid, |r| r.input_value = Some(value));
                let _ = reply.send(updated);
            }
            LogCommand::Delete { uid, reply } => {
                let before = self.records.len();
                self.records.retain(|r| r.uid != uid);
                let deleted = self.records.len() != before;
                if deleted {
                    self.commit(LogChange::Deleted { uid });
                }
                let _ = reply.send(deleted);
            }
            LogCommand::MarkReplayed { uid, outcome, reply } => {
                let updated = self.update(&uid, |r| r.replayed = outcome.into());
                let _ = reply.send(updated);
            }
            LogCommand::ResetReplayStatus { reply } => {
                for record in &mut self.records {
                    record.replayed = ReplayStatus::Pending;
                }
                self.commit(LogChange::StatusReset);
                let _ = reply.send(());
            }
            LogCommand::Clear { reply } => {
                self.records.clear();
                self.commit(LogChange::Cleared);
                let _ = reply.send(());
            }
            LogCommand::Replace { records, reply } => {
                self.records = records;
                self.commit(LogChange::Replaced {
                    count: self.records.len(),
                });
                let _ = reply.send(());
            }
        }
    }

    fn update(&mut self, uid: &str, f: impl FnOnce(&mut EventRecord)) -> bool {
        match self.records.iter_mut().find(|r| r.uid == uid) {
            Some(record) => {
                f(record);
                let record = record.clone();
                self.commit(LogChange::Updated { record });
                true
            }
            None => false,
        }
    }

    /// Persist, publish the snapshot, notify subscribers. A failed write is
    /// logged and the in-memory commit stands.
    fn commit(&mut self, change: LogChange) {
        if let Err(e) = self.store.save_records(&self.records) {
            tracing::warn!("Failed to persist event log: {}", e);
        }
        self.snapshot.send_replace(Arc::new(self.records.clone()));
        let _ = self.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextId, EventKind};

    fn draft(kind: EventKind, target: &str) -> RecordDraft {
        RecordDraft::element(kind, target, "https://example.com").with_context(ContextId::new(1, 1))
    }

    fn log() -> (EventLog, Arc<MemoryLogStore>) {
        let store = Arc::new(MemoryLogStore::new());
        (EventLog::spawn(store.clone()), store)
    }

    #[tokio::test]
    async fn test_append_edit_delete() {
        let (log, store) = log();
        let first = log.append(draft(EventKind::Click, "id=go")).await.unwrap();
        let second = log.append(draft(EventKind::Input, "name=amt")).await.unwrap();
        assert_ne!(first, second);

        assert!(log.edit(&second, "5000").await.unwrap());
        assert!(log.edit(&second, "5000").await.unwrap());
        assert_eq!(log.get()[1].input_value.as_deref(), Some("5000"));

        assert!(log.delete(&first).await.unwrap());
        assert!(!log.delete(&first).await.unwrap());
        assert!(!log.edit(&first, "x").await.unwrap());

        let snapshot = log.get();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].uid, second);
        assert_eq!(store.load_records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_status_reset() {
        let (log, _) = log();
        let a = log.append(draft(EventKind::Click, "id=a")).await.unwrap();
        let b = log.append(draft(EventKind::Click, "id=b")).await.unwrap();
        log.mark_replayed(&a, ReplayOutcome::Succeeded).await.unwrap();
        log.mark_replayed(&b, ReplayOutcome::Errored).await.unwrap();
        assert!(!log.mark_replayed("missing", ReplayOutcome::Errored).await.unwrap());
        assert_eq!(log.get()[1].replayed, ReplayStatus::Errored);

        log.reset_replay_status().await.unwrap();
        assert!(log.get().iter().all(|r| r.replayed == ReplayStatus::Pending));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let (log, _) = log();
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move { log.append(draft(EventKind::Click, &format!("id=b{}", i))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = log.get();
        assert_eq!(snapshot.len(), 20);
        let mut uids: Vec<_> = snapshot.iter().map(|r| r.uid.clone()).collect();
        uids.sort();
        uids.dedup();
        assert_eq!(uids.len(), 20);
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let (log, _) = log();
        let mut changes = log.subscribe();
        log.append(draft(EventKind::Click, "id=go")).await.unwrap();
        log.clear().await.unwrap();

        assert!(matches!(changes.recv().await.unwrap(), LogChange::Appended { .. }));
        assert!(matches!(changes.recv().await.unwrap(), LogChange::Cleared));
        assert!(log.get().is_empty());
    }

    #[tokio::test]
    async fn test_restores_stored_records() {
        let store = Arc::new(MemoryLogStore::new());
        let record = draft(EventKind::Click, "id=go").into_record("u1".to_string());
        store.save_records(&[record]).unwrap();

        let log = EventLog::spawn(store);
        assert_eq!(log.get()[0].uid, "u1");
        log.replace(Vec::new()).await.unwrap();
        assert!(log.get().is_empty());
    }

    #[tokio::test]
    async fn test_replace_rejects_duplicate_uids() {
        let (log, store) = log();
        let kept = log.append(draft(EventKind::Click, "id=go")).await.unwrap();

        let dup = || draft(EventKind::Input, "name=amt").into_record("dup".to_string());
        let err = log.replace(vec![dup(), dup()]).await.unwrap_err();
        assert!(matches!(err, LogError::Invalid(_)));

        // the log and its stored copy are untouched, and later writes persist
        assert_eq!(log.get().len(), 1);
        assert_eq!(log.get()[0].uid, kept);
        log.append(draft(EventKind::Click, "id=next")).await.unwrap();
        assert_eq!(store.load_records().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_rejects_untargeted_element_records() {
        let (log, _) = log();
        let click = draft(EventKind::Click, NO_TARGET).into_record("c1".to_string());
        assert!(matches!(log.replace(vec![click]).await, Err(LogError::Invalid(_))));

        let tab = RecordDraft::lifecycle(EventKind::TabCreated, "https://example.com", ContextId::new(1, 2))
            .into_record("t1".to_string());
        let input = draft(EventKind::Input, "name=amt").into_record("i1".to_string());
        log.replace(vec![tab, input]).await.unwrap();
        assert_eq!(log.get().len(), 2);
    }
}
