use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::Notify;

use super::protocol::{DocumentClient, DocumentCommand, DocumentResponse};
use crate::models::ContextId;

/// Live document agents by browsing context
#[derive(Default)]
pub struct DocumentRegistry {
    documents: DashMap<ContextId, DocumentClient>,
    registered: Notify,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, context: ContextId, client: DocumentClient) {
        self.documents.insert(context, client);
        self.registered.notify_waiters();
    }

    pub fn remove(&self, context: &ContextId) -> Option<DocumentClient> {
        self.documents.remove(context).map(|(_, client)| client)
    }

    pub fn get(&self, context: &ContextId) -> Option<DocumentClient> {
        self.documents.get(context).map(|c| c.clone())
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        self.documents.iter().map(|d| *d.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The context's agent, waiting up to `limit` for it to register
    pub async fn wait_for(&self, context: ContextId, limit: Duration) -> Option<DocumentClient> {
        let wait = async {
            loop {
                let notified = self.registered.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if let Some(client) = self.get(&context) {
                    return client;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, wait).await.ok()
    }

    /// Send `command` to every agent, one after another so each agent sees
    /// commands in the order they were broadcast
    pub async fn broadcast(&self, command: DocumentCommand, limit: Duration) {
        let clients: Vec<(ContextId, DocumentClient)> = self
            .documents
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (context, client) in clients {
            match client.call_timeout(command.clone(), limit).await {
                Ok(DocumentResponse::Ack) => {}
                Ok(other) => tracing::debug!("Unexpected answer from tab {}: {:?}", context.tab_id, other),
                Err(e) => tracing::debug!("Tab {} did not take {:?}: {}", context.tab_id, command, e),
            }
        }
    }
}
