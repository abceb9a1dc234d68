use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::page::PageDriver;
use crate::models::ContextId;
use crate::recording::CapturedEvent;

/// How a top-level navigation was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Typed into the address bar or opened from a bookmark
    Typed,
    BackForward,
    /// Links, form submissions, reloads, redirects
    Other,
}

/// A new document together with its capture event feed
pub struct DocumentAttach {
    pub context: ContextId,
    pub url: String,
    pub page: Arc<dyn PageDriver>,
    pub events: mpsc::Receiver<CapturedEvent>,
}

/// Notifications from the browser about its browsing contexts
pub enum HostEvent {
    /// A document finished loading and its listeners are installed
    DocumentReady(DocumentAttach),
    WindowCreated { context: ContextId, url: String },
    TabCreated { context: ContextId, url: String },
    TabRemoved { context: ContextId },
    Navigated {
        context: ContextId,
        url: String,
        transition: Transition,
    },
}

pub type HostEvents = mpsc::UnboundedReceiver<HostEvent>;

/// Browsing-context operations used by replay and the operator surface.
///
/// Methods that open or navigate return once the request is issued;
/// [`ContextHost::wait_for_load`] resolves when the context's document has
/// loaded and has no timeout of its own.
#[async_trait]
pub trait ContextHost: Send + Sync {
    async fn open_window(&self, url: &str) -> Result<ContextId>;

    async fn open_tab(&self, window_id: i64, url: &str) -> Result<ContextId>;

    async fn navigate(&self, context: ContextId, url: &str) -> Result<()>;

    async fn close(&self, context: ContextId) -> Result<()>;

    /// Accept the pending JavaScript dialog of the context
    async fn accept_dialog(&self, context: ContextId) -> Result<()>;

    async fn wait_for_load(&self, context: ContextId) -> Result<()>;
}
