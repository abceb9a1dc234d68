use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::dom::{Document, NodeId};
use super::host::{ContextHost, DocumentAttach, HostEvent, Transition};
use super::page::{PageDriver, REPLAY_MARKER_ATTR};
use crate::models::ContextId;
use crate::recording::{CapturedEvent, RawEvent};

/// An action a [`MemoryPage`] performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    Click(NodeId),
    SetValue(NodeId, String),
    SelectOption(NodeId, String),
    Enter(NodeId),
}

/// Browsing context backed by an in-memory document.
///
/// Used for dry runs of a log and by the test suite; actions are applied to
/// the document and kept in order.
pub struct MemoryPage {
    document: Mutex<Document>,
    actions: Mutex<Vec<PageAction>>,
    tracking: AtomicBool,
}

impl MemoryPage {
    pub fn new(document: Document) -> Self {
        Self {
            document: Mutex::new(document),
            actions: Mutex::new(Vec::new()),
            tracking: AtomicBool::new(false),
        }
    }

    pub fn document(&self) -> Document {
        self.lock_document().clone()
    }

    /// Mutate the document, e.g. to simulate the page changing under replay
    pub fn update<F: FnOnce(&mut Document)>(&self, f: F) {
        f(&mut self.lock_document());
    }

    pub fn replace_document(&self, document: Document) {
        *self.lock_document() = document;
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    fn lock_document(&self) -> std::sync::MutexGuard<'_, Document> {
        // a panic while holding the lock leaves the document usable
        self.document.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, action: PageAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }

    fn check_node(doc: &Document, node: NodeId) -> Result<()> {
        if doc.is_element(node) {
            Ok(())
        } else {
            Err(anyhow!("node {} is not an element of the current page", node))
        }
    }
}

#[async_trait]
impl PageDriver for MemoryPage {
    async fn snapshot(&self) -> Result<Document> {
        Ok(self.document())
    }

    async fn click(&self, _snapshot: &Document, node: NodeId, marker: &str) -> Result<()> {
        let mut doc = self.lock_document();
        Self::check_node(&doc, node)?;
        doc.set_attr(node, REPLAY_MARKER_ATTR, marker);

        let target = doc.find_by_attr(REPLAY_MARKER_ATTR, marker);
        if let Some(target) = target {
            doc.remove_attr(target, REPLAY_MARKER_ATTR);
        }
        drop(doc);

        let target = target.ok_or_else(|| anyhow!("element replaced before click"))?;
        self.record(PageAction::Click(target));
        Ok(())
    }

    async fn set_value(&self, _snapshot: &Document, node: NodeId, value: &str) -> Result<()> {
        let mut doc = self.lock_document();
        Self::check_node(&doc, node)?;
        doc.set_value(node, value);
        drop(doc);
        self.record(PageAction::SetValue(node, value.to_string()));
        Ok(())
    }

    async fn select_option(&self, _snapshot: &Document, node: NodeId, option_text: &str) -> Result<()> {
        let mut doc = self.lock_document();
        if doc.tag(node) != "select" {
            return Err(anyhow!("element is <{}>, not <select>", doc.tag(node)));
        }
        let option = doc
            .find_option(node, option_text)
            .ok_or_else(|| anyhow!("no option with text '{}'", option_text))?;
        let value = doc
            .attr(option, "value")
            .map(str::to_string)
            .unwrap_or_else(|| option_text.to_string());
        doc.set_value(node, &value);
        drop(doc);
        self.record(PageAction::SelectOption(node, option_text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, _snapshot: &Document, node: NodeId) -> Result<()> {
        Self::check_node(&self.lock_document(), node)?;
        self.record(PageAction::Enter(node));
        Ok(())
    }

    async fn set_tracking(&self, enabled: bool) -> Result<()> {
        self.tracking.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryContext {
    page: Arc<MemoryPage>,
    url: String,
    capture: mpsc::Sender<CapturedEvent>,
}

/// [`ContextHost`] over in-memory pages.
///
/// Documents are served from a site map keyed by url; an unknown url loads
/// an empty document. Urls marked with [`MemoryHost::stall`] never finish
/// loading.
pub struct MemoryHost {
    site: Mutex<HashMap<String, Document>>,
    stalled: Mutex<HashSet<String>>,
    contexts: DashMap<ContextId, MemoryContext>,
    next_tab_id: AtomicI64,
    next_window_id: AtomicI64,
    dialogs_accepted: AtomicUsize,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl MemoryHost {
    pub fn new(events: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self {
            site: Mutex::new(HashMap::new()),
            stalled: Mutex::new(HashSet::new()),
            contexts: DashMap::new(),
            next_tab_id: AtomicI64::new(1),
            next_window_id: AtomicI64::new(1),
            dialogs_accepted: AtomicUsize::new(0),
            events,
        }
    }

    /// Serve `document` for `url`
    pub fn add_page(&self, url: &str, mut document: Document) {
        document.url = url.to_string();
        if let Ok(mut site) = self.site.lock() {
            site.insert(url.to_string(), document);
        }
    }

    pub fn stall(&self, url: &str) {
        if let Ok(mut stalled) = self.stalled.lock() {
            stalled.insert(url.to_string());
        }
    }

    pub fn page(&self, context: ContextId) -> Option<Arc<MemoryPage>> {
        self.contexts.get(&context).map(|c| Arc::clone(&c.page))
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        let mut contexts: Vec<ContextId> = self.contexts.iter().map(|c| *c.key()).collect();
        contexts.sort_by_key(|c| c.tab_id);
        contexts
    }

    pub fn dialogs_accepted(&self) -> usize {
        self.dialogs_accepted.load(Ordering::SeqCst)
    }

    /// Deliver a DOM event to the context's document agent, as the capture
    /// script would. Node ids refer to the page's current document.
    pub async fn dispatch(&self, context: ContextId, event: RawEvent) -> Result<()> {
        let (document, capture) = {
            let ctx = self
                .contexts
                .get(&context)
                .ok_or_else(|| anyhow!("unknown tab {}", context.tab_id))?;
            (ctx.page.document(), ctx.capture.clone())
        };
        capture
            .send(CapturedEvent { document, event })
            .await
            .map_err(|_| anyhow!("document agent for tab {} is gone", context.tab_id))
    }

    /// Simulate the user navigating a context
    pub fn user_navigate(&self, context: ContextId, url: &str, transition: Transition) -> Result<()> {
        self.load_into(context, url)?;
        let _ = self.events.send(HostEvent::Navigated {
            context,
            url: url.to_string(),
            transition,
        });
        Ok(())
    }

    fn document_for(&self, url: &str) -> Document {
        self.site
            .lock()
            .ok()
            .and_then(|site| site.get(url).cloned())
            .unwrap_or_else(|| Document::new(url))
    }

    fn load_into(&self, context: ContextId, url: &str) -> Result<()> {
        let document = self.document_for(url);
        let mut ctx = self
            .contexts
            .get_mut(&context)
            .ok_or_else(|| anyhow!("unknown tab {}", context.tab_id))?;
        ctx.page.replace_document(document);
        ctx.url = url.to_string();
        Ok(())
    }

    fn create(&self, window_id: i64, url: &str, new_window: bool) -> ContextId {
        let context = ContextId::new(self.next_tab_id.fetch_add(1, Ordering::SeqCst), window_id);
        let page = Arc::new(MemoryPage::new(self.document_for(url)));
        let (tx, rx) = mpsc::channel(256);
        self.contexts.insert(
            context,
            MemoryContext {
                page: Arc::clone(&page),
                url: url.to_string(),
                capture: tx,
            },
        );

        let announce = if new_window {
            HostEvent::WindowCreated { context, url: url.to_string() }
        } else {
            HostEvent::TabCreated { context, url: url.to_string() }
        };
        let _ = self.events.send(announce);
        let _ = self.events.send(HostEvent::DocumentReady(DocumentAttach {
            context,
            url: url.to_string(),
            page,
            events: rx,
        }));
        context
    }
}

#[async_trait]
impl ContextHost for MemoryHost {
    async fn open_window(&self, url: &str) -> Result<ContextId> {
        let window_id = self.next_window_id.fetch_add(1, Ordering::SeqCst);
        Ok(self.create(window_id, url, true))
    }

    async fn open_tab(&self, window_id: i64, url: &str) -> Result<ContextId> {
        Ok(self.create(window_id, url, false))
    }

    async fn navigate(&self, context: ContextId, url: &str) -> Result<()> {
        self.user_navigate(context, url, Transition::Typed)
    }

    async fn close(&self, context: ContextId) -> Result<()> {
        self.contexts
            .remove(&context)
            .ok_or_else(|| anyhow!("unknown tab {}", context.tab_id))?;
        let _ = self.events.send(HostEvent::TabRemoved { context });
        Ok(())
    }

    async fn accept_dialog(&self, context: ContextId) -> Result<()> {
        if !self.contexts.contains_key(&context) {
            return Err(anyhow!("unknown tab {}", context.tab_id));
        }
        self.dialogs_accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_load(&self, context: ContextId) -> Result<()> {
        let url = self
            .contexts
            .get(&context)
            .map(|c| c.url.clone())
            .ok_or_else(|| anyhow!("unknown tab {}", context.tab_id))?;
        let stalled = self.stalled.lock().map(|s| s.contains(&url)).unwrap_or(false);
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}
