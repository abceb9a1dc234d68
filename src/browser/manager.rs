use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::GetWindowForTargetParams;
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameNavigated, GetNavigationHistoryParams, HandleJavaScriptDialogParams, TransitionType,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateTargetParams, EventTargetCreated, EventTargetDestroyed, TargetId,
};
use chromiumoxide::Page;
use dashmap::{mapref::entry::Entry, DashMap, DashSet};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use super::cdp_page::CdpPage;
use super::host::{ContextHost, DocumentAttach, HostEvent, Transition};
use crate::models::ContextId;
use crate::recording::recorder;

/// Capacity of each page's capture event queue
const CAPTURE_QUEUE: usize = 256;

/// Owns the Chrome instance and maps its page targets to browsing contexts
pub struct BrowserManager {
    inner: Arc<Inner>,
    /// Lock to prevent concurrent browser launches
    launch_lock: Mutex<()>,
}

struct Inner {
    browser: Mutex<Option<Browser>>,
    headless: bool,
    pages: DashMap<ContextId, Page>,
    targets: DashMap<String, ContextId>,
    windows: DashSet<i64>,
    next_tab_id: AtomicI64,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl BrowserManager {
    pub fn new(headless: bool, events: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                browser: Mutex::new(None),
                headless,
                pages: DashMap::new(),
                targets: DashMap::new(),
                windows: DashSet::new(),
                next_tab_id: AtomicI64::new(1),
                events,
            }),
            launch_lock: Mutex::new(()),
        }
    }

    /// Launch Chrome unless it is already running
    async fn ensure_browser(&self) -> Result<()> {
        let _launch_guard = self.launch_lock.lock().await;
        if self.inner.browser.lock().await.is_some() {
            return Ok(());
        }

        let mut config = BrowserConfig::builder().window_size(1280, 900);
        if !self.inner.headless {
            config = config.with_head();
        }
        let config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = timeout(Duration::from_secs(30), Browser::launch(config))
            .await
            .map_err(|_| anyhow!("Browser launch timeout (30s) - Chrome may not be installed or is unresponsive"))?
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });

        let created = browser
            .event_listener::<EventTargetCreated>()
            .await
            .map_err(|e| anyhow!("Failed to listen for new targets: {}", e))?;
        let destroyed = browser
            .event_listener::<EventTargetDestroyed>()
            .await
            .map_err(|e| anyhow!("Failed to listen for closed targets: {}", e))?;

        // pages Chrome opens on its own are closed; contexts start with open_window
        for page in browser.pages().await.unwrap_or_default() {
            if let Err(e) = page.close().await {
                tracing::warn!("Failed to close default page: {}", e);
            }
        }

        *self.inner.browser.lock().await = Some(browser);
        Inner::spawn_target_watcher(Arc::clone(&self.inner), created, destroyed);

        tracing::info!("Browser launched (headless: {})", self.inner.headless);
        Ok(())
    }

    async fn create_page(&self, url: &str, new_window: bool) -> Result<ContextId> {
        self.ensure_browser().await?;
        let params = CreateTargetParams::builder()
            .url(url)
            .new_window(new_window)
            .build()
            .map_err(|e| anyhow!("Failed to build target params: {}", e))?;

        let page = {
            let guard = self.inner.browser.lock().await;
            let browser = guard.as_ref().ok_or_else(|| anyhow!("No browser available"))?;
            browser
                .new_page(params)
                .await
                .map_err(|e| anyhow!("Failed to create page: {}", e))?
        };

        Inner::attach_page(&self.inner, page).await
    }

    fn page(&self, context: ContextId) -> Result<Page> {
        self.inner
            .pages
            .get(&context)
            .map(|p| p.clone())
            .ok_or_else(|| anyhow!("No page for tab {} in window {}", context.tab_id, context.window_id))
    }

    /// Close every page and the browser
    pub async fn close_all(&self) -> Result<()> {
        let pages: Vec<Page> = self.inner.pages.iter().map(|p| p.value().clone()).collect();
        self.inner.pages.clear();
        self.inner.targets.clear();
        for page in pages {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.inner.browser.lock().await.take() {
            let _ = browser.close().await;
        }
        tracing::info!("Browser closed");
        Ok(())
    }
}

impl Inner {
    fn spawn_target_watcher(
        inner: Arc<Inner>,
        mut created: chromiumoxide::listeners::EventStream<EventTargetCreated>,
        mut destroyed: chromiumoxide::listeners::EventStream<EventTargetDestroyed>,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = created.next() => {
                        if event.target_info.r#type != "page" {
                            continue;
                        }
                        let target_id = event.target_info.target_id.clone();
                        match inner.find_page(&target_id).await {
                            Some(page) => {
                                if let Err(e) = Inner::attach_page(&inner, page).await {
                                    tracing::warn!("Failed to attach new page: {}", e);
                                }
                            }
                            None => tracing::debug!("New target {:?} has no page yet", target_id),
                        }
                    }
                    Some(event) = destroyed.next() => {
                        let key = event.target_id.inner().clone();
                        if let Some((_, context)) = inner.targets.remove(&key) {
                            inner.pages.remove(&context);
                            tracing::info!("Tab {} closed", context.tab_id);
                            let _ = inner.events.send(HostEvent::TabRemoved { context });
                        }
                    }
                    else => break,
                }
            }
            tracing::debug!("Target watcher stopped");
        });
    }

    async fn find_page(&self, target_id: &TargetId) -> Option<Page> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref()?;
        browser
            .pages()
            .await
            .ok()?
            .into_iter()
            .find(|p| p.target_id() == target_id)
    }

    /// Register a page target as a browsing context. Idempotent per target:
    /// the first caller installs capture and announces the context.
    async fn attach_page(inner: &Arc<Inner>, page: Page) -> Result<ContextId> {
        let key = page.target_id().inner().clone();
        if let Some(existing) = inner.targets.get(&key) {
            return Ok(*existing);
        }

        let window = page
            .execute(GetWindowForTargetParams {
                target_id: Some(page.target_id().clone()),
            })
            .await
            .map_err(|e| anyhow!("Failed to look up window: {}", e))?;
        let window_id = *window.result.window_id.inner();

        let context = match inner.targets.entry(key) {
            Entry::Occupied(existing) => return Ok(*existing.get()),
            Entry::Vacant(slot) => {
                let context = ContextId::new(inner.next_tab_id.fetch_add(1, Ordering::SeqCst), window_id);
                slot.insert(context);
                context
            }
        };
        inner.pages.insert(context, page.clone());

        let url = page.url().await.ok().flatten().unwrap_or_default();
        let announce = if inner.windows.insert(window_id) {
            HostEvent::WindowCreated { context, url: url.clone() }
        } else {
            HostEvent::TabCreated { context, url: url.clone() }
        };
        let _ = inner.events.send(announce);

        let bindings = recorder::install(&page).await?;
        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE);
        recorder::spawn_capture_listener(page.clone(), bindings, tx);
        Inner::spawn_navigation_watcher(Arc::clone(inner), context, page.clone()).await?;

        let _ = inner.events.send(HostEvent::DocumentReady(DocumentAttach {
            context,
            url,
            page: Arc::new(CdpPage::new(page)),
            events: rx,
        }));
        tracing::info!("Attached tab {} in window {}", context.tab_id, context.window_id);
        Ok(context)
    }

    async fn spawn_navigation_watcher(inner: Arc<Inner>, context: ContextId, page: Page) -> Result<()> {
        let mut navigations = page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(|e| anyhow!("Failed to listen for navigations: {}", e))?;

        tokio::spawn(async move {
            let mut last_history: Option<(i64, usize)> = None;
            while let Some(event) = navigations.next().await {
                if event.frame.parent_id.is_some() {
                    continue;
                }
                let (transition, history) = classify_navigation(&page, last_history).await;
                last_history = history.or(last_history);
                let _ = inner.events.send(HostEvent::Navigated {
                    context,
                    url: event.frame.url.clone(),
                    transition,
                });
            }
        });
        Ok(())
    }
}

/// Work out how the current history entry was reached. Back/forward moves
/// change the index without growing the history.
async fn classify_navigation(page: &Page, last: Option<(i64, usize)>) -> (Transition, Option<(i64, usize)>) {
    let history = match page.execute(GetNavigationHistoryParams::default()).await {
        Ok(h) => h.result,
        Err(e) => {
            tracing::debug!("Navigation history unavailable: {}", e);
            return (Transition::Other, None);
        }
    };
    let current = (history.current_index, history.entries.len());

    if let Some((index, len)) = last {
        if len == current.1 && index != current.0 {
            return (Transition::BackForward, Some(current));
        }
    }

    let typed = history
        .entries
        .get(history.current_index as usize)
        .map(|entry| matches!(entry.transition_type, TransitionType::Typed | TransitionType::AutoBookmark))
        .unwrap_or(false);

    let transition = if typed { Transition::Typed } else { Transition::Other };
    (transition, Some(current))
}

#[async_trait]
impl ContextHost for BrowserManager {
    async fn open_window(&self, url: &str) -> Result<ContextId> {
        self.create_page(url, true).await
    }

    async fn open_tab(&self, _window_id: i64, url: &str) -> Result<ContextId> {
        // CDP opens tabs in the most recently focused window
        self.create_page(url, false).await
    }

    async fn navigate(&self, context: ContextId, url: &str) -> Result<()> {
        self.page(context)?
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        Ok(())
    }

    async fn close(&self, context: ContextId) -> Result<()> {
        let page = self.page(context)?;
        page.close()
            .await
            .map_err(|e| anyhow!("Failed to close tab {}: {}", context.tab_id, e))?;
        Ok(())
    }

    async fn accept_dialog(&self, context: ContextId) -> Result<()> {
        self.page(context)?
            .execute(HandleJavaScriptDialogParams::new(true))
            .await
            .map_err(|e| anyhow!("Failed to accept dialog: {}", e))?;
        Ok(())
    }

    async fn wait_for_load(&self, context: ContextId) -> Result<()> {
        self.page(context)?
            .wait_for_navigation()
            .await
            .map_err(|e| anyhow!("Failed waiting for load: {}", e))?;
        Ok(())
    }
}
