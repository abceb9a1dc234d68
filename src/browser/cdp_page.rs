use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::{NodeId as CdpNodeId, RemoveAttributeParams, SetAttributeValueParams};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, RemoveScriptToEvaluateOnNewDocumentParams, ScriptIdentifier,
};
use chromiumoxide::Page;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::dom::{self, Document, NodeId};
use super::page::{PageDriver, REPLAY_MARKER_ATTR};
use crate::recording::script::tracking_script;

const CDP_TIMEOUT: Duration = Duration::from_secs(10);

/// [`PageDriver`] for a live Chrome page
#[derive(Clone)]
pub struct CdpPage {
    page: Page,
    /// New-document script carrying the current tracking mode
    mode_script: Arc<Mutex<Option<ScriptIdentifier>>>,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            mode_script: Arc::new(Mutex::new(None)),
        }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    fn cdp_node(doc: &Document, node: NodeId) -> Result<CdpNodeId> {
        match doc.node(node).map(|n| n.cdp_node_id) {
            Some(id) if id != 0 => Ok(CdpNodeId::new(id)),
            _ => Err(anyhow!("node {} has no CDP id", node)),
        }
    }

    /// Put the marker attribute on the element, run `body` against the
    /// element selected by it, then take the marker off again. `body` sees
    /// the element as `el` and returns nothing; the script returns false
    /// when no element carries the marker.
    async fn with_marker(&self, doc: &Document, node: NodeId, marker: &str, body: &str) -> Result<()> {
        let cdp_node = Self::cdp_node(doc, node)?;

        timeout(
            CDP_TIMEOUT,
            self.page
                .execute(SetAttributeValueParams::new(cdp_node.clone(), REPLAY_MARKER_ATTR, marker)),
        )
        .await
        .map_err(|_| anyhow!("Timed out marking element"))?
        .map_err(|e| anyhow!("Failed to mark element: {}", e))?;

        let selector = format!("[{}=\"{}\"]", REPLAY_MARKER_ATTR, marker);
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; {} return true; }})()",
            serde_json::to_string(&selector)?,
            body
        );
        let result = timeout(CDP_TIMEOUT, self.page.evaluate(script)).await;

        // the action may have navigated or replaced the node
        let _ = timeout(
            CDP_TIMEOUT,
            self.page.execute(RemoveAttributeParams::new(cdp_node, REPLAY_MARKER_ATTR)),
        )
        .await;

        let found: bool = result
            .map_err(|_| anyhow!("Timed out dispatching to element"))?
            .map_err(|e| anyhow!("Failed to dispatch to element: {}", e))?
            .into_value()
            .map_err(|e| anyhow!("Failed to parse script result: {}", e))?;

        if found {
            Ok(())
        } else {
            Err(anyhow!("Element was replaced before the action"))
        }
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType) -> Result<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13);
        if kind == DispatchKeyEventType::KeyDown {
            builder = builder.text("\r");
        }
        let params = builder
            .build()
            .map_err(|e| anyhow!("Failed to build key event: {}", e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| anyhow!("Failed to dispatch key event: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn snapshot(&self) -> Result<Document> {
        dom::snapshot_document(&self.page).await
    }

    async fn click(&self, doc: &Document, node: NodeId, marker: &str) -> Result<()> {
        self.with_marker(doc, node, marker, "el.click();").await
    }

    async fn set_value(&self, doc: &Document, node: NodeId, value: &str) -> Result<()> {
        let body = format!(
            "el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));",
            serde_json::to_string(value)?
        );
        let marker = uuid::Uuid::new_v4().to_string();
        self.with_marker(doc, node, &marker, &body).await
    }

    async fn select_option(&self, doc: &Document, node: NodeId, option_text: &str) -> Result<()> {
        if doc.find_option(node, option_text).is_none() {
            return Err(anyhow!("no option with text '{}'", option_text));
        }

        let body = format!(
            "const text = {}; \
             const index = Array.from(el.options).findIndex(o => o.text.trim() === text); \
             if (index < 0) return false; \
             el.selectedIndex = index; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));",
            serde_json::to_string(option_text)?
        );
        let marker = uuid::Uuid::new_v4().to_string();
        self.with_marker(doc, node, &marker, &body).await
    }

    async fn press_enter(&self, doc: &Document, node: NodeId) -> Result<()> {
        let marker = uuid::Uuid::new_v4().to_string();
        self.with_marker(doc, node, &marker, "el.focus();").await?;
        self.dispatch_key(DispatchKeyEventType::KeyDown).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp).await
    }

    async fn set_tracking(&self, enabled: bool) -> Result<()> {
        let script = tracking_script(enabled);
        timeout(CDP_TIMEOUT, self.page.evaluate(script.clone()))
            .await
            .map_err(|_| anyhow!("Timed out toggling capture"))?
            .map_err(|e| anyhow!("Failed to toggle capture: {}", e))?;

        // documents loaded later start in the same mode
        let mut registered = self.mode_script.lock().await;
        let added = timeout(
            CDP_TIMEOUT,
            self.page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script)),
        )
        .await
        .map_err(|_| anyhow!("Timed out registering capture mode"))?
        .map_err(|e| anyhow!("Failed to register capture mode: {}", e))?;
        if let Some(previous) = registered.replace(added.result.identifier.clone()) {
            if let Err(e) = self
                .page
                .execute(RemoveScriptToEvaluateOnNewDocumentParams::new(previous))
                .await
            {
                tracing::debug!("Could not drop previous capture mode script: {}", e);
            }
        }
        Ok(())
    }
}
