use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::dom::GetDocumentParams;
use chromiumoxide::cdp::browser_protocol::dom_snapshot::CaptureSnapshotParams;
use chromiumoxide::Page;
use std::time::Duration;
use tokio::time::timeout;

use super::RawCDPTrees;

const CDP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch the DOM tree and the computed-cursor snapshot in parallel
pub async fn extract_trees(page: &Page) -> Result<RawCDPTrees> {
    let (dom_result, snapshot_result, url_result) =
        tokio::join!(get_dom_tree(page), get_dom_snapshot(page), page.url());

    // DOM tree is required
    let dom = dom_result?;

    // Without the snapshot every cursor is unknown; classification falls
    // back to tags and attributes
    let snapshot = match snapshot_result {
        Ok(s) => Some(serde_json::to_value(&s)?),
        Err(e) => {
            tracing::debug!("DOM snapshot unavailable: {}", e);
            None
        }
    };

    Ok(RawCDPTrees {
        dom_root: serde_json::to_value(&dom.root)?,
        snapshot,
        url: url_result.ok().flatten().unwrap_or_default(),
    })
}

/// Get full DOM tree with shadow DOM piercing
async fn get_dom_tree(page: &Page) -> Result<chromiumoxide::cdp::browser_protocol::dom::GetDocumentReturns> {
    let params = GetDocumentParams {
        depth: Some(-1),
        pierce: Some(true),
    };

    let result = timeout(CDP_TIMEOUT, page.execute(params))
        .await
        .map_err(|_| anyhow!("DOM.getDocument timeout"))?
        .map_err(|e| anyhow!("DOM.getDocument failed: {}", e))?;

    Ok(result.result)
}

/// Capture a DOM snapshot carrying the computed `cursor` of every laid-out node
async fn get_dom_snapshot(page: &Page) -> Result<chromiumoxide::cdp::browser_protocol::dom_snapshot::CaptureSnapshotReturns> {
    let params = CaptureSnapshotParams {
        computed_styles: vec!["cursor".to_string()],
        include_paint_order: None,
        include_dom_rects: None,
        include_blended_background_colors: None,
        include_text_color_opacities: None,
    };

    let result = timeout(CDP_TIMEOUT, page.execute(params))
        .await
        .map_err(|_| anyhow!("DOMSnapshot.captureSnapshot timeout"))?
        .map_err(|e| anyhow!("DOMSnapshot.captureSnapshot failed: {}", e))?;

    Ok(result.result)
}
