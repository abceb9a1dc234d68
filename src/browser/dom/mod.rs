mod builder;
mod extractor;
pub mod selector;
pub mod types;

use anyhow::Result;
use chromiumoxide::Page;

pub use builder::build_document;
pub use selector::{query_selector_all, unique_selector, Selector};
pub use types::{BackendNodeId, Document, DomNode, NodeId, NodeKind};

/// Raw CDP response data before processing
#[derive(Debug)]
pub struct RawCDPTrees {
    pub dom_root: serde_json::Value,
    pub snapshot: Option<serde_json::Value>,
    pub url: String,
}

/// Snapshot a live page into a [`Document`]
pub async fn snapshot_document(page: &Page) -> Result<Document> {
    let raw = extractor::extract_trees(page).await?;
    Ok(builder::build_document(raw))
}
