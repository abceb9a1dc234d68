use anyhow::Result;
use async_trait::async_trait;

use super::dom::{Document, NodeId};

/// Attribute that scopes a replayed action to the element it was resolved to
pub const REPLAY_MARKER_ATTR: &str = "data-formtrace-replay";

/// Operations the capture and replay code needs from one browsing context.
///
/// Element arguments refer to nodes of a snapshot previously returned by
/// [`PageDriver::snapshot`].
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Current DOM of the context
    async fn snapshot(&self) -> Result<Document>;

    /// Mark the element, dispatch a click scoped to the mark, remove the mark
    async fn click(&self, doc: &Document, node: NodeId, marker: &str) -> Result<()>;

    /// Set a field's value and notify the page as typing would
    async fn set_value(&self, doc: &Document, node: NodeId, value: &str) -> Result<()>;

    /// Select the option whose visible text equals `option_text`
    async fn select_option(&self, doc: &Document, node: NodeId, option_text: &str) -> Result<()>;

    /// Press Enter on the element
    async fn press_enter(&self, doc: &Document, node: NodeId) -> Result<()>;

    /// Attach or detach the page-side capture listeners
    async fn set_tracking(&self, enabled: bool) -> Result<()>;
}
