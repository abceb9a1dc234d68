use std::time::Duration;

use crate::browser::fingerprint::ResolveError;
use crate::coordinator::rpc::RpcError;
use crate::keypad::KeypadError;
use crate::models::EventKind;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("target not found: {0}")]
    Resolution(#[from] ResolveError),

    #[error("action failed: {0}")]
    Action(String),

    #[error("context did not load within {0:?}")]
    ContextLoadTimeout(Duration),

    #[error("document did not answer: {0}")]
    Rpc(#[from] RpcError),

    #[error("no browsing context to replay {0} in")]
    NoTarget(EventKind),

    #[error("a replay pass is already running")]
    AlreadyRunning,
}

impl ReplayError {
    /// Fatal errors end the pass; everything else only fails the record
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplayError::ContextLoadTimeout(_))
    }
}

impl From<KeypadError> for ReplayError {
    fn from(err: KeypadError) -> Self {
        match err {
            KeypadError::Trigger(e) => ReplayError::Resolution(e),
            other => ReplayError::Action(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ReplayError {
    fn from(err: anyhow::Error) -> Self {
        ReplayError::Action(err.to_string())
    }
}
