//! Message passing between the orchestrator and the per-document agents.

pub mod agent;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod rpc;

pub use agent::{AgentConfig, DocumentAgent};
pub use orchestrator::{is_internal_url, Orchestrator, OrchestratorConfig};
pub use protocol::{
    DocumentClient, DocumentCommand, DocumentResponse, OrchestratorClient, OrchestratorLink, OrchestratorRequest,
    OrchestratorResponse, ReplayEventResult, Routed,
};
pub use registry::DocumentRegistry;
pub use rpc::{RpcClient, RpcError};
