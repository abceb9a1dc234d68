pub mod cdp_page;
pub mod dom;
pub mod fingerprint;
pub mod host;
pub mod manager;
pub mod memory;
pub mod page;

pub use cdp_page::CdpPage;
pub use dom::{Document, NodeId};
pub use host::{ContextHost, DocumentAttach, HostEvent, HostEvents, Transition};
pub use manager::BrowserManager;
pub use memory::{MemoryHost, MemoryPage, PageAction};
pub use page::PageDriver;
