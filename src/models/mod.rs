pub mod event_record;
pub mod mode;
pub mod requests;
pub mod responses;

use std::collections::BTreeMap;

pub use event_record::*;
pub use mode::*;
pub use requests::*;
pub use responses::*;

/// Placeholder key to substitution, read-only during a replay pass
pub type TemplateDataMap = BTreeMap<String, String>;
