pub mod actions;
pub mod engine;
pub mod error;
pub mod template;

pub use engine::{
    EngineState, RecordOutcome, ReplayConfig, ReplayEngine, ReplayEnv, ReplayProgress, ReplayReport,
};
pub use error::ReplayError;
pub use template::{substitute, Substitution};
