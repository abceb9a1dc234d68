pub mod capture;
pub mod recorder;
pub mod script;
pub mod selection;

pub use capture::{CaptureAction, CaptureConfig, CaptureMachine, CaptureState, RawEvent};
pub use recorder::CapturedEvent;
