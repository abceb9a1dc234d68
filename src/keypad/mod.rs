//! Driving sequence for the image-based secure keypad.

pub mod driver;
pub mod layout;
pub mod locator;
pub mod plan;

pub use driver::{enter_password, KeypadConfig, KeypadError};
pub use plan::{plan_key_sequence, KeySequenceStep, KeyToken, Layout};
