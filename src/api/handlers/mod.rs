pub mod events;
pub mod health;
pub mod mode;
pub mod replay;
pub mod templates;
pub mod windows;
