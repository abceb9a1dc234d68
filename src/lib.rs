//! Records user interactions with web forms and replays them against fresh
//! page loads, image-based secure keypads included.

pub mod api;
pub mod browser;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_log;
pub mod keypad;
pub mod models;
pub mod recording;
pub mod replay;
