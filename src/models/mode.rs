use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operating mode shared by the orchestrator and every document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Recording,
    #[default]
    Stopped,
    Replaying,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Recording => "recording",
            Mode::Stopped => "stopped",
            Mode::Replaying => "replaying",
        }
    }

    pub fn is_recording(&self) -> bool {
        *self == Mode::Recording
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recording" | "record" => Ok(Mode::Recording),
            "stopped" | "stop" => Ok(Mode::Stopped),
            "replaying" | "replay" => Ok(Mode::Replaying),
            _ => Err(()),
        }
    }
}
