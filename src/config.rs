use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::coordinator::{AgentConfig, OrchestratorConfig};
use crate::keypad::KeypadConfig;
use crate::recording::CaptureConfig;
use crate::replay::ReplayConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// SQLite file holding the event log, mode and template data
    pub db_path: PathBuf,
    pub headless: bool,
    pub settle: Duration,
    pub keypad_settle: Duration,
    pub load_timeout: Duration,
    pub rpc_timeout: Duration,
    pub keypad_container: String,
    pub secure_trigger: String,
    pub exclude_classes: Vec<String>,
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(var_or(name, default))
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Standard data directory location, next to other per-user app data
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.formtrace.app")
        .join("formtrace.db")
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: var_or("PORT", defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            db_path: env::var("FORMTRACE_DB").map(PathBuf::from).unwrap_or(defaults.db_path),
            headless: flag("FORMTRACE_HEADLESS"),
            settle: millis("FORMTRACE_SETTLE_MS", 1000),
            keypad_settle: millis("FORMTRACE_KEYPAD_SETTLE_MS", 300),
            load_timeout: millis("FORMTRACE_LOAD_TIMEOUT_MS", 30_000),
            rpc_timeout: millis("FORMTRACE_RPC_TIMEOUT_MS", 60_000),
            keypad_container: env::var("FORMTRACE_KEYPAD_CONTAINER").unwrap_or(defaults.keypad_container),
            secure_trigger: env::var("FORMTRACE_SECURE_TRIGGER").unwrap_or(defaults.secure_trigger),
            exclude_classes: env::var("FORMTRACE_EXCLUDE_CLASSES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.exclude_classes),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            agent: AgentConfig {
                capture: CaptureConfig {
                    exclude_classes: self.exclude_classes.clone(),
                    secure_trigger: self.secure_trigger.clone(),
                },
                keypad: KeypadConfig {
                    container: self.keypad_container.clone(),
                    settle: self.keypad_settle,
                },
                rpc_timeout: self.rpc_timeout,
            },
            replay: ReplayConfig {
                settle: self.settle,
                load_timeout: self.load_timeout,
                rpc_timeout: self.rpc_timeout,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        let keypad = KeypadConfig::default();
        let replay = ReplayConfig::default();
        Self {
            port: 8765,
            host: "127.0.0.1".to_string(),
            db_path: default_db_path(),
            headless: false,
            settle: replay.settle,
            keypad_settle: keypad.settle,
            load_timeout: replay.load_timeout,
            rpc_timeout: replay.rpc_timeout,
            keypad_container: keypad.container,
            secure_trigger: capture.secure_trigger,
            exclude_classes: capture.exclude_classes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_flow_into_components() {
        let config = Config::default();
        assert_eq!(config.port, 8765);
        let orchestrator = config.orchestrator();
        assert_eq!(orchestrator.replay.settle, Duration::from_millis(1000));
        assert_eq!(orchestrator.agent.keypad.settle, Duration::from_millis(300));
        assert_eq!(orchestrator.agent.rpc_timeout, Duration::from_secs(60));
        assert_eq!(orchestrator.agent.capture.exclude_classes, vec!["kpd-data".to_string()]);
        assert!(config.db_path.ends_with("com.formtrace.app/formtrace.db"));
    }
}
