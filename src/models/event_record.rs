use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target id used by records that do not point at an element
pub const NO_TARGET: &str = "N/A";

/// Kind of a captured interaction or browsing-context lifecycle change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Click,
    Input,
    SelectOption,
    EnterPress,
    Extract,
    InputCert,
    NavigationUrl,
    NavigationBackForward,
    TabCreated,
    TabRemoved,
    WindowCreated,
    WindowRemoved,
    AcceptPopup,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Input => "input",
            EventKind::SelectOption => "select-option",
            EventKind::EnterPress => "enter-press",
            EventKind::Extract => "extract",
            EventKind::InputCert => "input-cert",
            EventKind::NavigationUrl => "navigation-url",
            EventKind::NavigationBackForward => "navigation-back-forward",
            EventKind::TabCreated => "tab-created",
            EventKind::TabRemoved => "tab-removed",
            EventKind::WindowCreated => "window-created",
            EventKind::WindowRemoved => "window-removed",
            EventKind::AcceptPopup => "accept-popup",
        }
    }

    /// Lifecycle kinds carry the `N/A` target and are executed by the
    /// orchestrator rather than by a document agent.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::NavigationUrl
                | EventKind::NavigationBackForward
                | EventKind::TabCreated
                | EventKind::TabRemoved
                | EventKind::WindowCreated
                | EventKind::WindowRemoved
                | EventKind::AcceptPopup
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(EventKind::Click),
            "input" => Ok(EventKind::Input),
            "select-option" => Ok(EventKind::SelectOption),
            "enter-press" => Ok(EventKind::EnterPress),
            "extract" => Ok(EventKind::Extract),
            "input-cert" => Ok(EventKind::InputCert),
            "navigation-url" => Ok(EventKind::NavigationUrl),
            "navigation-back-forward" => Ok(EventKind::NavigationBackForward),
            "tab-created" => Ok(EventKind::TabCreated),
            "tab-removed" => Ok(EventKind::TabRemoved),
            "window-created" => Ok(EventKind::WindowCreated),
            "window-removed" => Ok(EventKind::WindowRemoved),
            "accept-popup" => Ok(EventKind::AcceptPopup),
            _ => Err(()),
        }
    }
}

/// Replay outcome of a record within the current pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    #[default]
    Pending,
    Succeeded,
    Errored,
}

impl ReplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayStatus::Pending => "pending",
            ReplayStatus::Succeeded => "succeeded",
            ReplayStatus::Errored => "errored",
        }
    }
}

impl FromStr for ReplayStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReplayStatus::Pending),
            "succeeded" => Ok(ReplayStatus::Succeeded),
            "errored" => Ok(ReplayStatus::Errored),
            _ => Err(()),
        }
    }
}

/// Final outcome written by `mark_replayed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    Succeeded,
    Errored,
}

impl From<ReplayOutcome> for ReplayStatus {
    fn from(outcome: ReplayOutcome) -> Self {
        match outcome {
            ReplayOutcome::Succeeded => ReplayStatus::Succeeded,
            ReplayOutcome::Errored => ReplayStatus::Errored,
        }
    }
}

/// Tab/window pair identifying one browsing context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextId {
    pub tab_id: i64,
    pub window_id: i64,
}

impl ContextId {
    pub fn new(tab_id: i64, window_id: i64) -> Self {
        Self { tab_id, window_id }
    }
}

/// One entry of the replayable action log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub target_id: String,
    pub url: String,
    pub tab_id: i64,
    pub window_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    #[serde(default)]
    pub replayed: ReplayStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn context(&self) -> ContextId {
        ContextId::new(self.tab_id, self.window_id)
    }

    pub fn value(&self) -> &str {
        self.input_value.as_deref().unwrap_or("")
    }
}

/// A record as produced by capture, before the log assigns a uid
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub kind: EventKind,
    pub target_id: String,
    pub url: String,
    pub input_value: Option<String>,
    pub context: ContextId,
}

impl RecordDraft {
    pub fn element(kind: EventKind, target_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            target_id: target_id.into(),
            url: url.into(),
            input_value: None,
            context: ContextId::default(),
        }
    }

    pub fn lifecycle(kind: EventKind, url: impl Into<String>, context: ContextId) -> Self {
        Self {
            kind,
            target_id: NO_TARGET.to_string(),
            url: url.into(),
            input_value: None,
            context,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.input_value = Some(value.into());
        self
    }

    pub fn with_context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    /// Turn the draft into a pending record with the given uid
    pub fn into_record(self, uid: String) -> EventRecord {
        EventRecord {
            uid,
            kind: self.kind,
            target_id: self.target_id,
            url: self.url,
            tab_id: self.context.tab_id,
            window_id: self.context.window_id,
            input_value: self.input_value,
            replayed: ReplayStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_format() {
        let record = RecordDraft::element(EventKind::SelectOption, "id=bank", "https://example.com")
            .with_value("Seoul")
            .with_context(ContextId::new(7, 3))
            .into_record("u1".to_string());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "select-option");
        assert_eq!(json["targetId"], "id=bank");
        assert_eq!(json["tabId"], 7);
        assert_eq!(json["windowId"], 3);
        assert_eq!(json["inputValue"], "Seoul");
        assert_eq!(json["replayed"], "pending");
    }

    #[test]
    fn test_lifecycle_kinds() {
        assert!(EventKind::WindowCreated.is_lifecycle());
        assert!(EventKind::AcceptPopup.is_lifecycle());
        assert!(!EventKind::InputCert.is_lifecycle());
        assert_eq!(
            RecordDraft::lifecycle(EventKind::TabRemoved, "N/A", ContextId::new(1, 1)).target_id,
            NO_TARGET
        );
    }

    #[test]
    fn test_kind_str_round_trip() {
        for kind in [EventKind::Click, EventKind::NavigationBackForward, EventKind::InputCert] {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("hover".parse::<EventKind>().is_err());
    }
}
