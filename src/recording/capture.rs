//! Turns raw DOM events into a minimal, de-duplicated list of records.

use crate::browser::dom::{Document, NodeId};
use crate::browser::fingerprint::{self, fingerprint};
use crate::models::{EventKind, RecordDraft};

use super::selection::extraction_target;

/// `<input>` types that behave like buttons rather than text fields
const BUTTON_LIKE_INPUTS: &[&str] = &["button", "submit", "reset", "image", "checkbox", "radio"];

/// One DOM event as observed in a document. Node ids refer to the snapshot
/// the event is delivered with.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Click { target: NodeId },
    /// `change` on a `<select>`
    Change { target: NodeId, selected_text: String },
    KeyDown { target: NodeId, key: String },
    /// Mouse released with `selected_text` selected under `ancestor`
    MouseUp { ancestor: NodeId, selected_text: String },
    Focus { target: NodeId },
    Input { target: NodeId },
    Blur { target: NodeId },
    /// The document is going away; `value` is the focused field's value
    Unload { value: Option<String> },
}

/// What the document agent should do with the log
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureAction {
    Append(RecordDraft),
    /// Replace the value of the `input` record appended last for the same
    /// field. The draft carries the field and its final value.
    Amend(RecordDraft),
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Clicks on elements with any of these classes are ignored
    pub exclude_classes: Vec<String>,
    /// Fingerprint of the element that opens the secure keypad
    pub secure_trigger: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            exclude_classes: vec!["kpd-data".to_string()],
            secure_trigger: "id=certselect_tek_input1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Inactive,
    Active,
}

#[derive(Debug, Clone)]
struct FocusTracking {
    fingerprint: String,
    baseline: String,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct Emitted {
    kind: EventKind,
    fingerprint: String,
    by_click: bool,
}

enum ClickClass {
    Clickable,
    Inputable,
}

/// Capture state machine for one document
#[derive(Debug)]
pub struct CaptureMachine {
    config: CaptureConfig,
    state: CaptureState,
    focus: Option<FocusTracking>,
    last: Option<Emitted>,
}

impl CaptureMachine {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            state: CaptureState::Inactive,
            focus: None,
            last: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CaptureState::Active
    }

    pub fn activate(&mut self) {
        self.state = CaptureState::Active;
    }

    pub fn deactivate(&mut self) {
        self.state = CaptureState::Inactive;
        self.focus = None;
        self.last = None;
    }

    /// Drop the memory of the last emitted record, for when it never
    /// reached the log. Later edits of that field are appended anew.
    pub fn forget_last(&mut self) {
        self.last = None;
    }

    /// Feed one event; returns the log actions it produces, in order
    pub fn handle(&mut self, doc: &Document, event: RawEvent) -> Vec<CaptureAction> {
        if !self.is_active() {
            return Vec::new();
        }

        match event {
            RawEvent::Click { target } => self.on_click(doc, target).into_iter().collect(),
            RawEvent::Change { target, selected_text } => {
                if doc.tag(target) != "select" {
                    return Vec::new();
                }
                let fp = fingerprint(doc, target);
                vec![self.append(
                    RecordDraft::element(EventKind::SelectOption, fp, &doc.url).with_value(selected_text),
                    false,
                )]
            }
            RawEvent::KeyDown { target, key } => {
                if key != "Enter" {
                    return Vec::new();
                }
                let mut actions = Vec::new();
                let target_fp = fingerprint(doc, target);
                let current = self.current_value(doc, target, &target_fp);
                if let Some(action) = self.flush(&doc.url, current, true) {
                    actions.push(action);
                }
                actions.push(self.append(
                    RecordDraft::element(EventKind::EnterPress, target_fp, &doc.url),
                    false,
                ));
                actions
            }
            RawEvent::MouseUp { ancestor, selected_text } => {
                match extraction_target(doc, ancestor, &selected_text) {
                    Some(node) => {
                        let fp = fingerprint(doc, node);
                        vec![self.append(
                            RecordDraft::element(EventKind::Extract, fp, &doc.url).with_value(selected_text),
                            false,
                        )]
                    }
                    None => Vec::new(),
                }
            }
            RawEvent::Focus { target } => {
                self.focus = Some(FocusTracking {
                    fingerprint: fingerprint(doc, target),
                    baseline: doc.field_value(target),
                    dirty: false,
                });
                Vec::new()
            }
            RawEvent::Input { .. } => {
                if let Some(focus) = self.focus.as_mut() {
                    focus.dirty = true;
                }
                Vec::new()
            }
            RawEvent::Blur { target } => {
                let target_fp = fingerprint(doc, target);
                let current = self.current_value(doc, target, &target_fp);
                let action = self.flush(&doc.url, current, false);
                self.focus = None;
                action.into_iter().collect()
            }
            RawEvent::Unload { value } => {
                let action = self.flush(&doc.url, value, false);
                self.focus = None;
                action.into_iter().collect()
            }
        }
    }

    fn classify(&self, doc: &Document, target: NodeId) -> Option<ClickClass> {
        let tag = doc.tag(target);
        if tag == "textarea" {
            return Some(ClickClass::Inputable);
        }
        if tag == "input" {
            let input_type = doc.attr(target, "type").unwrap_or("text").to_lowercase();
            if !BUTTON_LIKE_INPUTS.contains(&input_type.as_str()) {
                return Some(ClickClass::Inputable);
            }
        }
        let cursor = doc.node(target).and_then(|n| n.cursor.as_deref());
        if cursor == Some("pointer") || doc.attr(target, "tabindex").is_some() {
            return Some(ClickClass::Clickable);
        }
        if cursor == Some("text") {
            return Some(ClickClass::Inputable);
        }
        None
    }

    fn on_click(&mut self, doc: &Document, target: NodeId) -> Option<CaptureAction> {
        if self
            .config
            .exclude_classes
            .iter()
            .any(|class| doc.has_class(target, class))
        {
            tracing::debug!("Ignoring click on excluded element <{}>", doc.tag(target));
            return None;
        }

        let fp = fingerprint(doc, target);
        if fp == self.config.secure_trigger {
            return Some(self.append(RecordDraft::element(EventKind::InputCert, fp, &doc.url), false));
        }

        let draft = match self.classify(doc, target)? {
            ClickClass::Clickable => RecordDraft::element(EventKind::Click, fp.clone(), &doc.url),
            ClickClass::Inputable => {
                RecordDraft::element(EventKind::Input, fp.clone(), &doc.url).with_value(doc.field_value(target))
            }
        };

        if self.last_is_input_for(&fp) {
            tracing::debug!("Suppressing click on '{}', already recorded as input", fp);
            return None;
        }
        Some(self.append(draft, true))
    }

    fn last_is_input_for(&self, fp: &str) -> bool {
        matches!(&self.last, Some(last) if last.kind == EventKind::Input && last.fingerprint == fp)
    }

    fn append(&mut self, draft: RecordDraft, by_click: bool) -> CaptureAction {
        self.last = Some(Emitted {
            kind: draft.kind,
            fingerprint: draft.target_id.clone(),
            by_click,
        });
        CaptureAction::Append(draft)
    }

    /// Value of the tracked field, read from the event target when it is
    /// the tracked field and located by fingerprint otherwise
    fn current_value(&self, doc: &Document, target: NodeId, target_fp: &str) -> Option<String> {
        let focus = self.focus.as_ref()?;
        if focus.fingerprint == target_fp {
            return Some(doc.field_value(target));
        }
        fingerprint::resolve(doc, &focus.fingerprint)
            .ok()
            .map(|node| doc.field_value(node))
    }

    /// Emit the focused field's final value if it was edited. With `rebase`
    /// tracking continues from the flushed value.
    fn flush(&mut self, url: &str, current: Option<String>, rebase: bool) -> Option<CaptureAction> {
        let focus = self.focus.as_mut()?;
        let current = current?;
        if !focus.dirty || current == focus.baseline {
            return None;
        }
        let fp = focus.fingerprint.clone();
        if rebase {
            focus.baseline = current.clone();
            focus.dirty = false;
        }

        if let Some(last) = &self.last {
            if last.kind == EventKind::Input && last.fingerprint == fp && last.by_click {
                return Some(CaptureAction::Amend(
                    RecordDraft::element(EventKind::Input, fp, url).with_value(current),
                ));
            }
        }
        Some(self.append(RecordDraft::element(EventKind::Input, fp, url).with_value(current), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Page {
        doc: Document,
        go: NodeId,
        amount: NodeId,
        memo: NodeId,
        bank: NodeId,
        key_image: NodeId,
        trigger: NodeId,
        plain: NodeId,
    }

    fn page() -> Page {
        let mut doc = Document::new("https://bank.example/transfer");
        let body = doc.append_element(doc.root(), "body", &[]);
        let go = doc.append_element(body, "button", &[("id", "go")]);
        doc.set_cursor(go, "pointer");
        let amount = doc.append_element(body, "input", &[("name", "amount"), ("type", "text")]);
        let memo = doc.append_element(body, "textarea", &[("id", "memo")]);
        let bank = doc.append_element(body, "select", &[("id", "bank")]);
        let key_image = doc.append_element(body, "img", &[("class", "kpd-data"), ("id", "k1")]);
        doc.set_cursor(key_image, "pointer");
        let trigger = doc.append_element(body, "input", &[("id", "certselect_tek_input1"), ("type", "password")]);
        let plain = doc.append_element(body, "div", &[("id", "plain")]);
        Page { doc, go, amount, memo, bank, key_image, trigger, plain }
    }

    fn active() -> CaptureMachine {
        let mut machine = CaptureMachine::new(CaptureConfig::default());
        machine.activate();
        machine
    }

    fn appended(actions: &[CaptureAction]) -> Vec<(EventKind, String, Option<String>)> {
        actions
            .iter()
            .filter_map(|a| match a {
                CaptureAction::Append(d) => Some((d.kind, d.target_id.clone(), d.input_value.clone())),
                CaptureAction::Amend(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_click_recorded_across_reactivation() {
        let p = page();
        let mut machine = active();

        let actions = machine.handle(&p.doc, RawEvent::Click { target: p.go });
        assert_eq!(appended(&actions), vec![(EventKind::Click, "id=go".to_string(), None)]);
        if let CaptureAction::Append(draft) = &actions[0] {
            assert_eq!(draft.url, "https://bank.example/transfer");
        }

        machine.deactivate();
        assert!(machine.handle(&p.doc, RawEvent::Click { target: p.go }).is_empty());
        machine.activate();
        let actions = machine.handle(&p.doc, RawEvent::Click { target: p.go });
        assert_eq!(appended(&actions).len(), 1);
    }

    #[test]
    fn test_unchanged_focus_blur_records_nothing() {
        let p = page();
        let mut machine = active();
        assert!(machine.handle(&p.doc, RawEvent::Focus { target: p.memo }).is_empty());
        assert!(machine.handle(&p.doc, RawEvent::Input { target: p.memo }).is_empty());
        // typed and deleted: dirty but equal to the baseline
        assert!(machine.handle(&p.doc, RawEvent::Blur { target: p.memo }).is_empty());
    }

    #[test]
    fn test_click_then_typing_amends_single_record() {
        let mut p = page();
        let mut machine = active();

        machine.handle(&p.doc, RawEvent::Focus { target: p.amount });
        let actions = machine.handle(&p.doc, RawEvent::Click { target: p.amount });
        assert_eq!(
            appended(&actions),
            vec![(EventKind::Input, "name=amount".to_string(), Some(String::new()))]
        );

        p.doc.set_value(p.amount, "5000");
        machine.handle(&p.doc, RawEvent::Input { target: p.amount });
        // a second click into the same field is not recorded again
        assert!(machine.handle(&p.doc, RawEvent::Click { target: p.amount }).is_empty());

        let actions = machine.handle(&p.doc, RawEvent::Blur { target: p.amount });
        assert_eq!(
            actions,
            vec![CaptureAction::Amend(
                RecordDraft::element(EventKind::Input, "name=amount", "https://bank.example/transfer")
                    .with_value("5000")
            )]
        );
    }

    #[test]
    fn test_forgotten_input_is_appended_on_blur() {
        let mut p = page();
        let mut machine = active();

        machine.handle(&p.doc, RawEvent::Focus { target: p.amount });
        machine.handle(&p.doc, RawEvent::Click { target: p.amount });
        // the click's record never made it into the log
        machine.forget_last();

        p.doc.set_value(p.amount, "5000");
        machine.handle(&p.doc, RawEvent::Input { target: p.amount });
        let actions = machine.handle(&p.doc, RawEvent::Blur { target: p.amount });
        assert_eq!(
            appended(&actions),
            vec![(EventKind::Input, "name=amount".to_string(), Some("5000".to_string()))]
        );
    }

    #[test]
    fn test_keyboard_focus_appends_on_blur() {
        let mut p = page();
        let mut machine = active();

        machine.handle(&p.doc, RawEvent::Focus { target: p.memo });
        p.doc.set_value(p.memo, "rent");
        machine.handle(&p.doc, RawEvent::Input { target: p.memo });
        let actions = machine.handle(&p.doc, RawEvent::Blur { target: p.memo });
        assert_eq!(
            appended(&actions),
            vec![(EventKind::Input, "id=memo".to_string(), Some("rent".to_string()))]
        );
    }

    #[test]
    fn test_enter_flushes_field_first() {
        let mut p = page();
        let mut machine = active();

        machine.handle(&p.doc, RawEvent::Focus { target: p.memo });
        p.doc.set_value(p.memo, "hello");
        machine.handle(&p.doc, RawEvent::Input { target: p.memo });
        let actions = machine.handle(
            &p.doc,
            RawEvent::KeyDown { target: p.memo, key: "Enter".to_string() },
        );
        assert_eq!(
            appended(&actions),
            vec![
                (EventKind::Input, "id=memo".to_string(), Some("hello".to_string())),
                (EventKind::EnterPress, "id=memo".to_string(), None),
            ]
        );

        // baseline was rebased, so blurring without further edits adds nothing
        assert!(machine.handle(&p.doc, RawEvent::Blur { target: p.memo }).is_empty());
        assert!(machine
            .handle(&p.doc, RawEvent::KeyDown { target: p.memo, key: "a".to_string() })
            .is_empty());
    }

    #[test]
    fn test_excluded_and_secure_targets() {
        let p = page();
        let mut machine = active();
        assert!(machine.handle(&p.doc, RawEvent::Click { target: p.key_image }).is_empty());

        let actions = machine.handle(&p.doc, RawEvent::Click { target: p.trigger });
        assert_eq!(
            appended(&actions),
            vec![(EventKind::InputCert, "id=certselect_tek_input1".to_string(), None)]
        );
    }

    #[test]
    fn test_click_classification() {
        let mut p = page();
        let mut machine = active();
        assert!(machine.handle(&p.doc, RawEvent::Click { target: p.plain }).is_empty());

        p.doc.set_attr(p.plain, "tabindex", "0");
        let actions = machine.handle(&p.doc, RawEvent::Click { target: p.plain });
        assert_eq!(appended(&actions)[0].0, EventKind::Click);

        p.doc.remove_attr(p.plain, "tabindex");
        p.doc.set_cursor(p.plain, "text");
        let actions = machine.handle(&p.doc, RawEvent::Click { target: p.plain });
        assert_eq!(appended(&actions)[0].0, EventKind::Input);
    }

    #[test]
    fn test_select_change_and_unload() {
        let mut p = page();
        let mut machine = active();

        let actions = machine.handle(
            &p.doc,
            RawEvent::Change { target: p.bank, selected_text: "Seoul".to_string() },
        );
        assert_eq!(
            appended(&actions),
            vec![(EventKind::SelectOption, "id=bank".to_string(), Some("Seoul".to_string()))]
        );

        machine.handle(&p.doc, RawEvent::Focus { target: p.memo });
        p.doc.set_value(p.memo, "draft");
        machine.handle(&p.doc, RawEvent::Input { target: p.memo });
        let actions = machine.handle(&p.doc, RawEvent::Unload { value: Some("draft".to_string()) });
        assert_eq!(
            appended(&actions),
            vec![(EventKind::Input, "id=memo".to_string(), Some("draft".to_string()))]
        );
    }

    #[test]
    fn test_inactive_machine_ignores_events() {
        let p = page();
        let mut machine = CaptureMachine::new(CaptureConfig::default());
        assert_eq!(machine.state(), CaptureState::Inactive);
        assert!(machine.handle(&p.doc, RawEvent::Click { target: p.go }).is_empty());
    }
}
