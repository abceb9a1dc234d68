//! Shared setup: an orchestrator over in-memory pages.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use formtrace::browser::dom::Document;
use formtrace::browser::MemoryHost;
use formtrace::coordinator::{AgentConfig, Orchestrator, OrchestratorConfig};
use formtrace::event_log::{EventLog, MemoryLogStore};
use formtrace::keypad::KeypadConfig;
use formtrace::replay::ReplayConfig;

pub const TRANSFER_URL: &str = "https://bank.example/transfer";

pub struct Harness {
    pub host: Arc<MemoryHost>,
    pub store: Arc<MemoryLogStore>,
    pub log: EventLog,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn fast_config(load_timeout: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        agent: AgentConfig {
            keypad: KeypadConfig {
                settle: Duration::from_millis(1),
                ..KeypadConfig::default()
            },
            rpc_timeout: Duration::from_secs(2),
            ..AgentConfig::default()
        },
        replay: ReplayConfig {
            settle: Duration::from_millis(1),
            load_timeout,
            rpc_timeout: Duration::from_secs(2),
        },
    }
}

pub fn start(config: OrchestratorConfig) -> Harness {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let host = Arc::new(MemoryHost::new(events_tx));
    host.add_page(TRANSFER_URL, transfer_page());

    let store = Arc::new(MemoryLogStore::new());
    let log = EventLog::spawn(store.clone());
    let orchestrator = Orchestrator::start(host.clone(), events_rx, log.clone(), store.clone(), config);
    Harness {
        host,
        store,
        log,
        orchestrator,
    }
}

/// Transfer form: amount field, bank select, pay button, total, and the
/// keypad-protected certificate password field
pub fn transfer_page() -> Document {
    let mut doc = Document::new(TRANSFER_URL);
    let html = doc.append_element(doc.root(), "html", &[]);
    let body = doc.append_element(html, "body", &[]);
    let form = doc.append_element(body, "form", &[("id", "transfer")]);

    doc.append_element(form, "input", &[("id", "amount"), ("type", "text")]);
    let bank = doc.append_element(form, "select", &[("name", "bank")]);
    for (value, text) in [("01", "Busan"), ("02", "Seoul")] {
        let option = doc.append_element(bank, "option", &[("value", value)]);
        doc.append_text(option, text);
    }
    let pay = doc.append_element(form, "button", &[("id", "go")]);
    doc.set_cursor(pay, "pointer");
    doc.append_text(pay, "Pay");

    let total = doc.append_element(body, "p", &[("id", "total")]);
    doc.append_text(total, " 5,000 KRW ");

    doc.append_element(body, "input", &[("id", "certselect_tek_input1"), ("type", "password")]);
    let keypad = doc.append_element(body, "div", &[("id", "nppfs-keypad-certselect_tek_input1")]);
    let panels = doc.append_element(keypad, "div", &[]);
    for _ in 0..3 {
        let panel = doc.append_element(panels, "div", &[]);
        for _ in 0..45 {
            doc.append_element(panel, "img", &[("class", "kpd-data")]);
        }
    }
    doc
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
