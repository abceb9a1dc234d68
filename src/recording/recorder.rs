use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::browser::dom::{self, Document};

use super::capture::RawEvent;
use super::script::{CAPTURE_BINDING, CAPTURE_SCRIPT, TARGET_MARKER_ATTR};

/// A raw event together with the snapshot its node ids refer to
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub document: Document,
    pub event: RawEvent,
}

/// Event payload pushed by the capture script
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BindingPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    marker: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    selected_text: Option<String>,
    #[serde(default)]
    url: String,
}

/// Install the capture binding and script on a page. The script runs on
/// every new document and once on the current one.
pub async fn install(page: &Page) -> Result<EventStream<EventBindingCalled>> {
    page.execute(AddBindingParams::new(CAPTURE_BINDING))
        .await
        .map_err(|e| anyhow!("Failed to add binding '{}': {}", CAPTURE_BINDING, e))?;

    let events = page
        .event_listener::<EventBindingCalled>()
        .await
        .map_err(|e| anyhow!("Failed to create event listener: {}", e))?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(CAPTURE_SCRIPT))
        .await
        .map_err(|e| anyhow!("Failed to register capture script: {}", e))?;

    page.evaluate(CAPTURE_SCRIPT)
        .await
        .map_err(|e| anyhow!("Failed to run capture script: {}", e))?;

    tracing::debug!("Capture binding '{}' installed", CAPTURE_BINDING);
    Ok(events)
}

/// Forward binding calls of one page as [`CapturedEvent`]s until the page
/// goes away or the receiver is dropped
pub fn spawn_capture_listener(
    page: Page,
    mut events: EventStream<EventBindingCalled>,
    tx: mpsc::Sender<CapturedEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(binding_event) = events.next().await {
            if binding_event.name != CAPTURE_BINDING {
                continue;
            }
            let payload = match serde_json::from_str::<BindingPayload>(&binding_event.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Malformed capture payload: {}", e);
                    continue;
                }
            };

            let captured = match snapshot_for(&page, &payload).await {
                Ok(doc) => to_captured(doc, &payload),
                Err(e) => {
                    tracing::debug!("Snapshot for '{}' event failed: {}", payload.event_type, e);
                    None
                }
            };

            if let Some(captured) = captured {
                if tx.send(captured).await.is_err() {
                    break;
                }
            }
        }
        tracing::debug!("Capture listener stopped");
    })
}

async fn snapshot_for(page: &Page, payload: &BindingPayload) -> Result<Document> {
    // the document is being torn down; only its url matters
    if payload.event_type == "unload" {
        return Ok(Document::new(payload.url.clone()));
    }
    dom::snapshot_document(page).await
}

/// Locate the marked node, apply the live state the payload carries and
/// build the raw event
fn to_captured(mut doc: Document, payload: &BindingPayload) -> Option<CapturedEvent> {
    if payload.event_type == "unload" {
        return Some(CapturedEvent {
            document: doc,
            event: RawEvent::Unload {
                value: payload.value.clone(),
            },
        });
    }

    let marker = payload.marker.as_deref()?;
    let target = doc.elements().into_iter().find(|n| {
        doc.attr(*n, TARGET_MARKER_ATTR)
            .map(|tokens| tokens.split_whitespace().any(|t| t == marker))
            .unwrap_or(false)
    });
    let target = match target {
        Some(t) => t,
        None => {
            tracing::debug!("Marked element for '{}' event no longer in the page", payload.event_type);
            return None;
        }
    };
    for node in doc.elements() {
        doc.remove_attr(node, TARGET_MARKER_ATTR);
    }
    if let Some(value) = &payload.value {
        doc.set_value(target, value);
    }
    if let Some(cursor) = &payload.cursor {
        doc.set_cursor(target, cursor);
    }

    let selected_text = || payload.selected_text.clone().unwrap_or_default();
    let event = match payload.event_type.as_str() {
        "click" => RawEvent::Click { target },
        "change" => RawEvent::Change {
            target,
            selected_text: selected_text(),
        },
        "keydown" => RawEvent::KeyDown {
            target,
            key: payload.key.clone().unwrap_or_default(),
        },
        "mouseup" => RawEvent::MouseUp {
            ancestor: target,
            selected_text: selected_text(),
        },
        "focus" => RawEvent::Focus { target },
        "input" => RawEvent::Input { target },
        "blur" => RawEvent::Blur { target },
        other => {
            tracing::debug!("Ignoring unknown capture event '{}'", other);
            return None;
        }
    };

    Some(CapturedEvent { document: doc, event })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> BindingPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_payload_maps_to_marked_node() {
        let mut doc = Document::new("https://example.com");
        let body = doc.append_element(doc.root(), "body", &[]);
        let field = doc.append_element(body, "input", &[("id", "amt"), (TARGET_MARKER_ATTR, "3 4")]);

        let captured = to_captured(
            doc,
            &payload(r#"{"type":"blur","marker":"4","value":"5000","cursor":"text","url":"https://example.com"}"#),
        )
        .unwrap();

        assert_eq!(captured.event, RawEvent::Blur { target: field });
        assert_eq!(captured.document.field_value(field), "5000");
        assert_eq!(captured.document.attr(field, TARGET_MARKER_ATTR), None);
    }

    #[test]
    fn test_unload_and_stale_markers() {
        let unload = to_captured(
            Document::new("https://example.com/a"),
            &payload(r#"{"type":"unload","value":"x","url":"https://example.com/a"}"#),
        )
        .unwrap();
        assert_eq!(unload.event, RawEvent::Unload { value: Some("x".to_string()) });

        let stale = to_captured(
            Document::new("https://example.com/b"),
            &payload(r#"{"type":"click","marker":"9","url":"https://example.com/b"}"#),
        );
        assert!(stale.is_none());
    }
}
