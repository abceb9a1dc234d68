//! Execution of element records inside one document.

use super::ReplayError;
use crate::browser::{fingerprint, PageDriver};
use crate::keypad::{self, KeypadConfig};
use crate::models::{EventKind, EventRecord};

/// Perform `record` on the page. Returns the text read by `extract`.
///
/// The record's input value is used as-is; placeholder substitution
/// happens before the record reaches the document.
pub async fn execute(
    page: &dyn PageDriver,
    record: &EventRecord,
    keypad_config: &KeypadConfig,
) -> Result<Option<String>, ReplayError> {
    if record.kind == EventKind::InputCert {
        let pressed =
            keypad::enter_password(page, &record.target_id, record.value(), keypad_config, &record.uid).await?;
        tracing::debug!("Secure keypad took {} key(s)", pressed);
        return Ok(None);
    }
    if record.kind.is_lifecycle() {
        return Err(ReplayError::Action(format!("{} is not an element action", record.kind)));
    }

    let doc = page.snapshot().await?;
    let node = fingerprint::resolve(&doc, &record.target_id)?;

    match record.kind {
        EventKind::Click => page.click(&doc, node, &record.uid).await?,
        EventKind::Input => page.set_value(&doc, node, record.value()).await?,
        EventKind::SelectOption => page.select_option(&doc, node, record.value()).await?,
        EventKind::EnterPress => page.press_enter(&doc, node).await?,
        EventKind::Extract => {
            let text = doc.text_content(node).trim().to_string();
            tracing::debug!("Extracted {} char(s) from {}", text.chars().count(), record.target_id);
            return Ok(Some(text));
        }
        other => return Err(ReplayError::Action(format!("{} is not an element action", other))),
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::dom::{Document, NodeId};
    use crate::browser::{MemoryPage, PageAction};
    use crate::models::RecordDraft;

    fn checkout() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new("https://shop.example/checkout");
        let body = doc.append_element(doc.root(), "body", &[]);
        let amount = doc.append_element(body, "input", &[("id", "amount")]);
        let pay = doc.append_element(body, "button", &[("id", "pay")]);
        let total = doc.append_element(body, "span", &[("id", "total")]);
        doc.append_text(total, "  12,000 KRW ");
        (doc, amount, pay, total)
    }

    fn record(kind: EventKind, target: &str) -> EventRecord {
        RecordDraft::element(kind, target, "https://shop.example/checkout").into_record("r1".to_string())
    }

    #[tokio::test]
    async fn test_element_actions() {
        let (doc, amount, pay, _) = checkout();
        let page = MemoryPage::new(doc);
        let config = KeypadConfig::default();

        let mut input = record(EventKind::Input, "id=amount");
        input.input_value = Some("5000".to_string());
        execute(&page, &input, &config).await.unwrap();
        execute(&page, &record(EventKind::Click, "id=pay"), &config).await.unwrap();
        execute(&page, &record(EventKind::EnterPress, "id=amount"), &config).await.unwrap();

        assert_eq!(
            page.actions(),
            vec![
                PageAction::SetValue(amount, "5000".to_string()),
                PageAction::Click(pay),
                PageAction::Enter(amount),
            ]
        );
    }

    #[tokio::test]
    async fn test_extract_returns_trimmed_text() {
        let (doc, _, _, _) = checkout();
        let page = MemoryPage::new(doc);
        let text = execute(&page, &record(EventKind::Extract, "id=total"), &KeypadConfig::default())
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("12,000 KRW"));
        assert!(page.actions().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_and_lifecycle_records_fail() {
        let (doc, _, _, _) = checkout();
        let page = MemoryPage::new(doc);
        let config = KeypadConfig::default();

        let err = execute(&page, &record(EventKind::Click, "id=gone"), &config).await.unwrap_err();
        assert!(matches!(err, ReplayError::Resolution(_)));
        assert!(!err.is_fatal());

        let err = execute(&page, &record(EventKind::TabCreated, "N/A"), &config).await.unwrap_err();
        assert!(matches!(err, ReplayError::Action(_)));
    }
}
