use std::time::Duration;

use super::layout::{key_path, DEFAULT_CONTAINER};
use super::locator::resolve_path;
use super::plan::{plan_key_sequence, KeyToken};
use crate::browser::fingerprint::{self, ResolveError};
use crate::browser::PageDriver;

#[derive(Debug, Clone)]
pub struct KeypadConfig {
    /// Positional path of the element holding the layout panels
    pub container: String,
    /// Pause after opening the keypad and after every key
    pub settle: Duration,
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            settle: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeypadError {
    #[error("keypad trigger: {0}")]
    Trigger(#[from] ResolveError),

    #[error("no keypad key for '{0}'")]
    UnknownKey(KeyToken),

    #[error("keypad key '{key}' not found at {path}")]
    KeyNotFound { key: KeyToken, path: String },

    #[error("keypad page error: {0}")]
    Page(#[from] anyhow::Error),
}

/// Open the keypad through `trigger` and type `password` on it, ending
/// with enter. Returns the number of keys pressed.
///
/// `marker` prefixes the discriminators used to scope each click.
pub async fn enter_password(
    page: &dyn PageDriver,
    trigger: &str,
    password: &str,
    config: &KeypadConfig,
    marker: &str,
) -> Result<usize, KeypadError> {
    let plan = plan_key_sequence(password);
    let keys = plan
        .iter()
        .map(|step| {
            key_path(&config.container, step)
                .map(|path| (step.token, path))
                .ok_or(KeypadError::UnknownKey(step.token))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let doc = page.snapshot().await?;
    let trigger_node = fingerprint::resolve(&doc, trigger)?;
    page.click(&doc, trigger_node, marker).await?;
    tokio::time::sleep(config.settle).await;

    for (index, (key, path)) in keys.iter().enumerate() {
        let doc = page.snapshot().await?;
        let node = resolve_path(&doc, path).ok_or_else(|| KeypadError::KeyNotFound {
            key: *key,
            path: path.clone(),
        })?;
        page.click(&doc, node, &format!("{}-k{}", marker, index)).await?;
        tracing::debug!("Keypad key {} of {} pressed", index + 1, keys.len());
        tokio::time::sleep(config.settle).await;
    }

    Ok(keys.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::dom::{Document, NodeId};
    use crate::browser::{MemoryPage, PageAction};

    /// Keypad with every panel holding 45 images, like the real one
    fn keypad_page() -> (Document, NodeId, Vec<Vec<NodeId>>) {
        let mut doc = Document::new("https://bank.example/cert");
        let body = doc.append_element(doc.root(), "body", &[]);
        let trigger = doc.append_element(body, "input", &[("id", "certselect_tek_input1")]);
        let keypad = doc.append_element(body, "div", &[("id", "nppfs-keypad-certselect_tek_input1")]);
        let panels = doc.append_element(keypad, "div", &[]);
        let mut images = Vec::new();
        for _ in 0..3 {
            let panel = doc.append_element(panels, "div", &[]);
            images.push(
                (0..45)
                    .map(|_| doc.append_element(panel, "img", &[("class", "kpd-data")]))
                    .collect(),
            );
        }
        (doc, trigger, images)
    }

    fn fast() -> KeypadConfig {
        KeypadConfig {
            settle: Duration::from_millis(1),
            ..KeypadConfig::default()
        }
    }

    #[tokio::test]
    async fn test_types_password_on_keypad() {
        let (doc, trigger, images) = keypad_page();
        let page = MemoryPage::new(doc);

        let pressed = enter_password(&page, "id=certselect_tek_input1", "Ab1", &fast(), "u1")
            .await
            .unwrap();
        assert_eq!(pressed, 6);

        // images are numbered from 1
        let img = |panel: usize, position: usize| images[panel - 1][position - 1];
        assert_eq!(
            page.actions(),
            vec![
                PageAction::Click(trigger),
                PageAction::Click(img(1, 40)),
                PageAction::Click(img(2, 23)),
                PageAction::Click(img(2, 40)),
                PageAction::Click(img(1, 36)),
                PageAction::Click(img(1, 3)),
                PageAction::Click(img(1, 39)),
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_before_and_during_typing() {
        let (doc, _, _) = keypad_page();
        let page = MemoryPage::new(doc);

        let err = enter_password(&page, "id=certselect_tek_input1", "é", &fast(), "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, KeypadError::UnknownKey(KeyToken::Char('é'))));
        assert!(page.actions().is_empty());

        let err = enter_password(&page, "id=missing", "a", &fast(), "u3").await.unwrap_err();
        assert!(matches!(err, KeypadError::Trigger(_)));

        let config = KeypadConfig {
            container: r#"id("other-keypad")/DIV[1]"#.to_string(),
            ..fast()
        };
        let err = enter_password(&page, "id=certselect_tek_input1", "a", &config, "u4")
            .await
            .unwrap_err();
        assert!(matches!(err, KeypadError::KeyNotFound { .. }));
    }
}
