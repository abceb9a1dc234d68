//! Resolver for the positional paths that address keypad images:
//! an optional `id("...")` anchor followed by `/TAG[n]` steps, where `n`
//! counts same-tag element children from 1.

use crate::browser::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    tag: String,
    index: usize,
}

fn parse_step(raw: &str) -> Option<Step> {
    let (tag, rest) = raw.split_once('[')?;
    let index = rest.strip_suffix(']')?.trim().parse().ok()?;
    if tag.is_empty() || index == 0 {
        return None;
    }
    Some(Step {
        tag: tag.to_lowercase(),
        index,
    })
}

/// Split `id("x")/A[1]/B[2]` into the anchor id and the steps
fn parse_path(path: &str) -> Option<(Option<&str>, Vec<Step>)> {
    let (anchor, rest) = match path.strip_prefix("id(") {
        Some(after) => {
            let close = after.find(')')?;
            let id = after[..close].trim().trim_matches('"').trim_matches('\'');
            (Some(id), &after[close + 1..])
        }
        None => (None, path),
    };

    let steps = rest
        .split('/')
        .filter(|s| !s.is_empty())
        .map(parse_step)
        .collect::<Option<Vec<_>>>()?;
    Some((anchor, steps))
}

/// Element addressed by `path`, if any
pub fn resolve_path(doc: &Document, path: &str) -> Option<NodeId> {
    let (anchor, steps) = parse_path(path)?;
    let mut current = match anchor {
        Some(id) => doc.find_by_attr("id", id)?,
        None => doc.root(),
    };

    for step in steps {
        current = doc
            .element_children(current)
            .into_iter()
            .filter(|c| doc.tag(*c) == step.tag)
            .nth(step.index - 1)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_positional_path() {
        let mut doc = Document::new("https://bank.example");
        let body = doc.append_element(doc.root(), "body", &[]);
        let keypad = doc.append_element(body, "div", &[("id", "pad")]);
        let panels = doc.append_element(keypad, "div", &[]);
        let mut second_panel_images = Vec::new();
        for panel in 0..2 {
            let p = doc.append_element(panels, "div", &[]);
            doc.append_element(p, "span", &[]);
            for _ in 0..3 {
                let img = doc.append_element(p, "img", &[("class", "kpd-data")]);
                if panel == 1 {
                    second_panel_images.push(img);
                }
            }
        }

        assert_eq!(
            resolve_path(&doc, r#"id("pad")/DIV[1]/DIV[2]/IMG[2]"#),
            Some(second_panel_images[1])
        );
        assert_eq!(resolve_path(&doc, r#"id("pad")/DIV[1]/DIV[3]/IMG[1]"#), None);
        assert_eq!(resolve_path(&doc, r#"id("missing")/DIV[1]"#), None);
        assert_eq!(resolve_path(&doc, r#"id("pad")/DIV[0]"#), None);
    }
}
