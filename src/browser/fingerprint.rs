//! Stable element identifiers that survive the gap between recording a page
//! and replaying against a fresh load of it.

use std::fmt;

use super::dom::{selector, Document, NodeId, Selector};

/// Typed view of a fingerprint string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Name(String),
    LinkText(String),
    Css(String),
}

impl Locator {
    pub fn parse(fingerprint: &str) -> Self {
        if let Some(v) = fingerprint.strip_prefix("id=") {
            Locator::Id(v.to_string())
        } else if let Some(v) = fingerprint.strip_prefix("name=") {
            Locator::Name(v.to_string())
        } else if let Some(v) = fingerprint.strip_prefix("linkText=") {
            Locator::LinkText(v.to_string())
        } else {
            Locator::Css(fingerprint.to_string())
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "id={}", v),
            Locator::Name(v) => write!(f, "name={}", v),
            Locator::LinkText(v) => write!(f, "linkText={}", v),
            Locator::Css(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no element matches '{0}'")]
    NoCandidates(String),

    #[error("{candidates} candidate(s) for '{fingerprint}' but none confirmed")]
    NotConfirmed { fingerprint: String, candidates: usize },

    #[error(transparent)]
    InvalidSelector(#[from] selector::SelectorParseError),
}

/// Compute the fingerprint of an element. First matching rule wins:
/// `id`, then `name`, then link text of anchors, then a unique selector.
pub fn fingerprint(doc: &Document, node: NodeId) -> String {
    if let Some(id) = doc.non_empty_attr(node, "id") {
        return format!("id={}", id);
    }
    if let Some(name) = doc.non_empty_attr(node, "name") {
        return format!("name={}", name);
    }
    if doc.tag(node) == "a" {
        let text = doc.text_content(node);
        let text = text.trim();
        if !text.is_empty() {
            return format!("linkText={}", text);
        }
    }
    selector::unique_selector(doc, node)
}

fn candidates(doc: &Document, locator: &Locator) -> Result<Vec<NodeId>, ResolveError> {
    let all = doc.elements();
    let found = match locator {
        Locator::Id(v) => all
            .into_iter()
            .filter(|n| doc.attr(*n, "id") == Some(v.as_str()))
            .collect(),
        Locator::Name(v) => all
            .into_iter()
            .filter(|n| doc.attr(*n, "name") == Some(v.as_str()))
            .collect(),
        Locator::LinkText(_) => all.into_iter().filter(|n| doc.tag(*n) == "a").collect(),
        Locator::Css(css) => Selector::parse(css)?.query_all(doc),
    };
    Ok(found)
}

/// Locate the element a fingerprint was computed from.
///
/// Candidates are confirmed by recomputing their fingerprint. When several
/// distinct elements confirm (duplicate ids), the first in document order
/// wins.
pub fn resolve(doc: &Document, fp: &str) -> Result<NodeId, ResolveError> {
    let locator = Locator::parse(fp);
    let found = candidates(doc, &locator)?;
    if found.is_empty() {
        return Err(ResolveError::NoCandidates(fp.to_string()));
    }

    let confirmed: Vec<NodeId> = found
        .iter()
        .copied()
        .filter(|n| fingerprint(doc, *n) == fp)
        .collect();

    match confirmed.as_slice() {
        [] => Err(ResolveError::NotConfirmed {
            fingerprint: fp.to_string(),
            candidates: found.len(),
        }),
        [only] => Ok(*only),
        [first, ..] => {
            tracing::warn!(
                "Fingerprint '{}' confirmed by {} elements, using the first in document order",
                fp,
                confirmed.len()
            );
            Ok(*first)
        }
    }
}
