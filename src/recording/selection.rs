//! Maps a text selection to the element whose text best encloses it.

use crate::browser::dom::{Document, NodeId};

/// Element to fingerprint for an `extract` record.
///
/// Returns `None` for selections that are only whitespace. When the text
/// cannot be located under `ancestor`, `ancestor` itself is used.
pub fn extraction_target(doc: &Document, ancestor: NodeId, selected: &str) -> Option<NodeId> {
    if selected.trim().is_empty() {
        return None;
    }
    let ancestor = if doc.is_element(ancestor) {
        ancestor
    } else {
        doc.parent_element(ancestor)?
    };

    let text = doc.text_content(ancestor);
    let start = match text.find(selected) {
        Some(start) => start,
        None => return Some(ancestor),
    };
    let last_char_len = selected.chars().last().map(char::len_utf8).unwrap_or(1);
    let end = start + selected.len() - last_char_len;

    let first = deepest_element_at(doc, ancestor, start).unwrap_or(ancestor);
    let last = deepest_element_at(doc, ancestor, end).unwrap_or(ancestor);
    Some(lowest_common_ancestor(doc, first, last).unwrap_or(ancestor))
}

/// Deepest element below `root` whose text span covers byte `offset` of
/// `root`'s text content
fn deepest_element_at(doc: &Document, root: NodeId, offset: usize) -> Option<NodeId> {
    let mut consumed = 0;
    for node in doc.descendants(root) {
        let text = match doc.node(node).and_then(|n| n.text.as_deref()) {
            Some(t) => t,
            None => continue,
        };
        if offset < consumed + text.len() {
            return doc.parent(node).filter(|p| doc.is_element(*p));
        }
        consumed += text.len();
    }
    None
}

fn lowest_common_ancestor(doc: &Document, a: NodeId, b: NodeId) -> Option<NodeId> {
    std::iter::once(a)
        .chain(doc.ancestors(a))
        .find(|candidate| doc.contains(*candidate, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> (Document, NodeId, NodeId, NodeId) {
        // <div><p>Total: <b>5,000</b> <i>KRW</i></p></div>
        let mut doc = Document::new("https://example.com/receipt");
        let div = doc.append_element(doc.root(), "div", &[("id", "receipt")]);
        let p = doc.append_element(div, "p", &[]);
        doc.append_text(p, "Total: ");
        let b = doc.append_element(p, "b", &[]);
        doc.append_text(b, "5,000");
        doc.append_text(p, " ");
        let i = doc.append_element(p, "i", &[]);
        doc.append_text(i, "KRW");
        (doc, div, p, b)
    }

    #[test]
    fn test_selection_inside_one_element() {
        let (doc, div, _, b) = receipt();
        assert_eq!(extraction_target(&doc, div, "5,000"), Some(b));
        assert_eq!(extraction_target(&doc, div, "00"), Some(b));
    }

    #[test]
    fn test_selection_spanning_elements() {
        let (doc, div, p, _) = receipt();
        assert_eq!(extraction_target(&doc, div, "5,000 KRW"), Some(p));
    }

    #[test]
    fn test_whitespace_and_missing_text() {
        let (doc, div, _, _) = receipt();
        assert_eq!(extraction_target(&doc, div, "  \n"), None);
        assert_eq!(extraction_target(&doc, div, "USD"), Some(div));
    }
}
