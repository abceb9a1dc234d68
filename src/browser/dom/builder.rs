use std::collections::HashMap;

use super::types::{BackendNodeId, Document, DomNode, NodeId};
use super::RawCDPTrees;

/// Build a document snapshot from raw CDP data.
///
/// Frame documents (`contentDocument`) are left out: `<iframe>` elements
/// appear without content, and capture and replay cover the top-level
/// document only.
pub fn build_document(raw: RawCDPTrees) -> Document {
    let cursor_lookup = build_cursor_lookup(&raw.snapshot);
    let mut doc = Document::new(raw.url);
    let root = doc.root();

    if let Some(node) = doc.node_mut(root) {
        node.backend_node_id = json_i64(&raw.dom_root, "backendNodeId");
        node.cdp_node_id = json_i64(&raw.dom_root, "nodeId");
    }

    if let Some(children) = raw.dom_root.get("children").and_then(|c| c.as_array()) {
        for child in children {
            append_from_json(&mut doc, root, child, &cursor_lookup);
        }
    }

    doc
}

fn json_i64(json: &serde_json::Value, key: &str) -> i64 {
    json.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Map backend node id → computed cursor from a DOMSnapshot capture
fn build_cursor_lookup(snapshot: &Option<serde_json::Value>) -> HashMap<BackendNodeId, String> {
    let mut lookup = HashMap::new();

    let snapshot = match snapshot {
        Some(s) => s,
        None => return lookup,
    };

    let strings = snapshot.get("strings").and_then(|s| s.as_array());
    let documents = snapshot.get("documents").and_then(|d| d.as_array());

    let (strings, documents) = match (strings, documents) {
        (Some(s), Some(d)) => (s, d),
        _ => return lookup,
    };

    for doc in documents {
        let backend_ids = doc
            .get("nodes")
            .and_then(|n| n.get("backendNodeId"))
            .and_then(|b| b.as_array());
        let layout_nodes = doc
            .get("layout")
            .and_then(|l| l.get("nodeIndex"))
            .and_then(|n| n.as_array());
        let styles = doc
            .get("layout")
            .and_then(|l| l.get("styles"))
            .and_then(|s| s.as_array());

        let (backend_ids, layout_nodes, styles) = match (backend_ids, layout_nodes, styles) {
            (Some(b), Some(n), Some(s)) => (b, n, s),
            _ => continue,
        };

        // Only `cursor` is requested, so each style entry holds one string index
        for (layout_idx, node_idx) in layout_nodes.iter().enumerate() {
            let node_idx = match node_idx.as_u64() {
                Some(i) => i as usize,
                None => continue,
            };
            let backend_id = backend_ids
                .get(node_idx)
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            if backend_id == 0 {
                continue;
            }

            let cursor = styles
                .get(layout_idx)
                .and_then(|s| s.as_array())
                .and_then(|s| s.first())
                .and_then(|i| i.as_i64())
                .and_then(|i| strings.get(i as usize))
                .and_then(|s| s.as_str());

            if let Some(cursor) = cursor {
                lookup.insert(backend_id, cursor.to_string());
            }
        }
    }

    lookup
}

/// Recursively append a CDP `DOM.Node` below `parent`
fn append_from_json(
    doc: &mut Document,
    parent: NodeId,
    json: &serde_json::Value,
    cursors: &HashMap<BackendNodeId, String>,
) {
    let node_type = json_i64(json, "nodeType");
    let backend_node_id = json_i64(json, "backendNodeId");
    let cdp_node_id = json_i64(json, "nodeId");

    let id = match node_type {
        // ELEMENT_NODE
        1 => {
            let node_name = json.get("nodeName").and_then(|v| v.as_str()).unwrap_or("");
            let tag = node_name.to_lowercase();
            if ["script", "style", "noscript", "head", "meta", "link"].contains(&tag.as_str()) {
                return;
            }

            let mut node = DomNode::element(&tag);
            if let Some(attrs) = json.get("attributes").and_then(|a| a.as_array()) {
                for chunk in attrs.chunks(2) {
                    if let [key, value] = chunk {
                        node.attributes.push((
                            key.as_str().unwrap_or("").to_string(),
                            value.as_str().unwrap_or("").to_string(),
                        ));
                    }
                }
            }
            node.cursor = cursors.get(&backend_node_id).cloned();
            node.backend_node_id = backend_node_id;
            node.cdp_node_id = cdp_node_id;
            doc.push(parent, node)
        }
        // TEXT_NODE
        3 => {
            let text = json.get("nodeValue").and_then(|v| v.as_str()).unwrap_or("");
            let id = doc.append_text(parent, text);
            if let Some(node) = doc.node_mut(id) {
                node.backend_node_id = backend_node_id;
                node.cdp_node_id = cdp_node_id;
            }
            return;
        }
        // DOCUMENT_FRAGMENT_NODE (shadow roots) flattens into the parent
        11 => parent,
        _ => return,
    };

    if let Some(children) = json.get("children").and_then(|c| c.as_array()) {
        for child in children {
            append_from_json(doc, id, child, cursors);
        }
    }
    if let Some(shadow_roots) = json.get("shadowRoots").and_then(|s| s.as_array()) {
        for shadow in shadow_roots {
            append_from_json(doc, id, shadow, cursors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_document_from_cdp() {
        let dom_root = json!({
            "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "children": [{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML",
                "attributes": [],
                "children": [
                    { "nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "HEAD", "attributes": [] },
                    { "nodeId": 4, "backendNodeId": 4, "nodeType": 1, "nodeName": "BODY", "attributes": [],
                      "children": [
                        { "nodeId": 5, "backendNodeId": 5, "nodeType": 1, "nodeName": "BUTTON",
                          "attributes": ["id", "go", "class", "btn"],
                          "children": [{ "nodeId": 6, "backendNodeId": 6, "nodeType": 3, "nodeName": "#text", "nodeValue": "Go" }] }
                      ] }
                ]
            }]
        });
        let snapshot = json!({
            "strings": ["auto", "pointer"],
            "documents": [{
                "nodes": { "backendNodeId": [1, 2, 3, 4, 5, 6] },
                "layout": { "nodeIndex": [1, 3, 4], "styles": [[0], [0], [1]] }
            }]
        });

        let doc = build_document(RawCDPTrees {
            dom_root,
            snapshot: Some(snapshot),
            url: "https://example.com".to_string(),
        });

        let button = doc.find_by_attr("id", "go").unwrap();
        assert_eq!(doc.tag(button), "button");
        assert_eq!(doc.text_content(button), "Go");
        assert_eq!(doc.node(button).unwrap().cdp_node_id, 5);
        assert_eq!(doc.node(button).unwrap().cursor.as_deref(), Some("pointer"));
        // head is skipped
        assert!(doc.elements().iter().all(|n| doc.tag(*n) != "head"));
    }

    #[test]
    fn test_frame_documents_are_left_out() {
        let dom_root = json!({
            "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "children": [{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "BODY", "attributes": [],
                "children": [{
                    "nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "IFRAME",
                    "attributes": ["id", "pay-frame"],
                    "contentDocument": {
                        "nodeId": 4, "backendNodeId": 4, "nodeType": 9, "nodeName": "#document",
                        "children": [{ "nodeId": 5, "backendNodeId": 5, "nodeType": 1, "nodeName": "BUTTON",
                                       "attributes": ["id", "inner"] }]
                    }
                }]
            }]
        });

        let doc = build_document(RawCDPTrees {
            dom_root,
            snapshot: None,
            url: "https://example.com".to_string(),
        });

        let frame = doc.find_by_attr("id", "pay-frame").unwrap();
        assert!(doc.children(frame).is_empty());
        assert_eq!(doc.find_by_attr("id", "inner"), None);
    }
}
