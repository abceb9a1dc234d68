use serde::{Deserialize, Serialize};

/// Index of a node inside one [`Document`] snapshot
pub type NodeId = usize;

/// Backend node ID - stable identifier from CDP
pub type BackendNodeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Document,
    Element,
    Text,
}

/// One node of a document snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub kind: NodeKind,
    /// Lowercase tag name, empty for text and document nodes
    pub tag_name: String,
    /// Attributes in source order
    pub attributes: Vec<(String, String)>,
    /// Character data of text nodes
    pub text: Option<String>,
    /// Computed `cursor` style, when known
    pub cursor: Option<String>,
    /// Live `value` property of form fields, which attributes do not reflect
    pub value: Option<String>,
    /// CDP identifiers, zero for nodes that did not come from a browser
    pub backend_node_id: BackendNodeId,
    pub cdp_node_id: i64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl DomNode {
    fn new(kind: NodeKind, tag_name: &str) -> Self {
        Self {
            kind,
            tag_name: tag_name.to_lowercase(),
            attributes: Vec::new(),
            text: None,
            cursor: None,
            value: None,
            backend_node_id: 0,
            cdp_node_id: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn element(tag: &str) -> Self {
        Self::new(NodeKind::Element, tag)
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Arena-backed snapshot of a browsing context's DOM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    nodes: Vec<DomNode>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            nodes: vec![DomNode::new(NodeKind::Document, "")],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut DomNode> {
        self.nodes.get_mut(id)
    }

    /// Append an element under `parent` and return its id
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut node = DomNode::new(NodeKind::Element, tag);
        node.attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push(parent, node)
    }

    /// Append a text node under `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let mut node = DomNode::new(NodeKind::Text, "");
        node.text = Some(text.to_string());
        self.push(parent, node)
    }

    pub(crate) fn push(&mut self, parent: NodeId, mut node: DomNode) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id);
        }
        id
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            match node.attributes.iter_mut().find(|(k, _)| k == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => node.attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.attributes.retain(|(k, _)| k != name);
        }
    }

    pub fn set_cursor(&mut self, id: NodeId, cursor: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.cursor = Some(cursor.to_string());
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.value = Some(value.to_string());
        }
    }

    pub fn tag(&self, id: NodeId) -> &str {
        self.nodes.get(id).map(|n| n.tag_name.as_str()).unwrap_or("")
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.attr(name))
    }

    /// Attribute value, treating an empty string as absent
    pub fn non_empty_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attr(id, name).filter(|v| !v.is_empty())
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).contains(&class)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.nodes.get(id).map(|n| n.is_element()).unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Parent only when it is an element (stops at the document node)
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| self.is_element(*p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// 1-based position among the parent's element children
    pub fn element_index(&self, id: NodeId) -> usize {
        match self.parent(id) {
            Some(p) => self
                .element_children(p)
                .iter()
                .position(|c| *c == id)
                .map(|i| i + 1)
                .unwrap_or(1),
            None => 1,
        }
    }

    /// Pre-order traversal of `id` and everything below it
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// All elements in document order
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| self.is_element(*id))
            .collect()
    }

    /// Ancestors from the parent upwards, excluding `id`
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor == id || self.ancestors(id).contains(&ancestor)
    }

    /// Concatenated character data below `id`, like `textContent`
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.nodes.get(n).and_then(|node| node.text.as_deref()))
            .collect()
    }

    /// Current value of a form field: the live value, else the `value` attribute
    pub fn field_value(&self, id: NodeId) -> String {
        self.nodes
            .get(id)
            .and_then(|n| n.value.clone().or_else(|| n.attr("value").map(str::to_string)))
            .unwrap_or_default()
    }

    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|id| self.attr(*id, name) == Some(value))
    }

    /// `<option>` below a `<select>` (inside an `<optgroup>` included)
    /// whose trimmed text is `text`
    pub fn find_option(&self, select: NodeId, text: &str) -> Option<NodeId> {
        self.descendants(select)
            .into_iter()
            .find(|o| self.tag(*o) == "option" && self.text_content(*o).trim() == text)
    }

    pub fn find_by_backend_id(&self, backend_node_id: BackendNodeId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.backend_node_id == backend_node_id && backend_node_id != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("https://example.com");
        let body = doc.append_element(doc.root(), "body", &[]);
        let p = doc.append_element(body, "P", &[("class", "lead note")]);
        doc.append_text(p, "Hello ");
        let b = doc.append_element(p, "b", &[]);
        doc.append_text(b, "world");
        (doc, p, b)
    }

    #[test]
    fn test_text_content_and_order() {
        let (doc, p, b) = sample();
        assert_eq!(doc.text_content(p), "Hello world");
        assert_eq!(doc.tag(p), "p");
        assert_eq!(doc.classes(p), vec!["lead", "note"]);
        assert!(doc.contains(p, b));
        assert!(!doc.contains(b, p));
        assert_eq!(doc.elements().len(), 3);
    }

    #[test]
    fn test_attribute_updates() {
        let (mut doc, p, _) = sample();
        doc.set_attr(p, "data-x", "1");
        doc.set_attr(p, "data-x", "2");
        assert_eq!(doc.attr(p, "data-x"), Some("2"));
        assert_eq!(doc.find_by_attr("data-x", "2"), Some(p));
        doc.remove_attr(p, "data-x");
        assert_eq!(doc.attr(p, "data-x"), None);
    }

    #[test]
    fn test_find_option_inside_optgroup() {
        let mut doc = Document::new("https://example.com");
        let select = doc.append_element(doc.root(), "select", &[]);
        let top = doc.append_element(select, "option", &[]);
        doc.append_text(top, "Busan");
        let group = doc.append_element(select, "optgroup", &[("label", "Capital")]);
        let seoul = doc.append_element(group, "option", &[("value", "02")]);
        doc.append_text(seoul, " Seoul ");

        assert_eq!(doc.find_option(select, "Busan"), Some(top));
        assert_eq!(doc.find_option(select, "Seoul"), Some(seoul));
        assert_eq!(doc.find_option(select, "Capital"), None);
    }
}
