//! Structural CSS selectors: generation of a selector that matches exactly
//! one element, and evaluation of the small selector grammar it produces.
//!
//! Grammar: `segment ( " > " segment )*` where a segment is an optional tag
//! (or `*`) followed by any number of `#id`, `.class`, `[attr="value"]`
//! and `:nth-child(n)` parts. Only the child combinator is supported.

use std::fmt;

use super::types::{Document, NodeId};

/// One compound selector between child combinators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
    pub nth_child: Option<usize>,
}

impl Segment {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if !doc.is_element(node) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if doc.tag(node) != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| doc.has_class(node, c)) {
            return false;
        }
        if !self
            .attributes
            .iter()
            .all(|(k, v)| doc.attr(node, k) == Some(v.as_str()))
        {
            return false;
        }
        match self.nth_child {
            Some(n) => doc.element_index(node) == n,
            None => true,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}", tag)?,
            None if self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty() => {
                write!(f, "*")?
            }
            None => {}
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        for (k, v) in &self.attributes {
            write!(f, "[{}=\"{}\"]", k, v)?;
        }
        if let Some(n) = self.nth_child {
            write!(f, ":nth-child({})", n)?;
        }
        Ok(())
    }
}

/// Parsed selector: segments from outermost to the subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector '{selector}': {reason}")]
pub struct SelectorParseError {
    pub selector: String,
    pub reason: String,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorParseError> {
        let err = |reason: &str| SelectorParseError {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let segments = input
            .split('>')
            .map(|part| parse_segment(part.trim()).map_err(|r| err(&r)))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(err("empty selector"));
        }
        Ok(Self { segments })
    }

    /// Does `node` match the full chain?
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let mut current = Some(node);
        for segment in self.segments.iter().rev() {
            match current {
                Some(n) if segment.matches(doc, n) => current = doc.parent_element(n),
                _ => return false,
            }
        }
        true
    }

    /// All matching elements in document order
    pub fn query_all(&self, doc: &Document) -> Vec<NodeId> {
        doc.elements()
            .into_iter()
            .filter(|n| self.matches(doc, *n))
            .collect()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(" > "))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Classes and tags the generator may embed verbatim
pub fn is_safe_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_ident_char) && !s.starts_with(|c: char| c.is_ascii_digit())
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_segment(part: &str) -> Result<Segment, String> {
    if part.is_empty() {
        return Err("empty segment".to_string());
    }
    let chars: Vec<char> = part.chars().collect();
    let mut pos = 0;
    let mut segment = Segment::default();

    if chars[0] == '*' {
        pos = 1;
    } else if is_ident_char(chars[0]) {
        segment.tag = Some(take_ident(&chars, &mut pos).to_lowercase());
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                let id = take_ident(&chars, &mut pos);
                if id.is_empty() {
                    return Err("empty id".to_string());
                }
                segment.id = Some(id);
            }
            '.' => {
                pos += 1;
                let class = take_ident(&chars, &mut pos);
                if class.is_empty() {
                    return Err("empty class".to_string());
                }
                segment.classes.push(class);
            }
            '[' => {
                let close = chars[pos..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or("unterminated attribute")?;
                let inner: String = chars[pos + 1..pos + close].iter().collect();
                let (name, value) = inner.split_once('=').ok_or("attribute without value")?;
                let value = value.trim().trim_matches('"').trim_matches('\'');
                segment
                    .attributes
                    .push((name.trim().to_string(), value.to_string()));
                pos += close + 1;
            }
            ':' => {
                let rest: String = chars[pos..].iter().collect();
                let inner = rest
                    .strip_prefix(":nth-child(")
                    .and_then(|r| r.split_once(')'))
                    .map(|(n, _)| n.to_string())
                    .ok_or("only :nth-child is supported")?;
                let n = inner.trim().parse::<usize>().map_err(|_| "bad nth-child index")?;
                segment.nth_child = Some(n);
                pos += ":nth-child(".len() + inner.len() + 1;
            }
            c => return Err(format!("unexpected character '{}'", c)),
        }
    }

    Ok(segment)
}

/// Evaluate a selector string against a document
pub fn query_selector_all(doc: &Document, selector: &str) -> Result<Vec<NodeId>, SelectorParseError> {
    Ok(Selector::parse(selector)?.query_all(doc))
}

fn segment_for(doc: &Document, node: NodeId, positional: bool) -> Segment {
    let tag = doc.tag(node);
    Segment {
        tag: is_safe_ident(tag).then(|| tag.to_string()),
        id: None,
        classes: doc
            .classes(node)
            .into_iter()
            .filter(|c| is_safe_ident(c))
            .map(str::to_string)
            .collect(),
        attributes: Vec::new(),
        nth_child: positional.then(|| doc.element_index(node)),
    }
}

/// Segment kept in the path when climbing past `node`: the plain segment if
/// it already singles the node out among its siblings, else the positional one.
fn climbing_segment(doc: &Document, node: NodeId) -> Segment {
    let plain = segment_for(doc, node, false);
    let siblings = match doc.parent(node) {
        Some(parent) => doc.element_children(parent),
        None => return plain,
    };
    let same = siblings.iter().filter(|s| plain.matches(doc, **s)).count();
    if same == 1 {
        plain
    } else {
        segment_for(doc, node, true)
    }
}

/// Build a selector that matches exactly `target`, climbing ancestors and
/// adding sibling positions until the match is unique.
pub fn unique_selector(doc: &Document, target: NodeId) -> String {
    let is_unique = |segments: &[Segment]| {
        let selector = Selector {
            segments: segments.to_vec(),
        };
        selector.query_all(doc) == vec![target]
    };

    let mut path: Vec<Segment> = Vec::new();
    let mut current = target;

    loop {
        for positional in [false, true] {
            let mut candidate = vec![segment_for(doc, current, positional)];
            candidate.extend(path.iter().cloned());
            if is_unique(&candidate) {
                return Selector { segments: candidate }.to_string();
            }
        }

        path.insert(0, climbing_segment(doc, current));
        match doc.parent_element(current) {
            Some(parent) => current = parent,
            None => return Selector { segments: path }.to_string(),
        }
    }
}
