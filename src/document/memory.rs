//! In-memory document tree
//!
//! Markup is parsed with html5ever into an `RcDom`, then copied into an
//! arena that can be shared across tasks. Serialization goes back through
//! html5ever's serializer. There is no layout engine: geometry lives in a
//! side map filled with [`MemoryDocument::set_rect`], and an element reports
//! zero once it or an ancestor has been hidden.

use super::{DocumentTree, Query, Rect};
use crate::ScrapeError;
use async_trait::async_trait;
use html5ever::serialize::{serialize, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Child {
    Element(NodeId),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Element {
    name: QualName,
    attributes: Vec<(QualName, String)>,
    children: Vec<Child>,
    parent: Option<NodeId>,
}

impl Element {
    fn new(tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag.to_ascii_lowercase())),
            attributes: Vec::new(),
            children: Vec::new(),
            parent,
        }
    }
}

fn attribute_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

/// Document tree held entirely in memory
///
/// # Examples
///
/// ```rust
/// use block_scraper::document::{MemoryDocument, Query, Rect};
///
/// let mut doc = MemoryDocument::parse(r#"<div style="-block-section">Welcome</div>"#);
/// let hero = doc.find_all(&Query::has_attribute("style"))[0];
/// doc.set_rect(hero, Rect::new(0.0, 0.0, 1500.0, 400.0));
///
/// assert_eq!(doc.html(hero), r#"<div style="-block-section">Welcome</div>"#);
/// ```
#[derive(Clone)]
pub struct MemoryDocument {
    elements: Vec<Element>,
    geometry: HashMap<NodeId, Rect>,
    hidden: HashSet<NodeId>,
    stylesheets: Vec<String>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("elements", &self.elements.len())
            .field("hidden", &self.hidden.len())
            .field("stylesheets", &self.stylesheets.len())
            .finish()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Empty document with a `body` root.
    pub fn new() -> Self {
        Self {
            elements: vec![Element::new("body", None)],
            geometry: HashMap::new(),
            hidden: HashSet::new(),
            stylesheets: Vec::new(),
        }
    }

    /// Parse an HTML document or fragment. The tree is rooted at `body`.
    pub fn parse(markup: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default())
            .from_utf8()
            .one(markup.as_bytes());

        let mut doc = Self::new();
        if let Some(body) = find_body(&dom.document) {
            let root = doc.root();
            doc.import_children(&body, root);
        }
        doc
    }

    fn import_children(&mut self, handle: &Handle, parent: NodeId) {
        for child in handle.children.borrow().iter() {
            match child.data {
                NodeData::Element {
                    ref name, ref attrs, ..
                } => {
                    let id = NodeId(self.elements.len());
                    self.elements.push(Element {
                        name: name.clone(),
                        attributes: attrs
                            .borrow()
                            .iter()
                            .map(|attr| (attr.name.clone(), attr.value.to_string()))
                            .collect(),
                        children: Vec::new(),
                        parent: Some(parent),
                    });
                    self.elements[parent.0].children.push(Child::Element(id));
                    self.import_children(child, id);
                }
                NodeData::Text { ref contents } => {
                    self.elements[parent.0]
                        .children
                        .push(Child::Text(contents.borrow().to_string()));
                }
                NodeData::Comment { ref contents } => {
                    self.elements[parent.0]
                        .children
                        .push(Child::Comment(contents.to_string()));
                }
                _ => {}
            }
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child element, attributes kept in the given order.
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = NodeId(self.elements.len());
        let mut element = Element::new(tag, Some(parent));
        element.attributes = attributes
            .iter()
            .map(|(name, value)| (attribute_name(name), value.to_string()))
            .collect();
        self.elements.push(element);
        self.elements[parent.0].children.push(Child::Element(id));
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        self.elements[parent.0].children.push(Child::Text(text.to_string()));
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.geometry.insert(node, rect);
    }

    /// Elements matching the query, document root included, in pre-order.
    pub fn find_all(&self, query: &Query) -> Vec<NodeId> {
        self.matching(self.root(), query, true)
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.elements[node.0]
            .attributes
            .iter()
            .find(|(key, _)| key.local.as_ref() == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.get_attribute(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root() {
                return true;
            }
            match self.elements[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Whether the element or one of its ancestors was hidden.
    pub fn is_hidden(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.hidden.contains(&id) {
                return true;
            }
            current = self.elements[id.0].parent;
        }
        false
    }

    pub fn stylesheets(&self) -> &[String] {
        &self.stylesheets
    }

    /// Concatenated text of the element and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut text = String::new();
        self.collect_text(node, &mut text);
        text
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        for child in &self.elements[node.0].children {
            match child {
                Child::Element(id) => self.collect_text(*id, out),
                Child::Text(text) => out.push_str(text),
                Child::Comment(_) => {}
            }
        }
    }

    /// Outer markup of the element.
    pub fn html(&self, node: NodeId) -> String {
        self.serialize_node(node).unwrap_or_default()
    }

    fn serialize_node(&self, node: NodeId) -> Result<String, ScrapeError> {
        let mut bytes = Vec::new();
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::IncludeNode,
            ..Default::default()
        };
        serialize(&mut bytes, &Outer { doc: self, node }, opts)?;
        String::from_utf8(bytes).map_err(|e| ScrapeError::PageError(format!("markup is not UTF-8: {}", e)))
    }

    fn matching(&self, scope: NodeId, query: &Query, include_scope: bool) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            if (include_scope || id != scope) && query.matches(|name| self.get_attribute(id, name).map(str::to_string)) {
                found.push(id);
            }
            // reversed so the leftmost child is visited next
            for child in self.elements[id.0].children.iter().rev() {
                if let Child::Element(child_id) = child {
                    stack.push(*child_id);
                }
            }
        }
        found
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: String) {
        let attributes = &mut self.elements[node.0].attributes;
        match attributes.iter_mut().find(|(key, _)| key.local.as_ref() == name) {
            Some((_, existing)) => *existing = value,
            None => attributes.push((attribute_name(name), value)),
        }
    }

    fn push_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let classes = match self.get_attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attribute(node, "class", classes);
    }

    fn check(&self, node: NodeId) -> Result<(), ScrapeError> {
        if node.0 < self.elements.len() {
            Ok(())
        } else {
            Err(ScrapeError::ElementNotFound(format!("node {}", node.0)))
        }
    }
}

fn find_body(handle: &Handle) -> Option<Handle> {
    if let NodeData::Element { ref name, .. } = handle.data {
        if name.local.as_ref() == "body" {
            return Some(handle.clone());
        }
    }
    handle.children.borrow().iter().find_map(find_body)
}

/// Serializes an arena element through html5ever.
struct Outer<'a> {
    doc: &'a MemoryDocument,
    node: NodeId,
}

impl Serialize for Outer<'_> {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        let element = &self.doc.elements[self.node.0];
        let include_node = matches!(traversal_scope, TraversalScope::IncludeNode);

        if include_node {
            serializer.start_elem(
                element.name.clone(),
                element.attributes.iter().map(|(name, value)| (name, value.as_str())),
            )?;
        }

        for child in &element.children {
            match child {
                Child::Element(id) => Outer { doc: self.doc, node: *id }.serialize(serializer, TraversalScope::IncludeNode)?,
                Child::Text(text) => serializer.write_text(text)?,
                Child::Comment(text) => serializer.write_comment(text)?,
            }
        }

        if include_node {
            serializer.end_elem(element.name.clone())?;
        }
        Ok(())
    }
}

/// Serialize a parsed `RcDom` node, for comparing against arena output.
#[cfg(test)]
fn serialize_handle(handle: &Handle) -> String {
    let mut bytes = Vec::new();
    let node: markup5ever_rcdom::SerializableHandle = handle.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    serialize(&mut bytes, &node, opts).unwrap();
    String::from_utf8(bytes).unwrap()
}

#[async_trait]
impl DocumentTree for MemoryDocument {
    type Node = NodeId;

    async fn select(&self, query: &Query) -> Result<Vec<NodeId>, ScrapeError> {
        Ok(self.find_all(query))
    }

    async fn select_within(&self, scope: &NodeId, query: &Query) -> Result<Vec<NodeId>, ScrapeError> {
        self.check(*scope)?;
        Ok(self.matching(*scope, query, false))
    }

    async fn attribute(&self, node: &NodeId, name: &str) -> Result<Option<String>, ScrapeError> {
        self.check(*node)?;
        Ok(self.get_attribute(*node, name).map(str::to_string))
    }

    async fn is_attached(&self, node: &NodeId) -> Result<bool, ScrapeError> {
        self.check(*node)?;
        Ok(self.contains(*node))
    }

    async fn outer_html(&self, node: &NodeId) -> Result<String, ScrapeError> {
        self.check(*node)?;
        self.serialize_node(*node)
    }

    async fn bounding_rect(&self, node: &NodeId) -> Result<Rect, ScrapeError> {
        self.check(*node)?;
        if !self.contains(*node) {
            return Err(ScrapeError::ElementDetached);
        }
        if self.is_hidden(*node) {
            return Ok(Rect::ZERO);
        }
        Ok(self.geometry.get(node).copied().unwrap_or(Rect::ZERO))
    }

    async fn add_class(&mut self, node: &NodeId, class: &str) -> Result<(), ScrapeError> {
        self.check(*node)?;
        self.push_class(*node, class);
        Ok(())
    }

    async fn detach(&mut self, node: &NodeId) -> Result<(), ScrapeError> {
        self.check(*node)?;
        if *node == self.root() {
            return Err(ScrapeError::PageError("cannot detach the document root".to_string()));
        }
        if let Some(parent) = self.elements[node.0].parent.take() {
            self.elements[parent.0]
                .children
                .retain(|child| !matches!(child, Child::Element(id) if id == node));
        }
        Ok(())
    }

    async fn hide(&mut self, node: &NodeId, class: &str) -> Result<(), ScrapeError> {
        self.check(*node)?;
        self.push_class(*node, class);
        self.hidden.insert(*node);
        Ok(())
    }

    async fn trim_text(&mut self, node: &NodeId) -> Result<(), ScrapeError> {
        self.check(*node)?;
        let text = self.text_content(*node).trim().to_string();
        let children = std::mem::take(&mut self.elements[node.0].children);
        for child in children {
            if let Child::Element(id) = child {
                self.elements[id.0].parent = None;
            }
        }
        if !text.is_empty() {
            self.elements[node.0].children.push(Child::Text(text));
        }
        Ok(())
    }

    async fn inject_style(&mut self, css: &str) -> Result<(), ScrapeError> {
        self.stylesheets.push(css.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<div data-group="a"><span data-group="b">inner</span></div><p data-group="c">5 &lt; 6 &amp; "quoted"</p>"#;

    fn sample() -> (MemoryDocument, NodeId, NodeId, NodeId) {
        let doc = MemoryDocument::parse(SAMPLE);
        let found = doc.find_all(&Query::has_attribute("data-group"));
        assert_eq!(found.len(), 3);
        (doc, found[0], found[1], found[2])
    }

    #[test]
    fn test_parse_matches_html5ever_serialization() {
        let dom = parse_document(RcDom::default(), ParseOpts::default())
            .from_utf8()
            .one(SAMPLE.as_bytes());
        let body = find_body(&dom.document).unwrap();
        let expected: String = body.children.borrow().iter().map(serialize_handle).collect();

        let doc = MemoryDocument::parse(SAMPLE);
        let root = doc.root();
        let html = doc.html(root);

        assert_eq!(html, format!("<body>{}</body>", expected));
    }

    #[test]
    fn test_parse_keeps_attribute_order_and_comments() {
        let doc = MemoryDocument::parse(r#"<section style="-block-section" data-group="hero"><!-- note -->Hi</section>"#);
        let section = doc.find_all(&Query::has_attribute("style"))[0];

        assert_eq!(
            doc.html(section),
            r#"<section style="-block-section" data-group="hero"><!-- note -->Hi</section>"#
        );
        assert_eq!(doc.text_content(section), "Hi");
    }

    #[tokio::test]
    async fn test_select_is_preorder() {
        let (doc, outer, inner, sibling) = sample();
        let found = doc.select(&Query::has_attribute("data-group")).await.unwrap();
        assert_eq!(found, vec![outer, inner, sibling]);

        let within = doc.select_within(&outer, &Query::has_attribute("data-group")).await.unwrap();
        assert_eq!(within, vec![inner]);
    }

    #[tokio::test]
    async fn test_serialization_escapes() {
        let (mut doc, _, _, sibling) = sample();
        doc.add_class(&sibling, "note").await.unwrap();
        doc.add_class(&sibling, "note").await.unwrap();

        assert_eq!(
            doc.outer_html(&sibling).await.unwrap(),
            "<p data-group=\"c\" class=\"note\">5 &lt; 6 &amp; \"quoted\"</p>"
        );

        let img = doc.append_element(sibling, "IMG", &[("alt", "a \"b\"")]);
        assert_eq!(doc.html(img), "<img alt=\"a &quot;b&quot;\">");
    }

    #[tokio::test]
    async fn test_detach_removes_subtree() {
        let (mut doc, outer, inner, sibling) = sample();
        doc.detach(&outer).await.unwrap();

        assert!(!doc.is_attached(&outer).await.unwrap());
        assert!(!doc.is_attached(&inner).await.unwrap());
        assert!(doc.is_attached(&sibling).await.unwrap());
        assert!(matches!(doc.bounding_rect(&inner).await, Err(ScrapeError::ElementDetached)));
        assert_eq!(doc.select(&Query::has_attribute("data-group")).await.unwrap(), vec![sibling]);

        let root = doc.root();
        assert!(doc.detach(&root).await.is_err());
    }

    #[tokio::test]
    async fn test_hidden_ancestor_zeroes_geometry() {
        let (mut doc, outer, inner, sibling) = sample();
        doc.set_rect(inner, Rect::new(10.0, 20.0, 30.0, 40.0));
        doc.set_rect(sibling, Rect::new(0.0, 100.0, 300.0, 40.0));

        doc.hide(&outer, "gone").await.unwrap();

        assert_eq!(doc.bounding_rect(&inner).await.unwrap(), Rect::ZERO);
        assert_eq!(doc.bounding_rect(&sibling).await.unwrap(), Rect::new(0.0, 100.0, 300.0, 40.0));
        assert!(doc.has_class(outer, "gone"));
    }

    #[tokio::test]
    async fn test_trim_text_replaces_children() {
        let mut doc = MemoryDocument::parse("<div class=\"code-edit\">\n  <b data-inner=\"1\">&lt;div&gt;</b>  \n</div>");
        let code = doc.find_all(&Query::class("code-edit"))[0];
        let bold = doc.find_all(&Query::has_attribute("data-inner"))[0];

        doc.trim_text(&code).await.unwrap();

        assert_eq!(doc.html(code), "<div class=\"code-edit\">&lt;div&gt;</div>");
        assert!(!doc.contains(bold));
    }
}
