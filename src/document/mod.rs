//! Selection capability over a rendered document
//!
//! The extraction pipeline never talks to the browser directly. It walks
//! and mutates the page through [`DocumentTree`], which has two
//! implementations:
//! - [`ChromeDocument`]: a live chromiumoxide page, one CDP call per operation
//! - [`MemoryDocument`]: parsed markup with explicit geometry, used by tests
//!   and benchmarks

pub mod chrome;
pub mod memory;

pub use chrome::ChromeDocument;
pub use memory::{MemoryDocument, NodeId};

use crate::ScrapeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Logical group identifier; one element per value survives pruning.
pub const GROUP_ATTR: &str = "data-group";
/// Explicit style key of a block.
pub const STYLE_ATTR: &str = "data-style";
/// Block identifier reported alongside the geometry.
pub const BLOCK_ATTR: &str = "data-block";

/// Role label assigned by the classifier, stored as a class name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Section,
    Component,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Section => "section",
            Role::Component => "component",
        }
    }

    pub fn query(&self) -> Query {
        Query::class(self.label())
    }
}

/// Element selection understood by every [`DocumentTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Elements whose class list contains the name
    Class(String),
    /// Elements carrying the attribute, whatever its value
    HasAttribute(String),
    /// Elements whose attribute value contains the substring
    AttributeContains { name: String, value: String },
}

impl Query {
    pub fn class(name: impl Into<String>) -> Self {
        Query::Class(name.into())
    }

    pub fn has_attribute(name: impl Into<String>) -> Self {
        Query::HasAttribute(name.into())
    }

    pub fn attribute_contains(name: impl Into<String>, value: impl Into<String>) -> Self {
        Query::AttributeContains {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Equivalent CSS selector, for `querySelectorAll`.
    pub fn to_css(&self) -> String {
        match self {
            Query::Class(name) => format!(".{}", escape_identifier(name)),
            Query::HasAttribute(name) => format!("[{}]", escape_identifier(name)),
            Query::AttributeContains { name, value } => {
                format!("[{}*=\"{}\"]", escape_identifier(name), escape_string(value))
            }
        }
    }

    /// Test the query against an element's attributes.
    pub fn matches(&self, attribute: impl Fn(&str) -> Option<String>) -> bool {
        match self {
            Query::Class(name) => attribute("class")
                .map(|classes| classes.split_whitespace().any(|c| c == name))
                .unwrap_or(false),
            Query::HasAttribute(name) => attribute(name.as_str()).is_some(),
            // `*=` with an empty value never matches in CSS
            Query::AttributeContains { name, value } => {
                !value.is_empty()
                    && attribute(name.as_str())
                        .map(|actual| actual.contains(value.as_str()))
                        .unwrap_or(false)
            }
        }
    }
}

fn escape_identifier(ident: &str) -> String {
    let mut escaped = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        let plain = c.is_ascii_alphabetic()
            || c == '_'
            || c == '-'
            || !c.is_ascii()
            || (c.is_ascii_digit() && i > 0);
        if !plain {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Post-layout bounding box in page coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        left: 0.0,
        top: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether the element occupies any space on the page.
    pub fn is_rendered(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Read and mutate access to a rendered document
///
/// Selections return nodes in document pre-order. Reads on a node detached
/// from the document may fail with [`ScrapeError::ElementDetached`]; the
/// pipeline treats that as a per-element failure.
#[async_trait]
pub trait DocumentTree: Send + Sync {
    type Node: Send + Sync;

    /// All elements of the document matching the query.
    async fn select(&self, query: &Query) -> Result<Vec<Self::Node>, ScrapeError>;

    /// Descendants of `scope` matching the query, `scope` itself excluded.
    async fn select_within(
        &self,
        scope: &Self::Node,
        query: &Query,
    ) -> Result<Vec<Self::Node>, ScrapeError>;

    async fn attribute(&self, node: &Self::Node, name: &str) -> Result<Option<String>, ScrapeError>;

    async fn is_attached(&self, node: &Self::Node) -> Result<bool, ScrapeError>;

    /// Serialized outer markup, reflecting every mutation so far.
    async fn outer_html(&self, node: &Self::Node) -> Result<String, ScrapeError>;

    /// Live geometry; zero for elements that do not render.
    async fn bounding_rect(&self, node: &Self::Node) -> Result<Rect, ScrapeError>;

    /// Add a class name; adding an existing class is a no-op.
    async fn add_class(&mut self, node: &Self::Node, class: &str) -> Result<(), ScrapeError>;

    /// Remove the node and its subtree from the document.
    async fn detach(&mut self, node: &Self::Node) -> Result<(), ScrapeError>;

    /// Mark the node with `class` and stop it rendering. It stays attached.
    async fn hide(&mut self, node: &Self::Node, class: &str) -> Result<(), ScrapeError>;

    /// Replace the node's content with its own trimmed text, set as text.
    async fn trim_text(&mut self, node: &Self::Node) -> Result<(), ScrapeError>;

    /// Append a style sheet to the document.
    async fn inject_style(&mut self, css: &str) -> Result<(), ScrapeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_to_css() {
        assert_eq!(Role::Section.query().to_css(), ".section");
        assert_eq!(Query::has_attribute(GROUP_ATTR).to_css(), "[data-group]");
        assert_eq!(
            Query::attribute_contains("style", "-block-section").to_css(),
            "[style*=\"-block-section\"]"
        );
        assert_eq!(Query::class("a:b").to_css(), ".a\\:b");
        assert_eq!(
            Query::attribute_contains("style", "say \"hi\"").to_css(),
            "[style*=\"say \\\"hi\\\"\"]"
        );
    }

    #[test]
    fn test_query_matches() {
        let attrs = |name: &str| match name {
            "class" => Some("section wide".to_string()),
            "style" => Some("color: red; -block-component".to_string()),
            _ => None,
        };

        assert!(Query::class("wide").matches(attrs));
        assert!(!Query::class("wid").matches(attrs));
        assert!(Query::has_attribute("style").matches(attrs));
        assert!(!Query::has_attribute(GROUP_ATTR).matches(attrs));
        assert!(Query::attribute_contains("style", "-block-component").matches(attrs));
        assert!(!Query::attribute_contains("style", "").matches(attrs));
    }

    #[test]
    fn test_rect_rendered() {
        assert!(Rect::new(0.0, 10.0, 100.0, 20.0).is_rendered());
        assert!(!Rect::ZERO.is_rendered());
    }
}
