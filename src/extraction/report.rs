use crate::document::Rect;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// One extracted section or component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Style key: `data-style`, falling back to `data-group`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// `data-block` value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
    /// Outer markup at extraction time
    pub html: String,
}

impl BlockRecord {
    pub fn new(style: Option<String>, block: Option<String>, rect: Rect, html: String) -> Self {
        Self {
            style,
            block,
            width: rect.width,
            height: rect.height,
            left: rect.left,
            top: rect.top,
            html,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

/// Response of `/scrape`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub sections: Vec<BlockRecord>,
    pub components: Vec<BlockRecord>,
    /// Base64 of the full-page capture taken after extraction
    pub screenshot: String,
}

impl Report {
    pub fn assemble(sections: Vec<BlockRecord>, components: Vec<BlockRecord>, image: &[u8]) -> Self {
        Self {
            sections,
            components,
            screenshot: STANDARD.encode(image),
        }
    }

    /// Decoded screenshot bytes.
    pub fn screenshot_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.screenshot)
    }
}
