//! Request bodies shared by the HTTP endpoints and the CLI

use crate::{utils::validate_url, OutputFormat, PaperFormat, ScrapeError, Viewport};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Body of every page endpoint
///
/// `options` never fails to deserialize: malformed entries fall back to
/// their defaults.
///
/// ```rust
/// use block_scraper::{PageRequest, PageSource};
///
/// let request: PageRequest = serde_json::from_str(
///     r#"{"url": "https://example.com", "options": {"width": "1280", "fullPage": 0}}"#,
/// ).unwrap();
///
/// assert_eq!(request.options.width, Some(1280));
/// assert!(!request.options.full_page);
/// assert!(matches!(request.source(), Ok(PageSource::Url(_))));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default, deserialize_with = "lenient_options")]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    Url(String),
    Html(String),
}

impl PageRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Default::default()
        }
    }

    /// What to load; inline markup wins over a URL.
    pub fn source(&self) -> Result<PageSource, ScrapeError> {
        if let Some(html) = self.html.as_deref().filter(|h| !h.is_empty()) {
            return Ok(PageSource::Html(html.to_string()));
        }

        match self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(PageSource::Url(validate_url(url)?.to_string())),
            None => Err(ScrapeError::InvalidRequest(
                "Request needs either `url` or `html`".to_string(),
            )),
        }
    }
}

/// Per-request capture options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub full_page: bool,
    pub file: Option<PathBuf>,
    pub selector: Option<String>,
    pub format: Option<String>,
    pub wait: Option<Duration>,
}

impl RequestOptions {
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        Self {
            width: map.get("width").and_then(dimension),
            height: map.get("height").and_then(dimension),
            full_page: map.get("fullPage").map(truthy).unwrap_or(false),
            file: text(map.get("file")).map(PathBuf::from),
            selector: text(map.get("selector")),
            format: text(map.get("format")),
            wait: map
                .get("wait")
                .and_then(number)
                .map(|ms| Duration::from_millis(ms as u64)),
        }
    }

    /// Viewport to apply before capture, `None` when `fullPage` keeps the
    /// browser default.
    pub fn viewport(&self, default: &Viewport) -> Option<Viewport> {
        if self.full_page {
            return None;
        }
        Some(default.resized(
            self.width.unwrap_or(default.width),
            self.height.unwrap_or(default.height),
        ))
    }

    pub fn image_format(&self, default: OutputFormat) -> OutputFormat {
        self.format
            .as_deref()
            .and_then(OutputFormat::parse)
            .unwrap_or(default)
    }

    pub fn paper_format(&self, default: PaperFormat) -> PaperFormat {
        self.format
            .as_deref()
            .and_then(PaperFormat::parse)
            .unwrap_or(default)
    }

    pub fn wait_or(&self, default: Duration) -> Duration {
        self.wait.unwrap_or(default)
    }
}

fn lenient_options<'de, D>(deserializer: D) -> Result<RequestOptions, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(RequestOptions::from_value(&value))
}

fn number(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite() && *n >= 0.0)
}

/// Zero counts as unset.
fn dimension(value: &Value) -> Option<u32> {
    number(value)
        .map(|n| n.min(u32::MAX as f64) as u32)
        .filter(|n| *n > 0)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
