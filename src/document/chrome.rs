//! Live page backed by chromiumoxide
//!
//! Selections run `querySelectorAll` through CDP and hand back element
//! handles; reads and mutations call small functions on those handles
//! inside the page.

use super::{DocumentTree, Query, Rect};
use crate::ScrapeError;
use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use serde_json::Value;

const RECT_FN: &str = r#"function() {
    if (!this.isConnected) {
        throw new Error('element is detached');
    }
    if (!this.getClientRects().length) {
        return JSON.stringify({ left: 0, top: 0, width: 0, height: 0 });
    }
    const rect = this.getBoundingClientRect();
    return JSON.stringify({
        left: rect.left + window.pageXOffset,
        top: rect.top + window.pageYOffset,
        width: rect.width,
        height: rect.height,
    });
}"#;

const ATTACHED_FN: &str = "function() { return this.isConnected; }";
const DETACH_FN: &str = "function() { this.remove(); }";
const TRIM_TEXT_FN: &str = "function() { this.textContent = this.textContent.trim(); }";

pub struct ChromeDocument<'a> {
    page: &'a Page,
}

impl<'a> ChromeDocument<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    async fn call(&self, node: &Element, function: &str) -> Result<Option<Value>, ScrapeError> {
        let returns = node
            .call_js_fn(function, false)
            .await
            .map_err(|e| ScrapeError::EvaluationFailed(e.to_string()))?;

        if let Some(exception) = returns.exception_details {
            let message = exception
                .exception
                .as_ref()
                .and_then(|thrown| thrown.description.clone())
                .unwrap_or(exception.text);
            return Err(if message.contains("element is detached") {
                ScrapeError::ElementDetached
            } else {
                ScrapeError::EvaluationFailed(message)
            });
        }

        Ok(returns.result.value)
    }

    fn add_class_fn(class: &str) -> Result<String, ScrapeError> {
        Ok(format!(
            "function() {{ this.classList.add({}); }}",
            serde_json::to_string(class)?
        ))
    }
}

#[async_trait]
impl<'a> DocumentTree for ChromeDocument<'a> {
    type Node = Element;

    async fn select(&self, query: &Query) -> Result<Vec<Element>, ScrapeError> {
        self.page
            .find_elements(query.to_css())
            .await
            .map_err(|e| ScrapeError::PageError(format!("query {} failed: {}", query.to_css(), e)))
    }

    async fn select_within(&self, scope: &Element, query: &Query) -> Result<Vec<Element>, ScrapeError> {
        scope
            .find_elements(query.to_css())
            .await
            .map_err(|e| ScrapeError::PageError(format!("query {} failed: {}", query.to_css(), e)))
    }

    async fn attribute(&self, node: &Element, name: &str) -> Result<Option<String>, ScrapeError> {
        node.attribute(name)
            .await
            .map_err(|e| ScrapeError::PageError(e.to_string()))
    }

    async fn is_attached(&self, node: &Element) -> Result<bool, ScrapeError> {
        let value = self.call(node, ATTACHED_FN).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn outer_html(&self, node: &Element) -> Result<String, ScrapeError> {
        node.outer_html()
            .await
            .map_err(|e| ScrapeError::PageError(e.to_string()))?
            .ok_or(ScrapeError::ElementDetached)
    }

    async fn bounding_rect(&self, node: &Element) -> Result<Rect, ScrapeError> {
        let value = self.call(node, RECT_FN).await?;
        let json = value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::EvaluationFailed("no geometry returned".to_string()))?;
        Ok(serde_json::from_str(json)?)
    }

    async fn add_class(&mut self, node: &Element, class: &str) -> Result<(), ScrapeError> {
        self.call(node, &Self::add_class_fn(class)?).await?;
        Ok(())
    }

    async fn detach(&mut self, node: &Element) -> Result<(), ScrapeError> {
        self.call(node, DETACH_FN).await?;
        Ok(())
    }

    async fn hide(&mut self, node: &Element, class: &str) -> Result<(), ScrapeError> {
        // the injected collapse rule does the hiding
        self.call(node, &Self::add_class_fn(class)?).await?;
        Ok(())
    }

    async fn trim_text(&mut self, node: &Element) -> Result<(), ScrapeError> {
        self.call(node, TRIM_TEXT_FN).await?;
        Ok(())
    }

    async fn inject_style(&mut self, css: &str) -> Result<(), ScrapeError> {
        let script = format!(
            "(() => {{ const style = document.createElement('style'); style.textContent = {}; \
             (document.head || document.documentElement).appendChild(style); return true; }})()",
            serde_json::to_string(css)?
        );
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::EvaluationFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_class_fn_quotes_name() {
        let function = ChromeDocument::add_class_fn("block-\"x\"").unwrap();
        assert_eq!(function, r#"function() { this.classList.add("block-\"x\""); }"#);
    }
}
