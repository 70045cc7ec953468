use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("Browser instance unavailable")]
    BrowserUnavailable,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Page navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element is no longer attached to the document")]
    ElementDetached,

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Semaphore acquire error: {0}")]
    SemaphoreError(String),
}

impl ScrapeError {
    /// Transient failures worth another navigation attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::BrowserUnavailable
                | ScrapeError::NavigationFailed(_)
                | ScrapeError::Timeout(_)
                | ScrapeError::PageError(_)
        )
    }

    /// Errors caused by the caller rather than the browser or the page.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScrapeError::InvalidRequest(_) | ScrapeError::InvalidUrl(_)
        )
    }

    /// Short label used for failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::BrowserUnavailable | ScrapeError::BrowserLaunchFailed(_) => "browser",
            ScrapeError::NavigationFailed(_) => "navigation",
            ScrapeError::Timeout(_) => "timeout",
            ScrapeError::PageError(_) | ScrapeError::EvaluationFailed(_) => "page",
            ScrapeError::ElementNotFound(_) | ScrapeError::ElementDetached => "element",
            ScrapeError::CaptureFailed(_) => "capture",
            ScrapeError::InvalidRequest(_) | ScrapeError::InvalidUrl(_) => "request",
            _ => "internal",
        }
    }
}

impl From<AcquireError> for ScrapeError {
    fn from(err: AcquireError) -> Self {
        ScrapeError::SemaphoreError(err.to_string())
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(err: std::io::Error) -> Self {
        ScrapeError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::SerializationError(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::PageError(err.to_string())
    }
}
