//! Configuration management with serde serialization/deserialization
//!
//! This module holds every setting the scraper needs at startup: browser
//! launch flags, pool sizing, request timeouts, the style markers driving
//! block classification, and the HTTP server settings.

use crate::ScrapeError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Main configuration structure for the block scraper
///
/// Passed explicitly into the browser pool, the page service and the HTTP
/// server. Nothing is read from process state after startup except the
/// `PORT` override applied by [`Config::apply_env`].
///
/// # Examples
///
/// ```rust
/// use block_scraper::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     browser_pool_size: 2,
///     max_concurrent_requests: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of Chrome browser instances kept in the pool (default: CPU count, at most 4)
    pub browser_pool_size: usize,

    /// Maximum number of requests holding a page at the same time (default: 16)
    pub max_concurrent_requests: usize,

    /// Upper bound for one request, navigation and capture included (default: 60 seconds)
    pub request_timeout: Duration,

    /// Backoff policy for navigation failures
    pub retry: RetryConfig,

    /// Default browser viewport, used when a request does not size its own
    pub viewport: Viewport,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Run Chrome with its sandbox enabled (default: false)
    ///
    /// Containers usually lack the namespaces the sandbox needs, so the
    /// default launches with `--no-sandbox --disable-setuid-sandbox`.
    pub sandbox: bool,

    /// Additional command-line flags appended to the Chrome launch
    pub extra_args: Vec<String>,

    /// Custom User-Agent string (default: Chrome default)
    pub user_agent: Option<String>,

    /// After loading, wait until at most two connections stay open for 500ms (default: true)
    pub wait_for_network_idle: bool,

    /// Delay before serializing a page for `/html` when the request has no `wait` (default: 1s)
    pub html_wait: Duration,

    /// Paper format for PDF captures when the request has no `format` (default: Letter)
    pub pdf_format: PaperFormat,

    /// Image format for `/screenshot` when the request has no `format` (default: PNG)
    pub output_format: OutputFormat,

    /// Style markers and class names used by the extraction pipeline
    pub markers: MarkerConfig,

    /// HTTP server settings
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_pool_size: num_cpus::get().clamp(1, 4),
            max_concurrent_requests: 16,
            request_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
            viewport: Viewport::default(),
            chrome_path: None,
            sandbox: false,
            extra_args: Vec::new(),
            user_agent: None,
            wait_for_network_idle: true,
            html_wait: Duration::from_millis(1000),
            pdf_format: PaperFormat::Letter,
            output_format: OutputFormat::Png,
            markers: MarkerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Apply the `PORT` environment override, ignoring unparsable values.
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.browser_pool_size == 0 {
            return Err(ScrapeError::ConfigurationError(
                "Browser pool size must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_requests == 0 {
            return Err(ScrapeError::ConfigurationError(
                "Max concurrent requests must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ScrapeError::ConfigurationError(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ScrapeError::ConfigurationError(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ScrapeError::ConfigurationError(
                "Retry attempts must be greater than 0".to_string(),
            ));
        }

        self.server.listen_addr()?;

        if self.markers.section_marker.is_empty() || self.markers.component_marker.is_empty() {
            return Err(ScrapeError::ConfigurationError(
                "Block markers must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Browser viewport configuration
///
/// # Examples
///
/// ```rust
/// use block_scraper::Viewport;
///
/// let desktop = Viewport::default();
/// assert_eq!((desktop.width, desktop.height), (1500, 1000));
///
/// let mobile = Viewport {
///     width: 375,
///     height: 667,
///     device_scale_factor: 2.0,
///     mobile: true,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1500)
    pub width: u32,

    /// Viewport height in pixels (default: 1000)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,

    /// Whether to emulate a mobile device (default: false)
    pub mobile: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 1000,
            device_scale_factor: 1.0,
            mobile: false,
        }
    }
}

impl Viewport {
    /// Same device settings with different dimensions.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self.clone()
        }
    }
}

/// Markers that drive block classification and collapsing
///
/// Classification is a raw substring search over each element's inline
/// `style` text, so the markers are matched exactly as written here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Substring of the inline style marking a section (default: `-block-section`)
    pub section_marker: String,

    /// Substring of the inline style marking a component (default: `-block-component`)
    pub component_marker: String,

    /// Class of elements whose text is trimmed before extraction (default: `code-edit`)
    pub code_edit_class: String,

    /// Class added to collapsed components, hidden by an injected rule (default: `block-collapsed`)
    pub collapsed_class: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            section_marker: "-block-section".to_string(),
            component_marker: "-block-component".to_string(),
            code_edit_class: "code-edit".to_string(),
            collapsed_class: "block-collapsed".to_string(),
        }
    }
}

impl MarkerConfig {
    /// The one style rule the pipeline injects into a page.
    pub fn collapse_rule(&self) -> String {
        format!(
            "{} {{ display: none !important; }}",
            crate::document::Query::class(self.collapsed_class.as_str()).to_css()
        )
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    pub bind: String,

    /// Listen port (default: 8080, overridden by `PORT`)
    pub port: u16,

    /// Largest accepted request body in bytes (default: 50 MiB)
    pub body_limit: usize,

    /// Port for the Prometheus exporter; disabled when unset
    pub metrics_port: Option<u16>,
}

impl ServerConfig {
    /// Socket address to listen on. IPv6 binds need no brackets.
    pub fn listen_addr(&self) -> Result<SocketAddr, ScrapeError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.port))
    }

    /// Address of the Prometheus exporter, when enabled.
    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>, ScrapeError> {
        self.metrics_port
            .map(|port| Ok(SocketAddr::new(self.bind_ip()?, port)))
            .transpose()
    }

    fn bind_ip(&self) -> Result<IpAddr, ScrapeError> {
        self.bind.trim().parse().map_err(|e| {
            ScrapeError::ConfigurationError(format!("Invalid bind address '{}': {}", self.bind, e))
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 50 * 1024 * 1024,
            metrics_port: None,
        }
    }
}

/// Supported output image formats for screenshots
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG format - lossless compression, best quality
    Png,
    /// JPEG format - lossy compression, smaller files
    Jpeg,
    /// WebP format
    Webp,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

/// Paper formats accepted for PDF captures
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
}

impl PaperFormat {
    /// Case-insensitive lookup by name.
    pub fn parse(value: &str) -> Option<Self> {
        let format = match value.to_ascii_lowercase().as_str() {
            "letter" => Self::Letter,
            "legal" => Self::Legal,
            "tabloid" => Self::Tabloid,
            "ledger" => Self::Ledger,
            "a0" => Self::A0,
            "a1" => Self::A1,
            "a2" => Self::A2,
            "a3" => Self::A3,
            "a4" => Self::A4,
            "a5" => Self::A5,
            "a6" => Self::A6,
            _ => return None,
        };
        Some(format)
    }

    /// Paper width and height in inches.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            Self::Letter => (8.5, 11.0),
            Self::Legal => (8.5, 14.0),
            Self::Tabloid => (11.0, 17.0),
            Self::Ledger => (17.0, 11.0),
            Self::A0 => (33.1, 46.8),
            Self::A1 => (23.4, 33.1),
            Self::A2 => (16.54, 23.4),
            Self::A3 => (11.7, 16.54),
            Self::A4 => (8.27, 11.7),
            Self::A5 => (5.83, 8.27),
            Self::A6 => (4.13, 5.83),
        }
    }
}

/// Exponential backoff for navigation retries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay as u64).min(self.max_delay)
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// Each pool instance gets its own user data directory so concurrent
/// browsers never contend for the profile singleton lock.
///
/// # Examples
///
/// ```rust
/// use block_scraper::{Config, get_chrome_args};
///
/// let config = Config::default();
/// let args = get_chrome_args(&config, 0);
/// assert!(args.contains(&"--no-sandbox".to_string()));
/// ```
pub fn get_chrome_args(config: &Config, instance_id: usize) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), instance_id);

    let mut args = vec![
        "--headless".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir={}", user_data_dir(instance_id).display()),
        format!("--temp-dir=/tmp/block-scraper-temp-{}", unique_id),
    ];

    if !config.sandbox {
        args.push("--no-sandbox".to_string());
        args.push("--disable-setuid-sandbox".to_string());
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args.extend(config.extra_args.iter().cloned());
    args
}

/// Profile directory for one pool instance.
pub fn user_data_dir(instance_id: usize) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "block-scraper-profile-{}-{}",
        std::process::id(),
        instance_id
    ))
}

pub fn create_browser_config(
    config: &Config,
    instance_id: usize,
) -> Result<chromiumoxide::browser::BrowserConfig, ScrapeError> {
    use chromiumoxide::browser::BrowserConfig;
    use chromiumoxide::handler::viewport::Viewport as ChromeViewport;

    let viewport = ChromeViewport {
        width: config.viewport.width,
        height: config.viewport.height,
        device_scale_factor: Some(config.viewport.device_scale_factor),
        emulating_mobile: config.viewport.mobile,
        is_landscape: config.viewport.width > config.viewport.height,
        has_touch: config.viewport.mobile,
    };

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .viewport(viewport)
        .args(get_chrome_args(config, instance_id));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ScrapeError::ConfigurationError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_file() {
        let config: Config = serde_json::from_str(r#"{"browser_pool_size": 3, "server": {"port": 9000}}"#)
            .unwrap();

        assert_eq!(config.browser_pool_size, 3);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.body_limit, 50 * 1024 * 1024);
        assert_eq!(config.markers.section_marker, "-block-section");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config {
            browser_pool_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ScrapeError::ConfigurationError(_))));

        let mut config = Config::default();
        config.viewport.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.markers.component_marker.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sandbox_flags() {
        let config = Config::default();
        let args = get_chrome_args(&config, 1);
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disable-setuid-sandbox".to_string()));
        assert!(args.contains(&"--window-size=1500,1000".to_string()));

        let config = Config {
            sandbox: true,
            extra_args: vec!["--lang=en-US".to_string()],
            ..Default::default()
        };
        let args = get_chrome_args(&config, 1);
        assert!(!args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--lang=en-US"));
    }

    #[test]
    fn test_paper_format() {
        assert_eq!(PaperFormat::parse("a4"), Some(PaperFormat::A4));
        assert_eq!(PaperFormat::parse("LETTER"), Some(PaperFormat::Letter));
        assert_eq!(PaperFormat::parse("folio"), None);
        assert_eq!(PaperFormat::Letter.dimensions(), (8.5, 11.0));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(0), Duration::from_millis(250));
        assert_eq!(retry.delay_for(1), Duration::from_millis(500));
        assert_eq!(retry.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_listen_addr() {
        let config = ServerConfig {
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:9000".parse().unwrap());

        let config = ServerConfig {
            bind: "::1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.listen_addr().unwrap(), "[::1]:8080".parse().unwrap());

        let config = ServerConfig {
            bind: "localhost:80".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.listen_addr(),
            Err(ScrapeError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_metrics_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.metrics_addr().unwrap(), None);

        let config = ServerConfig {
            bind: "127.0.0.1".to_string(),
            metrics_port: Some(9090),
            ..Default::default()
        };
        assert_eq!(config.metrics_addr().unwrap(), Some("127.0.0.1:9090".parse().unwrap()));
    }

    #[test]
    fn test_collapse_rule() {
        let markers = MarkerConfig::default();
        assert_eq!(
            markers.collapse_rule(),
            ".block-collapsed { display: none !important; }"
        );

        let markers = MarkerConfig {
            collapsed_class: "is:hidden".to_string(),
            ..Default::default()
        };
        assert_eq!(
            markers.collapse_rule(),
            ".is\\:hidden { display: none !important; }"
        );
    }
}
