use crate::request::{PageRequest, RequestOptions};
use crate::server::HttpServer;
use crate::utils::{capture_file_name, format_bytes, format_duration, write_capture};
use crate::{Config, Metrics, PageService, ScrapeError};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "block-scraper")]
#[command(about = "Extract layout blocks and captures from rendered web pages")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Browser pool size")]
    pub pool_size: Option<usize>,

    #[arg(long, help = "Maximum concurrent requests")]
    pub max_concurrent: Option<usize>,

    #[arg(long, help = "Request timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(short, long, help = "Server port (default: $PORT or 8080)")]
        port: Option<u16>,

        #[arg(long, help = "Bind address")]
        bind: Option<String>,

        #[arg(long, help = "Expose Prometheus metrics on this port")]
        metrics_port: Option<u16>,
    },

    /// Extract sections and components as JSON
    Scrape {
        #[command(flatten)]
        page: PageArgs,

        #[arg(short, long, help = "Write the report here instead of stdout")]
        output: Option<PathBuf>,

        #[arg(long, help = "Also keep the full-page capture at this path")]
        screenshot: Option<PathBuf>,

        #[arg(long, help = "Pretty-print the report")]
        pretty: bool,
    },

    /// Capture a page or one element as an image
    Screenshot {
        #[command(flatten)]
        page: PageArgs,

        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(long, help = "CSS selector for element screenshot")]
        selector: Option<String>,

        #[arg(long, help = "Output format (png, jpeg, webp)")]
        format: Option<String>,
    },

    /// Print a page to PDF
    Pdf {
        #[command(flatten)]
        page: PageArgs,

        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(long, help = "Paper format (Letter, Legal, Tabloid, Ledger, A0-A6)")]
        paper: Option<String>,
    },

    /// Dump the rendered markup
    Html {
        #[command(flatten)]
        page: PageArgs,

        #[arg(short, long, help = "Write the markup here instead of stdout")]
        output: Option<PathBuf>,

        #[arg(long, help = "Milliseconds to wait before serializing")]
        wait: Option<u64>,
    },

    /// Validate configuration
    Validate {
        #[arg(help = "Configuration file to validate")]
        config: PathBuf,
    },
}

/// Page source and viewport shared by the capture commands
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    #[arg(short, long, help = "URL to load", required_unless_present = "html_file")]
    pub url: Option<String>,

    #[arg(long, help = "HTML file to load instead of a URL", conflicts_with = "url")]
    pub html_file: Option<PathBuf>,

    #[arg(long, help = "Viewport width")]
    pub width: Option<u32>,

    #[arg(long, help = "Viewport height")]
    pub height: Option<u32>,

    #[arg(long, help = "Keep the default viewport and capture the whole page")]
    pub full_page: bool,
}

impl PageArgs {
    pub async fn to_request(&self, options: RequestOptions) -> Result<PageRequest, ScrapeError> {
        let html = match &self.html_file {
            Some(path) => Some(fs::read_to_string(path).await?),
            None => None,
        };

        Ok(PageRequest {
            url: self.url.clone(),
            html,
            options: RequestOptions {
                width: self.width,
                height: self.height,
                full_page: self.full_page,
                ..options
            },
        })
    }
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(pool_size) = self.pool_size {
            config.browser_pool_size = pool_size;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent_requests = max_concurrent;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }

        if let Commands::Serve {
            port,
            bind,
            metrics_port,
        } = &self.command
        {
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind.clone();
            }
            if metrics_port.is_some() {
                config.server.metrics_port = *metrics_port;
            }
        }
    }
}

/// Configuration file (or defaults), then `PORT`, then command-line flags.
pub async fn load_config(args: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => read_config(path).await?,
        None => Config::default(),
    };

    config.apply_env();
    args.apply_overrides(&mut config);
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Browser pool size: {}", config.browser_pool_size);
    info!("Max concurrent requests: {}", config.max_concurrent_requests);
    info!("Request timeout: {:?}", config.request_timeout);

    Ok(config)
}

async fn read_config(path: &Path) -> Result<Config, ScrapeError> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Check a configuration file without launching any browser.
pub async fn validate_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration: {}", config_path.display());

    let config = read_config(config_path).await?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Browser pool size: {}", config.browser_pool_size);
    println!("  Max concurrent: {}", config.max_concurrent_requests);
    println!("  Timeout: {:?}", config.request_timeout);
    println!(
        "  Viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );
    println!(
        "  Markers: section '{}', component '{}'",
        config.markers.section_marker, config.markers.component_marker
    );
    println!("  Listen: {}:{}", config.server.bind, config.server.port);

    Ok(())
}

pub struct CliRunner {
    pub config: Config,
    pub service: Arc<PageService>,
}

impl CliRunner {
    pub async fn new(config: Config, metrics: Arc<Metrics>) -> Result<Self, Box<dyn std::error::Error>> {
        let service = Arc::new(PageService::with_metrics(config.clone(), metrics).await?);
        Ok(Self { config, service })
    }

    pub async fn run(
        &self,
        command: Commands,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Commands::Serve { .. } => {
                HttpServer::new(self.config.server.clone(), self.service.clone())
                    .run(shutdown)
                    .await?;
                Ok(())
            }
            Commands::Scrape {
                page,
                output,
                screenshot,
                pretty,
            } => self.run_scrape(page, output, screenshot, pretty).await,
            Commands::Screenshot {
                page,
                output,
                selector,
                format,
            } => self.run_screenshot(page, output, selector, format).await,
            Commands::Pdf {
                page,
                output,
                paper,
            } => self.run_pdf(page, output, paper).await,
            Commands::Html { page, output, wait } => self.run_html(page, output, wait).await,
            Commands::Validate { config } => validate_config(&config).await,
        }
    }

    async fn run_scrape(
        &self,
        page: PageArgs,
        output: Option<PathBuf>,
        screenshot: Option<PathBuf>,
        pretty: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = page
            .to_request(RequestOptions {
                file: screenshot,
                ..Default::default()
            })
            .await?;

        let start = Instant::now();
        let report = self.service.scrape(&request).await?;
        let json = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };

        info!(
            "Scraped {} sections and {} components in {}",
            report.sections.len(),
            report.components.len(),
            format_duration(start.elapsed())
        );
        emit(output.as_deref(), json.as_bytes()).await
    }

    async fn run_screenshot(
        &self,
        page: PageArgs,
        output: Option<PathBuf>,
        selector: Option<String>,
        format: Option<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = page
            .to_request(RequestOptions {
                selector,
                format,
                ..Default::default()
            })
            .await?;

        let start = Instant::now();
        let capture = self.service.screenshot(&request).await?;
        let path = output.unwrap_or_else(|| {
            PathBuf::from(capture_file_name(page.url.as_deref(), capture.format.extension()))
        });
        write_capture(&path, &capture.data).await?;

        println!(
            "Screenshot saved to {} ({}, {})",
            path.display(),
            format_bytes(capture.data.len()),
            format_duration(start.elapsed())
        );
        Ok(())
    }

    async fn run_pdf(
        &self,
        page: PageArgs,
        output: Option<PathBuf>,
        paper: Option<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = page
            .to_request(RequestOptions {
                format: paper,
                ..Default::default()
            })
            .await?;

        let start = Instant::now();
        let data = self.service.pdf(&request).await?;
        let path = output.unwrap_or_else(|| PathBuf::from(capture_file_name(page.url.as_deref(), "pdf")));
        write_capture(&path, &data).await?;

        println!(
            "PDF saved to {} ({}, {})",
            path.display(),
            format_bytes(data.len()),
            format_duration(start.elapsed())
        );
        Ok(())
    }

    async fn run_html(
        &self,
        page: PageArgs,
        output: Option<PathBuf>,
        wait: Option<u64>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = page
            .to_request(RequestOptions {
                wait: wait.map(Duration::from_millis),
                ..Default::default()
            })
            .await?;

        let markup = self.service.html(&request).await?;
        emit(output.as_deref(), markup.as_bytes()).await
    }
}

/// Write to `output`, or to stdout when no path was given.
async fn emit(output: Option<&Path>, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            write_capture(path, data).await?;
            info!("Wrote {} to {}", format_bytes(data.len()), path.display());
        }
        None => {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scrape() {
        let cli = Cli::try_parse_from([
            "block-scraper",
            "scrape",
            "--url",
            "https://example.com",
            "--width",
            "1280",
            "--pretty",
        ])
        .unwrap();

        match cli.command {
            Commands::Scrape { page, output, pretty, .. } => {
                assert_eq!(page.url.as_deref(), Some("https://example.com"));
                assert_eq!(page.width, Some(1280));
                assert!(output.is_none());
                assert!(pretty);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_page_commands_need_a_source() {
        assert!(Cli::try_parse_from(["block-scraper", "html"]).is_err());
        assert!(Cli::try_parse_from([
            "block-scraper",
            "pdf",
            "--url",
            "https://example.com",
            "--html-file",
            "page.html",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["block-scraper", "pdf", "--html-file", "page.html"]).is_ok());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "block-scraper",
            "--pool-size",
            "2",
            "--timeout",
            "15",
            "serve",
            "--port",
            "3000",
            "--metrics-port",
            "9100",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.browser_pool_size, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.metrics_port, Some(9100));
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_page_args_read_html_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "<p>hello</p>").await.unwrap();

        let args = PageArgs {
            url: None,
            html_file: Some(path.clone()),
            width: Some(800),
            height: None,
            full_page: false,
        };
        let request = args
            .to_request(RequestOptions {
                selector: Some("#hero".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(request.html.as_deref(), Some("<p>hello</p>"));
        assert_eq!(request.options.width, Some(800));
        assert_eq!(request.options.selector.as_deref(), Some("#hero"));
    }

    #[tokio::test]
    async fn test_validate_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"browser_pool_size": 0}"#).await.unwrap();
        assert!(validate_config(&path).await.is_err());

        fs::write(&path, r#"{"browser_pool_size": 2}"#).await.unwrap();
        assert!(validate_config(&path).await.is_ok());
    }
}
