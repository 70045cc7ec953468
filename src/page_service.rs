//! Page captures on top of the browser pool
//!
//! Every operation loads its target into a fresh page, optionally resizes the
//! viewport, and produces one artifact: a block report, an image, a PDF or the
//! serialized markup. Navigation and capture share one deadline derived from
//! `Config::request_timeout`.

use crate::browser_pool::{BrowserHandle, BrowserPool};
use crate::document::ChromeDocument;
use crate::extraction::{BlockExtractor, Report};
use crate::metrics::Metrics;
use crate::request::{PageRequest, PageSource, RequestOptions};
use crate::utils::CaptureTarget;
use crate::{Config, OutputFormat, ScrapeError, Viewport};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, FrameId, PrintToPdfParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// An encoded image and its format
#[derive(Debug, Clone)]
pub struct ImageCapture {
    pub data: Vec<u8>,
    pub format: OutputFormat,
}

/// A loaded page and the browser it lives on
struct PageSession {
    handle: BrowserHandle,
    page: Page,
}

impl PageSession {
    /// Close the page, flagging the browser when the failure came from it.
    async fn finish<T>(self, result: Result<T, ScrapeError>) -> Result<T, ScrapeError> {
        let failed = matches!(
            result,
            Err(ScrapeError::PageError(_)) | Err(ScrapeError::BrowserUnavailable)
        );
        self.close(failed).await;
        result
    }

    async fn close(self, failed: bool) {
        if failed {
            self.handle.mark_failed();
        }
        if let Err(e) = self.page.close().await {
            debug!("Page did not close cleanly: {}", e);
        }
    }
}

/// Scrapes and captures pages on pooled browsers
///
/// # Examples
///
/// ```rust,no_run
/// use block_scraper::{Config, PageRequest, PageService};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = PageService::new(Config::default()).await?;
///
///     let report = service.scrape(&PageRequest::from_url("https://example.com")).await?;
///     println!("{} sections, {} components", report.sections.len(), report.components.len());
///
///     service.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct PageService {
    browser_pool: Arc<BrowserPool>,
    config: Config,
    extractor: BlockExtractor,
    limiter: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl PageService {
    pub async fn new(config: Config) -> Result<Self, ScrapeError> {
        Self::with_metrics(config, Arc::new(Metrics::new())).await
    }

    pub async fn with_metrics(config: Config, metrics: Arc<Metrics>) -> Result<Self, ScrapeError> {
        config.validate()?;
        let browser_pool = Arc::new(BrowserPool::new(config.clone()).await?);

        Ok(Self {
            browser_pool,
            extractor: BlockExtractor::new(config.markers.clone()),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            metrics,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn browser_pool(&self) -> &BrowserPool {
        &self.browser_pool
    }

    /// Extract sections and components, then capture the mutated page.
    pub async fn scrape(&self, request: &PageRequest) -> Result<Report, ScrapeError> {
        self.track("scrape", async {
            let deadline = self.deadline();
            let session = self.open(request, deadline).await?;
            let result = self
                .before(deadline, self.scrape_page(&session.page, &request.options))
                .await;
            session.finish(result).await
        })
        .await
    }

    pub async fn screenshot(&self, request: &PageRequest) -> Result<ImageCapture, ScrapeError> {
        self.track("screenshot", async {
            let deadline = self.deadline();
            let session = self.open(request, deadline).await?;
            let result = self
                .before(deadline, self.capture_image(&session.page, &request.options))
                .await;
            session.finish(result).await
        })
        .await
    }

    pub async fn pdf(&self, request: &PageRequest) -> Result<Vec<u8>, ScrapeError> {
        self.track("pdf", async {
            let deadline = self.deadline();
            let session = self.open(request, deadline).await?;
            let result = self
                .before(deadline, self.print_pdf(&session.page, &request.options))
                .await;
            session.finish(result).await
        })
        .await
    }

    pub async fn html(&self, request: &PageRequest) -> Result<String, ScrapeError> {
        self.track("html", async {
            let deadline = self.deadline();
            let session = self.open(request, deadline).await?;
            let result = self
                .before(deadline, self.serialize(&session.page, &request.options))
                .await;
            session.finish(result).await
        })
        .await
    }

    pub async fn shutdown(&self) {
        info!("Shutting down page service...");
        self.limiter.close();
        self.browser_pool.shutdown().await;
    }

    /// Bounds concurrency and records the outcome.
    async fn track<T>(
        &self,
        kind: &str,
        operation: impl Future<Output = Result<T, ScrapeError>>,
    ) -> Result<T, ScrapeError> {
        let _permit = self.limiter.acquire().await?;
        self.metrics.active_requests.increment(1.0);
        let start = std::time::Instant::now();

        let result = operation.await;

        self.metrics.active_requests.decrement(1.0);
        self.metrics.record_request(start.elapsed(), result.as_ref().map(|_| ()));
        match &result {
            Ok(_) => info!("{} finished in {:?}", kind, start.elapsed()),
            Err(e) => error!("{} failed after {:?}: {}", kind, start.elapsed(), e),
        }
        result
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.request_timeout
    }

    async fn before<T>(
        &self,
        deadline: Instant,
        operation: impl Future<Output = Result<T, ScrapeError>>,
    ) -> Result<T, ScrapeError> {
        timeout_at(deadline, operation)
            .await
            .map_err(|_| ScrapeError::Timeout(self.config.request_timeout))?
    }

    /// Load the request's page, retrying transient failures with backoff,
    /// and size its viewport.
    async fn open(&self, request: &PageRequest, deadline: Instant) -> Result<PageSession, ScrapeError> {
        let source = request.source()?;
        let attempts = self.config.retry.max_attempts;
        let mut attempt = 0;

        let session = loop {
            match self.open_once(&source, deadline).await {
                Ok(session) => break session,
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(
                        "Loading page failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        attempts,
                        delay,
                        e
                    );
                    self.metrics.record_retry();
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        if let Some(viewport) = request.options.viewport(&self.config.viewport) {
            let sized = self.before(deadline, apply_viewport(&session.page, &viewport)).await;
            if let Err(e) = sized {
                session.close(false).await;
                return Err(e);
            }
        }
        Ok(session)
    }

    /// One load attempt. The page is created outside the deadline so that a
    /// timed-out load still closes it.
    async fn open_once(&self, source: &PageSource, deadline: Instant) -> Result<PageSession, ScrapeError> {
        let handle = self.before(deadline, self.browser_pool.get_browser()).await?;
        let page = match handle.new_page().await {
            Ok(page) => page,
            Err(e) => {
                handle.mark_failed();
                return Err(e);
            }
        };
        let session = PageSession { handle, page };

        if let Err(e) = self.before(deadline, self.load(&session.page, source)).await {
            session.close(false).await;
            return Err(e);
        }

        debug!("Page loaded on browser {}", session.handle.instance_id);
        Ok(session)
    }

    async fn load(&self, page: &Page, source: &PageSource) -> Result<(), ScrapeError> {
        // subscribe before loading so no lifecycle event is missed
        let lifecycle = if self.config.wait_for_network_idle {
            Some(page.event_listener::<EventLifecycleEvent>().await?)
        } else {
            None
        };

        match source {
            PageSource::Url(url) => {
                debug!("Navigating to {}", url);
                page.goto(url.as_str())
                    .await
                    .map_err(|e| ScrapeError::NavigationFailed(format!("{}: {}", url, e)))?;
            }
            PageSource::Html(html) => {
                debug!("Loading {} bytes of inline markup", html.len());
                page.set_content(html.as_str())
                    .await
                    .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;
            }
        }

        if let Some(events) = lifecycle {
            let main_frame = page.mainframe().await?;
            wait_for_network_idle(events, main_frame.as_ref()).await?;
        }
        Ok(())
    }

    async fn scrape_page(&self, page: &Page, options: &RequestOptions) -> Result<Report, ScrapeError> {
        let mut document = ChromeDocument::new(page);
        let blocks = self.extractor.extract(&mut document).await?;
        self.metrics.record_extraction(&blocks);

        let target = CaptureTarget::new(options.file.as_deref(), "png")?;
        target.prepare().await?;
        page.save_screenshot(full_page_params(), target.path())
            .await
            .map_err(|e| ScrapeError::CaptureFailed(e.to_string()))?;
        let image = target.read().await?;
        if let Err(e) = target.close() {
            warn!("Temporary capture was not removed: {}", e);
        }

        Ok(blocks.into_report(&image))
    }

    async fn capture_image(&self, page: &Page, options: &RequestOptions) -> Result<ImageCapture, ScrapeError> {
        let png = match &options.selector {
            Some(selector) => {
                let element = page
                    .find_element(selector.as_str())
                    .await
                    .map_err(|_| ScrapeError::ElementNotFound(selector.clone()))?;
                element
                    .screenshot(CaptureScreenshotFormat::Png)
                    .await
                    .map_err(|e| ScrapeError::CaptureFailed(e.to_string()))?
            }
            None => page
                .screenshot(full_page_params())
                .await
                .map_err(|e| ScrapeError::CaptureFailed(e.to_string()))?,
        };

        let format = options.image_format(self.config.output_format);
        let data = encode_image(png, format)?;

        if let Some(file) = &options.file {
            crate::utils::write_capture(file, &data).await?;
        }
        Ok(ImageCapture { data, format })
    }

    async fn print_pdf(&self, page: &Page, options: &RequestOptions) -> Result<Vec<u8>, ScrapeError> {
        let (width, height) = options.paper_format(self.config.pdf_format).dimensions();
        let params = PrintToPdfParams::builder()
            .print_background(true)
            .paper_width(width)
            .paper_height(height)
            .build();

        let data = page
            .pdf(params)
            .await
            .map_err(|e| ScrapeError::CaptureFailed(e.to_string()))?;

        if let Some(file) = &options.file {
            crate::utils::write_capture(file, &data).await?;
        }
        Ok(data)
    }

    async fn serialize(&self, page: &Page, options: &RequestOptions) -> Result<String, ScrapeError> {
        sleep(options.wait_or(self.config.html_wait)).await;
        page.content()
            .await
            .map_err(|e| ScrapeError::PageError(e.to_string()))
    }
}

/// Wait for the main frame's `networkAlmostIdle` lifecycle event: no more
/// than two open connections for half a second. Only events after the
/// load's `init` count, so an idle signal from `about:blank` is ignored.
async fn wait_for_network_idle<S>(mut events: S, main_frame: Option<&FrameId>) -> Result<(), ScrapeError>
where
    S: Stream<Item = Arc<EventLifecycleEvent>> + Unpin,
{
    let mut started = false;
    while let Some(event) = events.next().await {
        if main_frame.is_some_and(|frame| *frame != event.frame_id) {
            continue;
        }
        match event.name.as_str() {
            "init" => started = true,
            "networkAlmostIdle" | "networkIdle" if started => return Ok(()),
            _ => {}
        }
    }
    Err(ScrapeError::NavigationFailed(
        "page closed before the network settled".to_string(),
    ))
}

fn full_page_params() -> ScreenshotParams {
    ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .full_page(true)
        .build()
}

async fn apply_viewport(page: &Page, viewport: &Viewport) -> Result<(), ScrapeError> {
    let params = SetDeviceMetricsOverrideParams::builder()
        .width(viewport.width)
        .height(viewport.height)
        .device_scale_factor(viewport.device_scale_factor)
        .mobile(viewport.mobile)
        .build()
        .map_err(ScrapeError::PageError)?;

    page.execute(params).await?;
    Ok(())
}

/// Re-encode a PNG capture in the requested format.
pub fn encode_image(png: Vec<u8>, format: OutputFormat) -> Result<Vec<u8>, ScrapeError> {
    let target = match format {
        OutputFormat::Png => return Ok(png),
        OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        OutputFormat::Webp => image::ImageFormat::WebP,
    };

    let decoded = image::load_from_memory(&png)
        .map_err(|e| ScrapeError::CaptureFailed(e.to_string()))?;
    // JPEG has no alpha channel
    let decoded = match format {
        OutputFormat::Jpeg => image::DynamicImage::ImageRgb8(decoded.to_rgb8()),
        _ => decoded,
    };

    let mut encoded = Vec::new();
    decoded
        .write_to(&mut std::io::Cursor::new(&mut encoded), target)
        .map_err(|e| ScrapeError::CaptureFailed(e.to_string()))?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 30, 30, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[test]
    fn test_png_passes_through() {
        let png = sample_png();
        assert_eq!(encode_image(png.clone(), OutputFormat::Png).unwrap(), png);
    }

    #[test]
    fn test_jpeg_conversion() {
        let jpeg = encode_image(sample_png(), OutputFormat::Jpeg).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    fn lifecycle(frame: &str, name: &str) -> Arc<EventLifecycleEvent> {
        let event = serde_json::json!({
            "frameId": frame,
            "loaderId": "loader",
            "name": name,
            "timestamp": 1.0
        });
        Arc::new(serde_json::from_value(event).unwrap())
    }

    #[tokio::test]
    async fn test_network_idle_waits_for_the_new_load() {
        let main = FrameId::new("main");
        let mut events = futures::stream::iter(vec![
            // left over from about:blank
            lifecycle("main", "networkAlmostIdle"),
            lifecycle("main", "init"),
            lifecycle("child", "networkAlmostIdle"),
            lifecycle("main", "load"),
            lifecycle("main", "networkAlmostIdle"),
            lifecycle("main", "networkIdle"),
        ]);

        wait_for_network_idle(&mut events, Some(&main)).await.unwrap();

        let next = events.next().await.unwrap();
        assert_eq!(next.name, "networkIdle");
    }

    #[tokio::test]
    async fn test_network_idle_fails_when_events_stop() {
        let main = FrameId::new("main");
        let events = futures::stream::iter(vec![lifecycle("main", "init"), lifecycle("main", "load")]);

        let result = wait_for_network_idle(events, Some(&main)).await;

        assert!(matches!(result, Err(ScrapeError::NavigationFailed(_))));
    }

    #[test]
    fn test_invalid_capture_is_reported() {
        let err = encode_image(b"not an image".to_vec(), OutputFormat::Webp).unwrap_err();
        assert!(matches!(err, ScrapeError::CaptureFailed(_)));
    }
}
