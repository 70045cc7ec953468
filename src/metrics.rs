use crate::extraction::ExtractedBlocks;
use crate::ScrapeError;
use metrics::{
    increment_counter, register_counter, register_gauge, register_histogram, Counter, Gauge,
    Histogram,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Handles registered against the global recorder
///
/// Registration happens in [`Metrics::new`], so the Prometheus exporter has
/// to be installed first for the handles to report anywhere. Without a
/// recorder every handle is a no-op.
pub struct Metrics {
    pub pages_scraped: Counter,
    pub requests_failed: Counter,
    pub request_duration: Histogram,
    pub sections_emitted: Counter,
    pub components_emitted: Counter,
    pub elements_pruned: Counter,
    pub components_collapsed: Counter,
    pub extraction_failures: Counter,
    pub navigation_retries: Counter,
    pub active_requests: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pages_scraped: register_counter!("block_scraper_pages_scraped_total"),
            requests_failed: register_counter!("block_scraper_requests_failed_total"),
            request_duration: register_histogram!("block_scraper_request_duration_seconds"),
            sections_emitted: register_counter!("block_scraper_sections_total"),
            components_emitted: register_counter!("block_scraper_components_total"),
            elements_pruned: register_counter!("block_scraper_pruned_elements_total"),
            components_collapsed: register_counter!("block_scraper_collapsed_components_total"),
            extraction_failures: register_counter!("block_scraper_extraction_failures_total"),
            navigation_retries: register_counter!("block_scraper_navigation_retries_total"),
            active_requests: register_gauge!("block_scraper_active_requests"),
        }
    }

    pub fn record_request(&self, duration: Duration, outcome: Result<(), &ScrapeError>) {
        self.request_duration.record(duration.as_secs_f64());
        if let Err(error) = outcome {
            self.requests_failed.increment(1);
            increment_counter!("block_scraper_errors_total", "kind" => error.kind());
        }
    }

    pub fn record_extraction(&self, blocks: &ExtractedBlocks) {
        self.pages_scraped.increment(1);
        self.sections_emitted.increment(blocks.sections.len() as u64);
        self.components_emitted.increment(blocks.components.len() as u64);
        self.elements_pruned.increment(blocks.stats.pruned as u64);
        self.components_collapsed.increment(blocks.stats.collapsed as u64);
        self.extraction_failures.increment(blocks.stats.failures as u64);
    }

    pub fn record_retry(&self) {
        self.navigation_retries.increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `/metrics` in the Prometheus text format
pub struct PrometheusExporter {
    addr: SocketAddr,
}

impl PrometheusExporter {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Install the global recorder and its HTTP listener. Must run inside
    /// the tokio runtime.
    pub fn start(&self) -> Result<(), ScrapeError> {
        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| ScrapeError::ConfigurationError(format!("Metrics exporter: {}", e)))?;

        info!("Prometheus metrics available on http://{}/metrics", self.addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_without_recorder_are_noops() {
        let metrics = Metrics::new();
        metrics.record_request(Duration::from_millis(20), Ok(()));
        metrics.record_request(
            Duration::from_millis(20),
            Err(&ScrapeError::InvalidRequest("empty".to_string())),
        );
        metrics.record_extraction(&ExtractedBlocks::default());
        metrics.record_retry();
    }
}
