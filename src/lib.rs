//! # Block Scraper
//!
//! Extracts the layout blocks of a rendered web page. Elements whose inline
//! style carries a section or component marker are classified, duplicate
//! members of a `data-group` are pruned, repeated component styles inside a
//! section are collapsed, and every distinct block is reported with its
//! geometry and outer markup next to a full-page screenshot.
//!
//! Pages are rendered by a pool of headless Chrome instances driven through
//! the DevTools protocol. The same pool also serves plain screenshots, PDF
//! prints and serialized markup.
//!
//! ## Pipeline
//!
//! The extraction core runs against the [`document::DocumentTree`] trait, so
//! it works the same on a live Chrome page and on the in-memory tree used by
//! the tests and benchmarks:
//!
//! ```rust
//! use block_scraper::document::{MemoryDocument, Rect};
//! use block_scraper::BlockExtractor;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut doc = MemoryDocument::new();
//! let root = doc.root();
//! for (group, top) in [("hero", 0.0), ("hero", 400.0), ("footer", 800.0)] {
//!     let node = doc.append_element(root, "div", &[("style", "-block-section"), ("data-group", group)]);
//!     doc.append_text(node, group);
//!     doc.set_rect(node, Rect::new(0.0, top, 1500.0, 400.0));
//! }
//!
//! let blocks = BlockExtractor::default().extract(&mut doc).await.unwrap();
//! assert_eq!(blocks.sections.len(), 2);
//! assert_eq!(blocks.stats.pruned, 1);
//! # }
//! ```
//!
//! ## Service
//!
//! ```rust,no_run
//! use block_scraper::{Config, PageRequest, PageService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = PageService::new(Config::default()).await?;
//!
//!     let report = service.scrape(&PageRequest::from_url("https://example.com")).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! block-scraper serve --port 8080
//! block-scraper scrape --url https://example.com --pretty
//! block-scraper screenshot --url https://example.com --selector '#hero' --format jpeg
//! block-scraper pdf --html-file page.html --paper A4 --output page.pdf
//! ```

/// Configuration and settings for the scraper
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Document access for the extraction pipeline
pub mod document;

/// Section and component extraction
pub mod extraction;

/// Browser pool management for concurrent Chrome instances
pub mod browser_pool;

/// Page loading and captures on pooled browsers
pub mod page_service;

/// Request bodies for the HTTP API and the CLI
pub mod request;

/// HTTP API
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// Metrics collection and Prometheus export
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use browser_pool::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use extraction::{BlockExtractor, BlockRecord, ExtractedBlocks, ExtractionStats, Report};
pub use crate::metrics::*;
pub use page_service::*;
pub use request::*;
pub use server::*;
pub use utils::*;
