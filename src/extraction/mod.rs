//! Page-content extraction pipeline
//!
//! Runs strictly in order against one rendered document:
//! 1. inject the collapse rule
//! 2. [`classify`]: role labels from style markers, code-edit text trimming
//! 3. [`prune_groups`]: one element per `data-group` value survives
//! 4. [`collect_sections`]: collapse redundant components per section, then
//!    record each distinct section
//! 5. [`collect_components`]: record each distinct component
//!
//! Each output list has its own [`ContentDeduplicator`]. Collapsed components
//! keep their place in the component list with zero geometry, and their
//! markup differs from a visible twin, so content dedup never merges them.

pub mod classifier;
pub mod collapser;
pub mod dedup;
pub mod extractor;
pub mod pruner;
pub mod report;

pub use classifier::{classify, Classification};
pub use collapser::{collapse_components, style_key};
pub use dedup::ContentDeduplicator;
pub use extractor::{collect_components, collect_sections, BlockList};
pub use pruner::prune_groups;
pub use report::{BlockRecord, Report};

use crate::document::DocumentTree;
use crate::{MarkerConfig, ScrapeError};
use std::time::Instant;
use tracing::{debug, info};

/// Section and component lists from one run
#[derive(Debug, Clone, Default)]
pub struct ExtractedBlocks {
    pub sections: Vec<BlockRecord>,
    pub components: Vec<BlockRecord>,
    pub stats: ExtractionStats,
}

impl ExtractedBlocks {
    /// Pair the blocks with a capture taken after extraction.
    pub fn into_report(self, image: &[u8]) -> Report {
        Report::assemble(self.sections, self.components, image)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub classification: Classification,
    pub pruned: usize,
    pub collapsed: usize,
    pub duplicates: usize,
    pub failures: usize,
}

/// Runs the pipeline with a fixed set of markers
///
/// # Examples
///
/// ```rust
/// use block_scraper::document::{MemoryDocument, Rect};
/// use block_scraper::{BlockExtractor, MarkerConfig};
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut doc = MemoryDocument::new();
/// let root = doc.root();
/// let hero = doc.append_element(root, "div", &[("style", "-block-section")]);
/// doc.set_rect(hero, Rect::new(0.0, 0.0, 1500.0, 400.0));
///
/// let blocks = BlockExtractor::new(MarkerConfig::default())
///     .extract(&mut doc)
///     .await
///     .unwrap();
/// assert_eq!(blocks.sections.len(), 1);
/// assert_eq!(blocks.sections[0].width, 1500.0);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockExtractor {
    markers: MarkerConfig,
}

impl BlockExtractor {
    pub fn new(markers: MarkerConfig) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &MarkerConfig {
        &self.markers
    }

    pub async fn extract<D: DocumentTree>(&self, doc: &mut D) -> Result<ExtractedBlocks, ScrapeError> {
        let start = Instant::now();

        doc.inject_style(&self.markers.collapse_rule()).await?;

        let classification = classify(doc, &self.markers).await?;
        let pruned = prune_groups(doc).await?;
        debug!("Pruned {} duplicate group members", pruned);

        let sections = collect_sections(doc, &self.markers.collapsed_class).await?;
        let components = collect_components(doc).await?;

        let stats = ExtractionStats {
            classification,
            pruned,
            collapsed: sections.collapsed,
            duplicates: sections.duplicates + components.duplicates,
            failures: sections.failures + components.failures,
        };

        info!(
            "Extracted {} sections and {} components in {:?} ({} pruned, {} collapsed, {} skipped)",
            sections.records.len(),
            components.records.len(),
            start.elapsed(),
            stats.pruned,
            stats.collapsed,
            stats.failures
        );

        Ok(ExtractedBlocks {
            sections: sections.records,
            components: components.records,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryDocument, NodeId, Rect};

    const SECTION_STYLE: &str = "background:url(hero.png); -block-section-marker";

    fn hero(doc: &mut MemoryDocument, group: &str, top: f64) -> NodeId {
        let root = doc.root();
        let node = doc.append_element(root, "div", &[("style", SECTION_STYLE), ("data-group", group)]);
        doc.append_text(node, "Same content");
        doc.set_rect(node, Rect::new(0.0, top, 1500.0, 400.0));
        node
    }

    #[tokio::test]
    async fn test_distinct_groups_yield_two_sections() {
        let mut doc = MemoryDocument::new();
        hero(&mut doc, "a", 0.0);
        hero(&mut doc, "b", 400.0);

        let blocks = BlockExtractor::default().extract(&mut doc).await.unwrap();

        assert_eq!(blocks.sections.len(), 2);
        assert_eq!(blocks.sections[0].style.as_deref(), Some("a"));
        assert_eq!(blocks.sections[1].top, 400.0);
    }

    #[tokio::test]
    async fn test_shared_group_yields_first_section() {
        let mut doc = MemoryDocument::new();
        let first = hero(&mut doc, "a", 0.0);
        hero(&mut doc, "a", 400.0);

        let blocks = BlockExtractor::default().extract(&mut doc).await.unwrap();

        assert_eq!(blocks.stats.pruned, 1);
        assert_eq!(blocks.sections.len(), 1);
        assert_eq!(blocks.sections[0].top, 0.0);
        assert_eq!(blocks.sections[0].html, doc.html(first));
    }

    #[tokio::test]
    async fn test_collapse_rule_is_injected_once() {
        let mut doc = MemoryDocument::new();
        BlockExtractor::default().extract(&mut doc).await.unwrap();

        assert_eq!(doc.stylesheets().len(), 1);
        assert!(doc.stylesheets()[0].contains("display: none"));
    }
}
