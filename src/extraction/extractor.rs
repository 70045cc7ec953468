use super::collapser::{collapse_components, style_key};
use super::dedup::ContentDeduplicator;
use super::report::BlockRecord;
use crate::document::{DocumentTree, Role, BLOCK_ATTR};
use crate::ScrapeError;
use tracing::warn;

/// Records of one pass plus the bookkeeping the caller logs.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    pub records: Vec<BlockRecord>,
    pub duplicates: usize,
    pub failures: usize,
    pub collapsed: usize,
}

/// Read one block, unless its markup is already in the list.
async fn read_block<D: DocumentTree>(
    doc: &D,
    node: &D::Node,
    dedup: &mut ContentDeduplicator,
) -> Result<Option<BlockRecord>, ScrapeError> {
    let html = doc.outer_html(node).await?;
    if dedup.contains(&html) {
        return Ok(None);
    }

    let rect = doc.bounding_rect(node).await?;
    let style = style_key(doc, node).await?;
    let block = doc.attribute(node, BLOCK_ATTR).await?;

    // admitted only once every read succeeded, so a failed element
    // does not shadow a later copy with the same markup
    dedup.admit(&html);
    Ok(Some(BlockRecord::new(style, block, rect, html)))
}

fn push_outcome(list: &mut BlockList, role: Role, outcome: Result<Option<BlockRecord>, ScrapeError>) {
    match outcome {
        Ok(Some(record)) => list.records.push(record),
        Ok(None) => list.duplicates += 1,
        Err(e) => {
            list.failures += 1;
            warn!("Skipping {} that failed extraction: {}", role.label(), e);
        }
    }
}

/// Sections in document order, collapsing each one's redundant components
/// before it is serialized.
pub async fn collect_sections<D: DocumentTree>(
    doc: &mut D,
    collapsed_class: &str,
) -> Result<BlockList, ScrapeError> {
    let mut dedup = ContentDeduplicator::new();
    let mut list = BlockList::default();

    for section in doc.select(&Role::Section.query()).await? {
        match collapse_components(doc, &section, collapsed_class).await {
            Ok(count) => list.collapsed += count,
            Err(e) => {
                list.failures += 1;
                warn!("Skipping section whose components could not be collapsed: {}", e);
                continue;
            }
        }

        let outcome = read_block(doc, &section, &mut dedup).await;
        push_outcome(&mut list, Role::Section, outcome);
    }

    Ok(list)
}

/// Components in document order, collapsed ones included.
pub async fn collect_components<D: DocumentTree>(doc: &D) -> Result<BlockList, ScrapeError> {
    let mut dedup = ContentDeduplicator::new();
    let mut list = BlockList::default();

    for component in doc.select(&Role::Component.query()).await? {
        let outcome = read_block(doc, &component, &mut dedup).await;
        push_outcome(&mut list, Role::Component, outcome);
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryDocument, NodeId, Query, Rect};
    use async_trait::async_trait;

    /// Memory document where reads of one node's geometry, descendants and
    /// visibility fail.
    struct BrokenNode {
        inner: MemoryDocument,
        broken: NodeId,
    }

    #[async_trait]
    impl DocumentTree for BrokenNode {
        type Node = NodeId;

        async fn select(&self, query: &Query) -> Result<Vec<NodeId>, ScrapeError> {
            self.inner.select(query).await
        }

        async fn select_within(&self, scope: &NodeId, query: &Query) -> Result<Vec<NodeId>, ScrapeError> {
            if *scope == self.broken {
                return Err(ScrapeError::ElementDetached);
            }
            self.inner.select_within(scope, query).await
        }

        async fn attribute(&self, node: &NodeId, name: &str) -> Result<Option<String>, ScrapeError> {
            self.inner.attribute(node, name).await
        }

        async fn is_attached(&self, node: &NodeId) -> Result<bool, ScrapeError> {
            self.inner.is_attached(node).await
        }

        async fn outer_html(&self, node: &NodeId) -> Result<String, ScrapeError> {
            self.inner.outer_html(node).await
        }

        async fn bounding_rect(&self, node: &NodeId) -> Result<Rect, ScrapeError> {
            if *node == self.broken {
                return Err(ScrapeError::ElementDetached);
            }
            self.inner.bounding_rect(node).await
        }

        async fn add_class(&mut self, node: &NodeId, class: &str) -> Result<(), ScrapeError> {
            self.inner.add_class(node, class).await
        }

        async fn detach(&mut self, node: &NodeId) -> Result<(), ScrapeError> {
            self.inner.detach(node).await
        }

        async fn hide(&mut self, node: &NodeId, class: &str) -> Result<(), ScrapeError> {
            if *node == self.broken {
                return Err(ScrapeError::PageError("node went away".to_string()));
            }
            self.inner.hide(node, class).await
        }

        async fn trim_text(&mut self, node: &NodeId) -> Result<(), ScrapeError> {
            self.inner.trim_text(node).await
        }

        async fn inject_style(&mut self, css: &str) -> Result<(), ScrapeError> {
            self.inner.inject_style(css).await
        }
    }

    fn component(doc: &mut MemoryDocument, parent: NodeId, text: &str, top: f64) -> NodeId {
        let node = doc.append_element(parent, "div", &[("class", "component")]);
        doc.append_text(node, text);
        doc.set_rect(node, Rect::new(0.0, top, 100.0, 20.0));
        node
    }

    #[tokio::test]
    async fn test_duplicate_markup_is_dropped() {
        let mut doc = MemoryDocument::new();
        let root = doc.root();
        component(&mut doc, root, "one", 0.0);
        component(&mut doc, root, "two", 20.0);
        component(&mut doc, root, "one", 40.0);

        let list = collect_components(&doc).await.unwrap();

        assert_eq!(list.records.len(), 2);
        assert_eq!(list.duplicates, 1);
        assert_eq!(list.records[0].top, 0.0);
        assert_eq!(list.records[1].html, "<div class=\"component\">two</div>");
    }

    #[tokio::test]
    async fn test_fields_are_read() {
        let mut doc = MemoryDocument::new();
        let root = doc.root();
        let node = doc.append_element(
            root,
            "div",
            &[("class", "component"), ("data-group", "cta"), ("data-block", "button")],
        );
        doc.set_rect(node, Rect::new(12.5, 300.0, 240.0, 48.0));

        let list = collect_components(&doc).await.unwrap();
        let record = &list.records[0];

        assert_eq!(record.style.as_deref(), Some("cta"));
        assert_eq!(record.block.as_deref(), Some("button"));
        assert_eq!(record.rect(), Rect::new(12.5, 300.0, 240.0, 48.0));
    }

    #[tokio::test]
    async fn test_section_markup_reflects_collapse() {
        let mut doc = MemoryDocument::new();
        let root = doc.root();
        let section = doc.append_element(root, "section", &[("class", "section")]);
        doc.set_rect(section, Rect::new(0.0, 0.0, 1500.0, 600.0));
        for _ in 0..2 {
            doc.append_element(section, "div", &[("class", "component"), ("data-style", "card")]);
        }

        let sections = collect_sections(&mut doc, "block-collapsed").await.unwrap();

        assert_eq!(sections.collapsed, 1);
        assert_eq!(sections.records.len(), 1);
        assert!(sections.records[0]
            .html
            .contains("class=\"component block-collapsed\""));
    }

    #[tokio::test]
    async fn test_failed_element_is_skipped() {
        let mut doc = MemoryDocument::new();
        let root = doc.root();
        let broken = component(&mut doc, root, "one", 0.0);
        component(&mut doc, root, "two", 20.0);
        component(&mut doc, root, "one", 40.0);
        let doc = BrokenNode { inner: doc, broken };

        let list = collect_components(&doc).await.unwrap();

        assert_eq!(list.failures, 1);
        assert_eq!(list.duplicates, 0);
        let tops: Vec<f64> = list.records.iter().map(|r| r.top).collect();
        // the later copy of the failed markup still gets in
        assert_eq!(tops, vec![20.0, 40.0]);
        assert_eq!(list.records[1].html, "<div class=\"component\">one</div>");
    }

    #[tokio::test]
    async fn test_section_failing_collapse_is_skipped() {
        let doc = MemoryDocument::parse(
            r#"<section class="section" data-group="a" data-broken="">
                <div class="component" data-style="card">first</div>
                <div class="component" data-style="card">second</div>
            </section>
            <section class="section" data-group="b">after</section>"#,
        );
        let broken = doc.find_all(&Query::has_attribute("data-broken"))[0];
        let mut doc = BrokenNode { inner: doc, broken };

        let sections = collect_sections(&mut doc, "block-collapsed").await.unwrap();

        assert_eq!(sections.failures, 1);
        assert_eq!(sections.records.len(), 1);
        assert_eq!(
            sections.records[0].html,
            r#"<section class="section" data-group="b">after</section>"#
        );
    }
}
