use crate::document::{DocumentTree, Query, Role};
use crate::{MarkerConfig, ScrapeError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub sections: usize,
    pub components: usize,
    pub code_blocks: usize,
}

/// Tag elements with role labels from the markers in their inline style.
///
/// Matching is substring containment on the raw `style` text, so a marker
/// appearing inside an unrelated property value still classifies. Roles are
/// classes, which makes a second run a no-op.
pub async fn classify<D: DocumentTree>(
    doc: &mut D,
    markers: &MarkerConfig,
) -> Result<Classification, ScrapeError> {
    let sections = doc
        .select(&Query::attribute_contains("style", &markers.section_marker))
        .await?;
    for node in &sections {
        doc.add_class(node, Role::Section.label()).await?;
    }

    let components = doc
        .select(&Query::attribute_contains("style", &markers.component_marker))
        .await?;
    for node in &components {
        doc.add_class(node, Role::Component.label()).await?;
    }

    let code_blocks = doc.select(&Query::class(&markers.code_edit_class)).await?;
    for node in &code_blocks {
        doc.trim_text(node).await?;
    }

    let classification = Classification {
        sections: sections.len(),
        components: components.len(),
        code_blocks: code_blocks.len(),
    };
    debug!("Classified {:?}", classification);

    Ok(classification)
}
