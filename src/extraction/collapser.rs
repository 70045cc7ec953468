use crate::document::{DocumentTree, Role, GROUP_ATTR, STYLE_ATTR};
use crate::ScrapeError;
use std::collections::HashSet;
use tracing::{debug, warn};

/// `data-style`, falling back to `data-group`. Empty values count as absent.
pub async fn style_key<D: DocumentTree>(doc: &D, node: &D::Node) -> Result<Option<String>, ScrapeError> {
    if let Some(style) = doc.attribute(node, STYLE_ATTR).await?.filter(|s| !s.is_empty()) {
        return Ok(Some(style));
    }
    Ok(doc
        .attribute(node, GROUP_ATTR)
        .await?
        .filter(|g| !g.is_empty()))
}

/// Hide every component of `section` whose style key was already seen.
///
/// Collapsed components stay attached; they stop rendering and carry
/// `collapsed_class`. Components without a key are left alone. A component
/// that cannot be read is skipped. Returns the number collapsed.
pub async fn collapse_components<D: DocumentTree>(
    doc: &mut D,
    section: &D::Node,
    collapsed_class: &str,
) -> Result<usize, ScrapeError> {
    let mut seen = HashSet::new();
    let mut collapsed = 0;

    for component in doc.select_within(section, &Role::Component.query()).await? {
        let key = match style_key(doc, &component).await {
            Ok(Some(key)) => key,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping unreadable component while collapsing: {}", e);
                continue;
            }
        };

        if seen.contains(&key) {
            match doc.hide(&component, collapsed_class).await {
                Ok(()) => {
                    collapsed += 1;
                    debug!("Collapsed component with style key {:?}", key);
                }
                Err(e) => warn!("Failed to collapse component {:?}: {}", key, e),
            }
        } else {
            seen.insert(key);
        }
    }

    Ok(collapsed)
}
