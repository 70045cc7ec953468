use crate::document::{DocumentTree, Query, GROUP_ATTR};
use crate::ScrapeError;
use std::collections::HashSet;
use tracing::debug;

/// Detach every element whose `data-group` value was already seen.
///
/// Elements are visited in document pre-order, so the first copy of a group
/// survives. Elements that went away with an earlier pruned ancestor are
/// skipped and do not claim their group. Returns the number of detached
/// elements.
pub async fn prune_groups<D: DocumentTree>(doc: &mut D) -> Result<usize, ScrapeError> {
    let mut seen = HashSet::new();
    let mut pruned = 0;

    for node in doc.select(&Query::has_attribute(GROUP_ATTR)).await? {
        if !doc.is_attached(&node).await? {
            continue;
        }

        let Some(group) = doc.attribute(&node, GROUP_ATTR).await? else {
            continue;
        };

        if seen.insert(group.clone()) {
            continue;
        }

        doc.detach(&node).await?;
        pruned += 1;
        debug!("Pruned duplicate of group {:?}", group);
    }

    Ok(pruned)
}
