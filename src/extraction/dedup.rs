use std::collections::HashSet;

/// Set-backed filter over serialized markup
///
/// One instance per output list, so sections and components never suppress
/// each other.
#[derive(Debug, Default)]
pub struct ContentDeduplicator {
    seen: HashSet<String>,
}

impl ContentDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `html` is offered, false on every later call.
    pub fn admit(&mut self, html: &str) -> bool {
        if self.seen.contains(html) {
            return false;
        }
        self.seen.insert(html.to_string())
    }

    pub fn contains(&self, html: &str) -> bool {
        self.seen.contains(html)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_once() {
        let mut dedup = ContentDeduplicator::new();
        assert!(dedup.admit("<div>a</div>"));
        assert!(!dedup.admit("<div>a</div>"));
        assert!(dedup.admit("<div>b</div>"));
        assert!(!dedup.admit("<div>a</div>"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_instances_are_independent() {
        let mut sections = ContentDeduplicator::new();
        let mut components = ContentDeduplicator::new();
        assert!(sections.admit("<div>same</div>"));
        assert!(components.admit("<div>same</div>"));
        assert!(sections.contains("<div>same</div>"));
    }
}
