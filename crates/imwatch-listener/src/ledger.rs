use std::collections::HashSet;

/// Message GUIDs already published.
///
/// Grows for the lifetime of the process and is never pruned or persisted.
#[derive(Debug, Default)]
pub struct SeenLedger {
    ids: HashSet<String>,
}

impl SeenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records `id`. Returns `true` the first time an id is marked.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_owned())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_until_marked() {
        let mut ledger = SeenLedger::new();
        assert!(!ledger.seen("a-1"));

        assert!(ledger.mark_seen("a-1"));
        assert!(ledger.seen("a-1"));
        assert!(!ledger.seen("a-2"));
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut ledger = SeenLedger::new();
        assert!(ledger.mark_seen("a-1"));
        for _ in 0..3 {
            assert!(!ledger.mark_seen("a-1"));
            assert!(ledger.seen("a-1"));
        }
        assert_eq!(ledger.len(), 1);
    }
}
