use std::collections::VecDeque;

use super::element::{InteractionKey, InteractiveElement};

/// Rolling memory of recently-attempted elements, keyed by their
/// normalized signature. Prevents the engine from repeating the same
/// action indefinitely. Pure in-memory state.
#[derive(Debug)]
pub struct InteractionTracker {
    history: VecDeque<InteractionKey>,
    capacity: usize,
}

impl InteractionTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record an attempt; the oldest entry drops once the cap is exceeded
    pub fn remember(&mut self, element: &InteractiveElement) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(element.interaction_key());
    }

    /// The last `n` keys, oldest first
    pub fn recent_keys(&self, n: usize) -> Vec<InteractionKey> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn was_recent(&self, element: &InteractiveElement) -> bool {
        self.contains(&element.interaction_key())
    }

    pub fn contains(&self, key: &InteractionKey) -> bool {
        self.history.contains(key)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
