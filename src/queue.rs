//! FIFO intake queue for pending publishes

use crate::types::Event;
use std::collections::VecDeque;

/// A publish waiting to be drained
#[derive(Debug, Clone)]
pub(crate) struct QueueItem {
    pub event: Event,
    /// Normalized target clusters, never empty
    pub clusters: Vec<String>,
    pub persist: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    items: VecDeque<QueueItem>,
    draining: bool,
}

impl EventQueue {
    pub fn push(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    pub fn pop(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    /// Claim the drain; `false` if a drain is already running
    pub fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    pub fn end_drain(&mut self) {
        self.draining = false;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Drop pending items; the drain flag is left to its owner
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
