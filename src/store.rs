//! Persisted event store: latest value per (event type, cluster)
//!
//! Slots are overwritten, never merged, and only cleared by a bus reset.

use crate::types::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored event and when it was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEvent {
    pub event: Event,
    pub persisted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct PersistedStore {
    slots: HashMap<String, HashMap<String, PersistedEvent>>,
}

impl PersistedStore {
    /// Overwrite the slot of every literal cluster in `clusters`
    pub fn record(&mut self, event: &Event, clusters: &[String]) {
        let persisted_at = Utc::now();
        let slots = self.slots.entry(event.event_type.clone()).or_default();
        for cluster in clusters {
            slots.insert(
                cluster.clone(),
                PersistedEvent {
                    event: event.clone(),
                    persisted_at,
                },
            );
        }
    }

    /// Slot for exactly (event_type, cluster)
    pub fn get(&self, event_type: &str, cluster: &str) -> Option<&PersistedEvent> {
        self.slots.get(event_type)?.get(cluster)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(HashMap::len).sum()
    }
}
