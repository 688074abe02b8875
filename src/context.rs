//! Shared bus context
//!
//! A `BusContext` lazily creates one `EventBus` and hands out the same
//! instance until reset. Composition roots own their own context; the
//! process-wide default behind `EventBus::shared` is just another context.

use crate::bus::EventBus;
use crate::config::BusConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static GLOBAL: BusContext = BusContext::new();

/// Process-wide default context
pub fn global() -> &'static BusContext {
    &GLOBAL
}

/// Holder of a lazily created shared bus
#[derive(Debug, Default)]
pub struct BusContext {
    instance: Mutex<Option<Arc<EventBus>>>,
}

impl BusContext {
    pub const fn new() -> Self {
        Self {
            instance: Mutex::new(None),
        }
    }

    /// Shared bus, created from `config` on first use
    ///
    /// `config` is ignored once the instance exists.
    pub fn instance(&self, config: BusConfig) -> Arc<EventBus> {
        self.instance_with(|| EventBus::new(config))
    }

    /// Shared bus, created by `init` on first use
    pub fn instance_with(&self, init: impl FnOnce() -> EventBus) -> Arc<EventBus> {
        self.slot()
            .get_or_insert_with(|| Arc::new(init()))
            .clone()
    }

    /// Shared bus if already created
    pub fn get(&self) -> Option<Arc<EventBus>> {
        self.slot().clone()
    }

    /// Forget the shared bus; the next `instance` call creates a fresh one
    ///
    /// Holders of the previous `Arc` keep a working bus.
    pub fn reset(&self) {
        self.slot().take();
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<EventBus>>> {
        self.instance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
