//! The event bus engine
//!
//! `EventBus` owns the subscription registry, the persisted event store and
//! the intake queue behind a single lock. Handlers always run with the lock
//! released, so they may publish, subscribe or unsubscribe re-entrantly; a
//! publish made while a drain is running is appended and picked up by that
//! same drain loop.

use crate::config::{self, BusConfig, DeliveryMode};
use crate::context;
use crate::error::{EventError, HandlerError, Result};
use crate::handler::{Handler, HandlerInfo};
use crate::invoker::Invoker;
use crate::log::{self, Action, ActionLogger, ActionRecord, ActionState, TracingLogger};
use crate::queue::{EventQueue, QueueItem};
use crate::registry::{Matched, Registration, SubscriptionRegistry};
use crate::store::{PersistedEvent, PersistedStore};
use crate::types::{normalize_clusters, Event, PublishOptions, RequestEventData, WILDCARD};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Callback receiving handler failures from live delivery
pub type ErrorCallback = Arc<dyn Fn(&HandlerError, &Event, Option<&HandlerInfo>) + Send + Sync>;

/// Input of `EventBus::request`
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Event the handler should receive once someone publishes it
    pub target_event: Event,
    pub handler: Handler,
    /// Cluster the handler subscribes on
    pub cluster: String,
}

#[derive(Debug, Default)]
struct BusState {
    registry: SubscriptionRegistry,
    store: PersistedStore,
    queue: EventQueue,
}

/// In-process publish/subscribe bus with cluster routing and replay
pub struct EventBus {
    default_persist: bool,
    delivery_mode: DeliveryMode,
    debug_mode: AtomicBool,
    wait_timeout_ms: AtomicU64,
    state: Mutex<BusState>,
    error_handler: Option<ErrorCallback>,
    logger: Arc<dyn ActionLogger>,
}

impl EventBus {
    /// Create a new, isolated bus
    pub fn new(config: BusConfig) -> Self {
        if config.debug_mode {
            tracing::debug!(
                default_persist = config.default_persist,
                wait_timeout_ms = config.wait_timeout_ms,
                delivery_mode = ?config.delivery_mode,
                "Event bus created"
            );
        }
        Self {
            default_persist: config.default_persist,
            delivery_mode: config.delivery_mode,
            debug_mode: AtomicBool::new(config.debug_mode),
            wait_timeout_ms: AtomicU64::new(config.wait_timeout_ms),
            state: Mutex::new(BusState::default()),
            error_handler: None,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Create a new, isolated bus ready to share
    pub fn create(config: BusConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// The process-wide shared bus, created with defaults on first use
    pub fn shared() -> Arc<Self> {
        context::global().instance(BusConfig::default())
    }

    /// Route live-delivery handler failures to `callback`
    pub fn with_error_handler<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HandlerError, &Event, Option<&HandlerInfo>) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(callback));
        self
    }

    /// Replace the debug-mode action logger
    pub fn with_logger(mut self, logger: Arc<dyn ActionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Publish to all clusters using the bus persistence default
    pub fn publish(&self, event: Event) -> Result<()> {
        self.publish_with_options(event, &PublishOptions::default())
    }

    /// Enqueue `event` and drain the queue
    ///
    /// Returns as soon as the event is queued if a drain is already in
    /// progress. Handler failures never surface here.
    pub fn publish_with_options(&self, event: Event, opts: &PublishOptions) -> Result<()> {
        let clusters = normalize_clusters(&opts.clusters);
        let persist = opts.persist.unwrap_or(self.default_persist);

        if self.debug_mode() {
            let reached = self
                .state()?
                .registry
                .has_literal_bucket(&event.event_type, &clusters);
            self.log_action(ActionRecord {
                action: Action::Publish,
                state: if reached { ActionState::Sync } else { ActionState::Lost },
                event_type: &event.event_type,
                clusters: &clusters,
                handler: None,
                data: Some(&event.data),
            });
        }

        self.state()?.queue.push(QueueItem {
            event,
            clusters,
            persist,
        });
        self.drain()
    }

    /// Register `handler` for `event_type` on `cluster` (default `"*"`)
    ///
    /// A persisted event for exactly this (event type, cluster) is handed to
    /// the handler before returning. That replay is not failure-isolated: a
    /// handler error comes back as `EventError::Replay` and a panic unwinds
    /// to the caller, while the subscription stays registered.
    pub fn subscribe(&self, event_type: &str, handler: &Handler, cluster: Option<&str>) -> Result<()> {
        let cluster = cluster.unwrap_or(WILDCARD);

        let replay = {
            let mut state = self.state()?;
            match state.registry.insert(event_type, cluster, handler)? {
                Registration::Added => state.store.get(event_type, cluster).map(|p| p.event.clone()),
                Registration::AlreadyPresent => None,
            }
        };

        self.log_action(ActionRecord {
            action: Action::Subscribe,
            state: ActionState::Sync,
            event_type,
            clusters: &[cluster.to_string()],
            handler: Some(handler.info()),
            data: replay.as_ref().map(|e| &e.data),
        });

        if let Some(event) = replay {
            handler.call(&event).map_err(|source| EventError::Replay {
                event_type: event_type.to_string(),
                cluster: cluster.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Remove `handler` from every cluster of `event_type`
    pub fn unsubscribe(&self, event_type: &str, handler: &Handler) -> Result<()> {
        let removed = self.state()?.registry.remove(event_type, handler)?;
        for cluster in removed {
            self.log_action(ActionRecord {
                action: Action::Unsubscribe,
                state: ActionState::Sync,
                event_type,
                clusters: &[cluster],
                handler: Some(handler.info()),
                data: None,
            });
        }
        Ok(())
    }

    /// Subscribe the descriptor's handler, then announce the request
    ///
    /// Publishes a persisted `REQUEST_EVENT` carrying `RequestEventData` to
    /// `clusters`. The handler only runs once someone publishes the target
    /// event itself.
    pub fn request<I, S>(&self, descriptor: RequestDescriptor, clusters: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let RequestDescriptor {
            target_event,
            handler,
            cluster,
        } = descriptor;

        self.subscribe(&target_event.event_type, &handler, Some(&cluster))?;

        let opts = PublishOptions::to(clusters).persist(true);
        let data = RequestEventData {
            target_event,
            handler: handler.info().clone(),
            cluster,
        };
        let logged = self.debug_mode().then(|| data.target_event.clone());

        self.publish_with_options(data.into_event()?, &opts)?;

        if let Some(target) = logged {
            self.log_action(ActionRecord {
                action: Action::Request,
                state: ActionState::Sync,
                event_type: &target.event_type,
                clusters: &normalize_clusters(&opts.clusters),
                handler: Some(handler.info()),
                data: Some(&target.data),
            });
        }
        Ok(())
    }

    /// Clear subscriptions, persisted events and pending publishes
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state()?;
        state.registry.clear();
        state.store.clear();
        state.queue.clear();
        Ok(())
    }

    /// Persisted slot for exactly (event_type, cluster)
    pub fn persisted(&self, event_type: &str, cluster: &str) -> Result<Option<PersistedEvent>> {
        Ok(self.state()?.store.get(event_type, cluster).cloned())
    }

    /// Number of persisted slots
    pub fn persisted_count(&self) -> Result<usize> {
        Ok(self.state()?.store.len())
    }

    /// Publishes queued but not yet delivered
    pub fn pending(&self) -> Result<usize> {
        Ok(self.state()?.queue.len())
    }

    /// Whether `handler` is registered under `event_type`
    pub fn is_subscribed(&self, event_type: &str, handler: &Handler) -> Result<bool> {
        Ok(self.state()?.registry.contains(event_type, handler.id()))
    }

    /// Distinct handlers registered under `event_type`
    pub fn subscriber_count(&self, event_type: &str) -> Result<usize> {
        Ok(self.state()?.registry.subscriber_count(event_type))
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    pub fn set_debug_mode(&self, debug_mode: bool) {
        self.debug_mode.store(debug_mode, Ordering::Relaxed);
    }

    /// Delay hint for external schedulers
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms.load(Ordering::Relaxed))
    }

    /// Millisecond granularity; sub-millisecond remainders round up
    pub fn set_wait_timeout(&self, wait_timeout: Duration) {
        self.wait_timeout_ms
            .store(config::millis_ceil(wait_timeout), Ordering::Relaxed);
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    pub fn default_persist(&self) -> bool {
        self.default_persist
    }

    /// Current configuration snapshot
    pub fn config(&self) -> BusConfig {
        BusConfig {
            debug_mode: self.debug_mode(),
            default_persist: self.default_persist,
            wait_timeout_ms: self.wait_timeout_ms.load(Ordering::Relaxed),
            delivery_mode: self.delivery_mode,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, BusState>> {
        self.state
            .lock()
            .map_err(|e| EventError::Lock(e.to_string()))
    }

    /// Process queued items until the queue is empty
    fn drain(&self) -> Result<()> {
        if !self.state()?.queue.begin_drain() {
            return Ok(());
        }
        let mut guard = DrainGuard {
            bus: self,
            armed: true,
        };

        loop {
            let (item, matches) = {
                let mut state = self.state()?;
                let Some(item) = state.queue.pop() else {
                    // Released under the same lock that saw the queue empty
                    state.queue.end_drain();
                    guard.armed = false;
                    break;
                };
                let matches = state.registry.resolve(&item.event.event_type, &item.clusters);
                (item, matches)
            };

            if !matches.is_empty() {
                self.deliver(&item.event, &matches);
            }
            if item.persist {
                self.state()?.store.record(&item.event, &item.clusters);
            }
        }
        Ok(())
    }

    fn deliver(&self, event: &Event, matches: &[Matched]) {
        let on_invoke = |event: &Event, handler: &Handler| {
            self.log_action(ActionRecord {
                action: Action::Deliver,
                state: ActionState::Sync,
                event_type: &event.event_type,
                clusters: &[],
                handler: Some(handler.info()),
                data: Some(&event.data),
            });
        };
        let on_error = |err: &HandlerError, event: &Event, handler: &Handler| {
            self.report_failure(err, event, Some(handler.info()));
        };

        let failures = Invoker {
            mode: self.delivery_mode,
            on_invoke: &on_invoke,
            on_error: &on_error,
        }
        .deliver(event, matches);

        if failures > 0 {
            tracing::trace!(
                event_type = %event.event_type,
                handlers = matches.len(),
                failures,
                "Delivery finished with handler failures"
            );
        }
    }

    fn report_failure(&self, err: &HandlerError, event: &Event, handler: Option<&HandlerInfo>) {
        match &self.error_handler {
            Some(callback) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| callback(err, event, handler)));
                if outcome.is_err() {
                    tracing::warn!(
                        event_type = %event.event_type,
                        handler = handler.map(|h| h.class_name.as_str()),
                        "Error callback panicked"
                    );
                }
            }
            None if self.debug_mode() => {
                tracing::error!(
                    event_type = %event.event_type,
                    handler = handler.map(|h| h.class_name.as_str()),
                    error = %err,
                    "Unhandled error during event delivery"
                );
            }
            None => {}
        }
    }

    fn log_action(&self, record: ActionRecord<'_>) {
        if self.debug_mode() {
            log::emit(self.logger.as_ref(), &record);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config())
            .field("error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Releases the drain claim if the loop exits early or unwinds
struct DrainGuard<'a> {
    bus: &'a EventBus,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self
                .bus
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.queue.end_drain();
        }
    }
}
