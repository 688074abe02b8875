//! # a3s-bus
//!
//! In-process publish/subscribe event bus with cluster routing and replay
//! for late subscribers.
//!
//! ## Overview
//!
//! Producers publish named events to one or more string-keyed clusters;
//! consumers subscribe a handler to an event type on a cluster and are
//! called synchronously. `"*"` is the wildcard cluster: wildcard
//! subscribers hear every publish of their event type, and a publish to
//! `"*"` reaches every cluster.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_bus::{BusConfig, Event, EventBus, Handler, PublishOptions};
//!
//! # fn example() -> a3s_bus::Result<()> {
//! let bus = EventBus::new(BusConfig::default());
//!
//! let panel = Handler::new("TemperaturePanel", |event| {
//!     println!("temperature: {}", event.data["v"]);
//!     Ok(())
//! });
//! bus.subscribe("temp", &panel, Some("kitchen"))?;
//!
//! bus.publish_with_options(
//!     Event::new("temp", serde_json::json!({"v": 21.5})),
//!     &PublishOptions::to(["kitchen"]).persist(true),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventBus**: publish / subscribe / unsubscribe / request, FIFO drain
//! - **Handler**: identity-bearing callable, built directly or bound to a
//!   `Component` method
//! - **BusContext**: lazily created shared instance
//! - **ActionLogger**: structured debug-mode action log

pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
mod invoker;
pub mod log;
mod queue;
mod registry;
pub mod store;
pub mod types;

// Re-export core types
pub use bus::{ErrorCallback, EventBus, RequestDescriptor};
pub use config::{BusConfig, DeliveryMode};
pub use context::BusContext;
pub use error::{EventError, HandlerError, HandlerResult, Result};
pub use handler::{Component, Handler, HandlerId, HandlerInfo, TagNameSource};
pub use log::{Action, ActionLogger, ActionRecord, ActionState, TracingLogger};
pub use store::PersistedEvent;
pub use types::{Event, PublishOptions, RequestEventData, REQUEST_EVENT, WILDCARD};
