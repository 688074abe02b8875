//! Core event types for the a3s-bus system
//!
//! All types use camelCase JSON serialization so payloads can be inspected
//! or forwarded as-is.

use crate::error::{EventError, Result};
use crate::handler::HandlerInfo;
use serde::{Deserialize, Serialize};

/// Cluster key matched by every publish and matching every subscriber
pub const WILDCARD: &str = "*";

/// Event type of the bookkeeping event published by `EventBus::request`
pub const REQUEST_EVENT: &str = "REQUEST_EVENT";

/// A named event carrying an opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event type identifier (e.g., "temp", "cart.updated")
    pub event_type: String,

    /// Event payload, arbitrary JSON data, shape defined by consumers
    pub data: serde_json::Value,
}

impl Event {
    /// Create a new event
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Whether this is the bookkeeping event emitted by a request
    pub fn is_request(&self) -> bool {
        self.event_type == REQUEST_EVENT
    }
}

/// Options for publishing events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
    /// Target clusters; empty means `["*"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<String>,

    /// Persist for late subscribers; `None` uses the bus default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,
}

impl PublishOptions {
    /// Publish to the given clusters
    pub fn to<I, S>(clusters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clusters: clusters.into_iter().map(Into::into).collect(),
            persist: None,
        }
    }

    /// Override the bus-level persistence default
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }
}

/// Deduplicate clusters keeping first occurrence; empty becomes `["*"]`
pub(crate) fn normalize_clusters(clusters: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(clusters.len().max(1));
    for cluster in clusters {
        if !out.contains(cluster) {
            out.push(cluster.clone());
        }
    }
    if out.is_empty() {
        out.push(WILDCARD.to_string());
    }
    out
}

/// Payload of the `REQUEST_EVENT` bookkeeping event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEventData {
    /// Event the requester wants to receive
    pub target_event: Event,

    /// Metadata of the handler that was subscribed for the response
    pub handler: HandlerInfo,

    /// Cluster the handler listens on
    pub cluster: String,
}

impl RequestEventData {
    /// Decode the payload of a bookkeeping event
    pub fn from_event(event: &Event) -> Result<Self> {
        if !event.is_request() {
            return Err(EventError::Config(format!(
                "Expected '{}' event, got '{}'",
                REQUEST_EVENT, event.event_type
            )));
        }
        Ok(serde_json::from_value(event.data.clone())?)
    }

    /// Encode as a bookkeeping event
    pub fn into_event(self) -> Result<Event> {
        Ok(Event::new(REQUEST_EVENT, serde_json::to_value(self)?))
    }
}
