//! Structured action logging for debug mode
//!
//! The bus reports every action to an `ActionLogger` while debug mode is
//! on. Loggers observe only; a panicking logger is contained and never
//! affects delivery.

use crate::handler::HandlerInfo;
use serde::Serialize;
use std::fmt;

/// Kind of bus action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Publish,
    Subscribe,
    Unsubscribe,
    Request,
    /// A handler invocation during live delivery
    Deliver,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Publish => "PUB",
            Action::Subscribe => "SUB",
            Action::Unsubscribe => "UNS",
            Action::Request => "REQ",
            Action::Deliver => "COG",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an action reached anyone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionState {
    Sync,
    /// Published with no literal cluster bucket registered
    Lost,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Sync => "SYNC",
            ActionState::Lost => "LOST",
        }
    }
}

/// One logged action
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord<'a> {
    pub action: Action,
    pub state: ActionState,
    pub event_type: &'a str,
    #[serde(skip_serializing_if = "no_clusters")]
    pub clusters: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<&'a HandlerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a serde_json::Value>,
}

fn no_clusters(clusters: &&[String]) -> bool {
    clusters.is_empty()
}

/// Sink for debug-mode action records
pub trait ActionLogger: Send + Sync {
    fn log(&self, record: &ActionRecord<'_>);
}

/// Default logger emitting one `tracing` event per action
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ActionLogger for TracingLogger {
    fn log(&self, record: &ActionRecord<'_>) {
        let data = record
            .data
            .map(|d| d.to_string())
            .unwrap_or_default();
        tracing::info!(
            action = %record.action,
            state = record.state.as_str(),
            event_type = record.event_type,
            clusters = ?record.clusters,
            class_name = record.handler.map(|h| h.class_name.as_str()),
            tag_name = record.handler.and_then(|h| h.tag_name.as_deref()),
            data = %data,
            "Bus action"
        );
    }
}

/// Call `logger`, containing any panic it raises
pub(crate) fn emit(logger: &dyn ActionLogger, record: &ActionRecord<'_>) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| logger.log(record)));
    if outcome.is_err() {
        tracing::warn!(
            action = %record.action,
            event_type = record.event_type,
            "Action logger panicked"
        );
    }
}
