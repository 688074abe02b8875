//! Error types for a3s-bus

use thiserror::Error;

/// Errors returned synchronously by bus operations
#[derive(Debug, Error)]
pub enum EventError {
    /// Handler failed validation (missing identity)
    #[error("Invalid handler: {0}")]
    InvalidHandler(String),

    /// Handler identity is already bound to another event type
    #[error(
        "Handler {handler} is already subscribed to '{bound_to}' and cannot be assigned to '{requested}'"
    )]
    DuplicateHandlerAssignment {
        handler: String,
        bound_to: String,
        requested: String,
    },

    /// Unsubscribe target was not registered under the event type
    #[error("Handler {handler} not found for event type '{event_type}'")]
    HandlerNotFound {
        event_type: String,
        handler: String,
    },

    /// A persisted event replayed during subscribe made the handler fail
    ///
    /// The subscription itself stays registered.
    #[error("Replay of persisted '{event_type}' on cluster '{cluster}' failed: {source}")]
    Replay {
        event_type: String,
        cluster: String,
        #[source]
        source: HandlerError,
    },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration or malformed input
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal state lock was poisoned
    #[error("Bus state lock poisoned: {0}")]
    Lock(String),
}

/// Failure raised by a handler during invocation
///
/// Never returned from `publish`; live delivery routes it to the
/// configured error callback.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler returned an underlying error
    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Handler rejected the payload with a message
    #[error("{0}")]
    Message(String),

    /// Handler panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap any error type
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(err))
    }

    /// Build a failure from a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Convert a caught panic payload into a handler error
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::failed(err)
    }
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, EventError>;

/// Result type returned by handlers
pub type HandlerResult = std::result::Result<(), HandlerError>;
