//! Handler records: identity, display metadata and the callable
//!
//! A `Handler` is what the bus stores and invokes. Identity is an opaque
//! `HandlerId`; it is the only key used for dedup and removal, so clones of a
//! handler are the same subscriber.

use crate::error::HandlerResult;
use crate::types::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque, unique handler identity
///
/// The nil UUID is reserved as "no identity" and is rejected by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Generate a fresh identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The reserved "missing identity" value
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serializable metadata snapshot of a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerInfo {
    /// Handler identity
    pub id: HandlerId,

    /// Display name of the owning component
    pub class_name: String,

    /// Optional UI tag name of the owning component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
}

impl fmt::Display for HandlerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag_name {
            Some(tag) => write!(f, "{} <{}> ({})", self.class_name, tag, self.id),
            None => write!(f, "{} ({})", self.class_name, self.id),
        }
    }
}

type Callback = dyn Fn(&Event) -> HandlerResult + Send + Sync;

/// An identity-bearing callable consuming events
#[derive(Clone)]
pub struct Handler {
    info: HandlerInfo,
    callback: Arc<Callback>,
}

impl Handler {
    /// Create a handler with a freshly generated identity
    pub fn new<F>(class_name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        Self::with_id(HandlerId::new(), class_name, callback)
    }

    /// Create a handler with an explicit identity
    pub fn with_id<F>(id: HandlerId, class_name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            info: HandlerInfo {
                id,
                class_name: class_name.into(),
                tag_name: None,
            },
            callback: Arc::new(callback),
        }
    }

    /// Attach a UI tag name
    pub fn with_tag_name(mut self, tag_name: impl Into<String>) -> Self {
        self.info.tag_name = Some(tag_name.into());
        self
    }

    /// Bind a method of `owner` into a handler record
    ///
    /// The class name is the short type name of `T`; the tag name comes
    /// from `source`, falling back to `Component::tag_name` lowercased.
    pub fn bind<T, F>(owner: Arc<T>, method: F, source: TagNameSource<T>) -> Self
    where
        T: Component + Send + Sync + 'static,
        F: Fn(&T, &Event) -> HandlerResult + Send + Sync + 'static,
    {
        let class_name = short_type_name::<T>();
        let tag_name = source.resolve(&owner);
        let mut handler = Self::new(class_name, move |event| method(&owner, event));
        handler.info.tag_name = tag_name;
        handler
    }

    pub fn id(&self) -> HandlerId {
        self.info.id
    }

    pub fn class_name(&self) -> &str {
        &self.info.class_name
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.info.tag_name.as_deref()
    }

    pub fn info(&self) -> &HandlerInfo {
        &self.info
    }

    /// Invoke the callable directly, without failure isolation
    pub fn call(&self, event: &Event) -> HandlerResult {
        (self.callback)(event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.info.id)
            .field("class_name", &self.info.class_name)
            .field("tag_name", &self.info.tag_name)
            .finish_non_exhaustive()
    }
}

/// An owner whose methods can be bound into handlers
pub trait Component {
    /// Tag name used when no explicit source resolves one
    fn tag_name(&self) -> Option<String> {
        None
    }
}

/// How `Handler::bind` resolves the tag name
pub enum TagNameSource<T> {
    /// Use `Component::tag_name`, lowercased
    Default,
    /// Use a fixed value
    Fixed(String),
    /// Compute from the owner
    Resolver(fn(&T) -> Option<String>),
}

impl<T: Component> TagNameSource<T> {
    fn resolve(&self, owner: &T) -> Option<String> {
        let explicit = match self {
            TagNameSource::Default => None,
            TagNameSource::Fixed(tag) => Some(tag.clone()),
            TagNameSource::Resolver(resolver) => resolver(owner),
        };
        explicit.or_else(|| owner.tag_name().map(|t| t.to_lowercase()))
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Thermostat {
        element: &'static str,
        readings: AtomicUsize,
    }

    impl Component for Thermostat {
        fn tag_name(&self) -> Option<String> {
            Some(self.element.to_string())
        }
    }

    impl Thermostat {
        fn on_reading(&self, event: &Event) -> HandlerResult {
            if event.data.get("v").is_none() {
                return Err(HandlerError::msg("missing reading"));
            }
            self.readings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn thermostat() -> Arc<Thermostat> {
        Arc::new(Thermostat {
            element: "X-THERMOSTAT",
            readings: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_handler_ids_are_unique() {
        let a = Handler::new("A", |_| Ok(()));
        let b = Handler::new("A", |_| Ok(()));
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_nil());
        assert!(HandlerId::nil().is_nil());
    }

    #[test]
    fn test_clone_shares_identity() {
        let a = Handler::new("A", |_| Ok(())).with_tag_name("x-a");
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_eq!(b.tag_name(), Some("x-a"));
    }

    #[test]
    fn test_bind_uses_type_name_and_default_tag() {
        let owner = thermostat();
        let handler = Handler::bind(owner.clone(), Thermostat::on_reading, TagNameSource::Default);

        assert_eq!(handler.class_name(), "Thermostat");
        assert_eq!(handler.tag_name(), Some("x-thermostat"));

        handler.call(&Event::new("temp", serde_json::json!({"v": 1}))).unwrap();
        assert_eq!(owner.readings.load(Ordering::SeqCst), 1);

        let err = handler.call(&Event::new("temp", serde_json::json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "missing reading");
    }

    #[test]
    fn test_bind_tag_sources() {
        let fixed = Handler::bind(
            thermostat(),
            Thermostat::on_reading,
            TagNameSource::Fixed("temp-panel".to_string()),
        );
        assert_eq!(fixed.tag_name(), Some("temp-panel"));

        let resolved = Handler::bind(
            thermostat(),
            Thermostat::on_reading,
            TagNameSource::Resolver(|t| Some(format!("{}-1", t.element))),
        );
        assert_eq!(resolved.tag_name(), Some("X-THERMOSTAT-1"));

        // Resolver yielding nothing falls back to the component's tag name
        let fallback = Handler::bind(
            thermostat(),
            Thermostat::on_reading,
            TagNameSource::Resolver(|_| None),
        );
        assert_eq!(fallback.tag_name(), Some("x-thermostat"));
    }

    #[test]
    fn test_handler_info_serialization() {
        let handler = Handler::new("Panel", |_| Ok(()));
        let json = serde_json::to_value(handler.info()).unwrap();
        assert_eq!(json["className"], "Panel");
        assert!(json.get("tagName").is_none());
        assert_eq!(json["id"], handler.id().to_string());
    }
}
