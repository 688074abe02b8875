//! Subscription registry: event type → cluster → handlers
//!
//! Buckets keep insertion order so delivery follows registration order.
//! A handler identity may sit in several clusters of one event type, but
//! never under two event types at once.

use crate::error::{EventError, Result};
use crate::handler::{Handler, HandlerId};
use crate::types::WILDCARD;
use std::collections::HashMap;

/// A handler resolved for delivery, with the cluster bucket it came from
#[derive(Debug, Clone)]
pub(crate) struct Matched {
    pub handler: Handler,
    pub cluster: String,
}

#[derive(Debug)]
struct ClusterBucket {
    cluster: String,
    handlers: Vec<Handler>,
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    events: HashMap<String, Vec<ClusterBucket>>,
}

impl SubscriptionRegistry {
    /// Register `handler` under (event_type, cluster)
    pub fn insert(&mut self, event_type: &str, cluster: &str, handler: &Handler) -> Result<Registration> {
        if handler.id().is_nil() {
            return Err(EventError::InvalidHandler(format!(
                "handler '{}' has no identity",
                handler.class_name()
            )));
        }

        if self.bucket(event_type, cluster).is_some_and(|b| b.iter().any(|h| h.id() == handler.id())) {
            return Ok(Registration::AlreadyPresent);
        }

        if let Some(bound_to) = self.bound_event(handler.id()) {
            if bound_to != event_type {
                return Err(EventError::DuplicateHandlerAssignment {
                    handler: handler.info().to_string(),
                    bound_to: bound_to.to_string(),
                    requested: event_type.to_string(),
                });
            }
        }

        let buckets = self.events.entry(event_type.to_string()).or_default();
        match buckets.iter_mut().find(|b| b.cluster == cluster) {
            Some(bucket) => bucket.handlers.push(handler.clone()),
            None => buckets.push(ClusterBucket {
                cluster: cluster.to_string(),
                handlers: vec![handler.clone()],
            }),
        }
        Ok(Registration::Added)
    }

    /// Remove `handler` from every cluster of `event_type`
    ///
    /// Returns the clusters it was removed from, pruning emptied buckets.
    pub fn remove(&mut self, event_type: &str, handler: &Handler) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        if let Some(buckets) = self.events.get_mut(event_type) {
            for bucket in buckets.iter_mut() {
                let before = bucket.handlers.len();
                bucket.handlers.retain(|h| h.id() != handler.id());
                if bucket.handlers.len() != before {
                    removed.push(bucket.cluster.clone());
                }
            }
            buckets.retain(|b| !b.handlers.is_empty());
            if buckets.is_empty() {
                self.events.remove(event_type);
            }
        }

        if removed.is_empty() {
            return Err(EventError::HandlerNotFound {
                event_type: event_type.to_string(),
                handler: handler.info().to_string(),
            });
        }
        Ok(removed)
    }

    /// Resolve handlers for a publish to `clusters`
    ///
    /// Each target contributes its literal bucket followed by the wildcard
    /// bucket; a wildcard target then adds every bucket. Paths are not
    /// deduplicated, so a handler reachable twice is returned twice.
    pub fn resolve(&self, event_type: &str, clusters: &[String]) -> Vec<Matched> {
        let Some(buckets) = self.events.get(event_type) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        let mut add = |bucket: &ClusterBucket| {
            matched.extend(bucket.handlers.iter().map(|h| Matched {
                handler: h.clone(),
                cluster: bucket.cluster.clone(),
            }));
        };

        let wildcard = buckets.iter().find(|b| b.cluster == WILDCARD);
        for cluster in clusters {
            if let Some(bucket) = buckets.iter().find(|b| &b.cluster == cluster) {
                add(bucket);
            }
            if let Some(bucket) = wildcard {
                add(bucket);
            }
        }

        if clusters.iter().any(|c| c == WILDCARD) {
            buckets.iter().for_each(&mut add);
        }

        matched
    }

    /// Whether any of `clusters` has a literal bucket under `event_type`
    pub fn has_literal_bucket(&self, event_type: &str, clusters: &[String]) -> bool {
        self.events
            .get(event_type)
            .is_some_and(|buckets| buckets.iter().any(|b| clusters.contains(&b.cluster)))
    }

    /// Event type `id` is currently bound to
    pub fn bound_event(&self, id: HandlerId) -> Option<&str> {
        self.events
            .iter()
            .find(|(_, buckets)| {
                buckets
                    .iter()
                    .any(|b| b.handlers.iter().any(|h| h.id() == id))
            })
            .map(|(event_type, _)| event_type.as_str())
    }

    /// Whether `id` is registered anywhere under `event_type`
    pub fn contains(&self, event_type: &str, id: HandlerId) -> bool {
        self.events.get(event_type).is_some_and(|buckets| {
            buckets
                .iter()
                .any(|b| b.handlers.iter().any(|h| h.id() == id))
        })
    }

    /// Number of distinct handler identities under `event_type`
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        let Some(buckets) = self.events.get(event_type) else {
            return 0;
        };
        let mut ids: Vec<HandlerId> = buckets
            .iter()
            .flat_map(|b| b.handlers.iter().map(Handler::id))
            .collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn bucket(&self, event_type: &str, cluster: &str) -> Option<&[Handler]> {
        self.events
            .get(event_type)?
            .iter()
            .find(|b| b.cluster == cluster)
            .map(|b| b.handlers.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(name: &str) -> Handler {
        Handler::new(name, |_| Ok(()))
    }

    fn clusters(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    fn names(matched: &[Matched]) -> Vec<(String, String)> {
        matched
            .iter()
            .map(|m| (m.handler.class_name().to_string(), m.cluster.clone()))
            .collect()
    }

    #[test]
    fn test_insert_rejects_nil_identity() {
        let mut registry = SubscriptionRegistry::default();
        let bad = Handler::with_id(HandlerId::nil(), "NoId", |_| Ok(()));
        let err = registry.insert("temp", "*", &bad).unwrap_err();
        assert!(matches!(err, EventError::InvalidHandler(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_is_idempotent_per_cluster() {
        let mut registry = SubscriptionRegistry::default();
        let h = handler("H");
        assert_eq!(registry.insert("temp", "A", &h).unwrap(), Registration::Added);
        assert_eq!(registry.insert("temp", "A", &h).unwrap(), Registration::AlreadyPresent);
        assert_eq!(registry.resolve("temp", &clusters(&["A"])).len(), 1);
    }

    #[test]
    fn test_insert_rejects_second_event_type() {
        let mut registry = SubscriptionRegistry::default();
        let h = handler("H");
        registry.insert("E1", "A", &h).unwrap();

        let err = registry.insert("E2", "A", &h).unwrap_err();
        assert!(matches!(
            err,
            EventError::DuplicateHandlerAssignment { ref bound_to, ref requested, .. }
                if bound_to == "E1" && requested == "E2"
        ));
        assert!(registry.contains("E1", h.id()));
        assert!(!registry.contains("E2", h.id()));
    }

    #[test]
    fn test_same_event_other_cluster_allowed() {
        let mut registry = SubscriptionRegistry::default();
        let h = handler("H");
        registry.insert("temp", "A", &h).unwrap();
        registry.insert("temp", "B", &h).unwrap();
        assert_eq!(registry.subscriber_count("temp"), 1);
    }

    #[test]
    fn test_remove_scans_all_clusters_and_prunes() {
        let mut registry = SubscriptionRegistry::default();
        let h = handler("H");
        let other = handler("O");
        registry.insert("temp", "A", &h).unwrap();
        registry.insert("temp", "B", &h).unwrap();
        registry.insert("temp", "B", &other).unwrap();

        let removed = registry.remove("temp", &h).unwrap();
        assert_eq!(removed, vec!["A", "B"]);
        assert!(registry.bucket("temp", "A").is_none());
        assert_eq!(registry.bucket("temp", "B").map(|b| b.len()), Some(1));

        registry.remove("temp", &other).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_missing_handler() {
        let mut registry = SubscriptionRegistry::default();
        let h = handler("H");
        assert!(matches!(
            registry.remove("temp", &h),
            Err(EventError::HandlerNotFound { .. })
        ));

        registry.insert("temp", "A", &h).unwrap();
        assert!(matches!(
            registry.remove("temp", &handler("Other")),
            Err(EventError::HandlerNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_literal_and_wildcard() {
        let mut registry = SubscriptionRegistry::default();
        registry.insert("temp", "A", &handler("InA")).unwrap();
        registry.insert("temp", "B", &handler("InB")).unwrap();
        registry.insert("temp", "*", &handler("Any")).unwrap();

        let matched = registry.resolve("temp", &clusters(&["A"]));
        assert_eq!(
            names(&matched),
            vec![
                ("InA".to_string(), "A".to_string()),
                ("Any".to_string(), "*".to_string()),
            ]
        );

        assert!(registry.resolve("humidity", &clusters(&["A"])).is_empty());
    }

    #[test]
    fn test_resolve_wildcard_per_target_cluster() {
        let mut registry = SubscriptionRegistry::default();
        registry.insert("temp", "*", &handler("Any")).unwrap();

        let matched = registry.resolve("temp", &clusters(&["A", "B"]));
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_resolve_wildcard_target_reaches_every_bucket() {
        let mut registry = SubscriptionRegistry::default();
        registry.insert("temp", "A", &handler("InA")).unwrap();
        registry.insert("temp", "B", &handler("InB")).unwrap();

        let matched = registry.resolve("temp", &clusters(&["*"]));
        assert_eq!(
            names(&matched),
            vec![
                ("InA".to_string(), "A".to_string()),
                ("InB".to_string(), "B".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolve_wildcard_subscriber_on_wildcard_target() {
        let mut registry = SubscriptionRegistry::default();
        registry.insert("temp", "*", &handler("Any")).unwrap();

        // literal "*" bucket, wildcard path, then the every-bucket sweep
        let matched = registry.resolve("temp", &clusters(&["*"]));
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn test_resolve_keeps_registration_order() {
        let mut registry = SubscriptionRegistry::default();
        for name in ["first", "second", "third"] {
            registry.insert("temp", "A", &handler(name)).unwrap();
        }
        let order: Vec<String> = names(&registry.resolve("temp", &clusters(&["A"])))
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_has_literal_bucket() {
        let mut registry = SubscriptionRegistry::default();
        registry.insert("temp", "A", &handler("H")).unwrap();
        assert!(registry.has_literal_bucket("temp", &clusters(&["A", "B"])));
        assert!(!registry.has_literal_bucket("temp", &clusters(&["B"])));
        assert!(!registry.has_literal_bucket("other", &clusters(&["A"])));
    }
}
