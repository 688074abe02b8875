//! Handler invoker: failure-isolated delivery of one event
//!
//! Every invocation is wrapped so that an `Err` or a panic is reported to
//! the error sink and the remaining handlers still run.

use crate::config::DeliveryMode;
use crate::error::{HandlerError, HandlerResult};
use crate::handler::Handler;
use crate::registry::Matched;
use crate::types::Event;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub(crate) struct Invoker<'a> {
    pub mode: DeliveryMode,
    /// Called before each invocation
    pub on_invoke: &'a dyn Fn(&Event, &Handler),
    /// Called once per failed invocation
    pub on_error: &'a dyn Fn(&HandlerError, &Event, &Handler),
}

impl Invoker<'_> {
    /// Deliver `event` to every match, returning the number of failures
    pub fn deliver(&self, event: &Event, matches: &[Matched]) -> usize {
        match self.mode {
            DeliveryMode::Individual => matches
                .iter()
                .filter(|m| !self.invoke(event, &m.handler))
                .count(),
            DeliveryMode::Batch => group_by_cluster(matches)
                .into_iter()
                .map(|(cluster, handlers)| {
                    tracing::trace!(
                        event_type = %event.event_type,
                        cluster,
                        handlers = handlers.len(),
                        "Delivering cluster batch"
                    );
                    handlers
                        .into_iter()
                        .filter(|h| !self.invoke(event, h))
                        .count()
                })
                .sum(),
        }
    }

    fn invoke(&self, event: &Event, handler: &Handler) -> bool {
        (self.on_invoke)(event, handler);
        match invoke_isolated(handler, event) {
            Ok(()) => true,
            Err(err) => {
                (self.on_error)(&err, event, handler);
                false
            }
        }
    }
}

/// Call `handler`, turning a panic into `HandlerError::Panicked`
pub(crate) fn invoke_isolated(handler: &Handler, event: &Event) -> HandlerResult {
    catch_unwind(AssertUnwindSafe(|| handler.call(event)))
        .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)))
}

/// Group matches by cluster key, groups in order of first appearance
fn group_by_cluster(matches: &[Matched]) -> Vec<(&str, Vec<&Handler>)> {
    let mut groups: Vec<(&str, Vec<&Handler>)> = Vec::new();
    for m in matches {
        match groups.iter_mut().find(|(cluster, _)| *cluster == m.cluster) {
            Some((_, handlers)) => handlers.push(&m.handler),
            None => groups.push((m.cluster.as_str(), vec![&m.handler])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<String>>>;

    fn recording(name: &str, calls: &Calls) -> Handler {
        let calls = calls.clone();
        let label = name.to_string();
        Handler::new(name, move |_| {
            calls.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    fn matched(handler: &Handler, cluster: &str) -> Matched {
        Matched {
            handler: handler.clone(),
            cluster: cluster.to_string(),
        }
    }

    fn noop_invoke(_: &Event, _: &Handler) {}

    #[test]
    fn test_individual_isolates_failures() {
        let calls: Calls = Arc::default();
        let errors: Arc<Mutex<Vec<String>>> = Arc::default();

        let failing = Handler::new("Failing", |_| Err(HandlerError::msg("nope")));
        let panicking = Handler::new("Panicking", |_| panic!("boom"));
        let ok = recording("Ok", &calls);

        let sink = errors.clone();
        let on_error = move |err: &HandlerError, _: &Event, h: &Handler| {
            sink.lock().unwrap().push(format!("{}: {}", h.class_name(), err));
        };
        let invoker = Invoker {
            mode: DeliveryMode::Individual,
            on_invoke: &noop_invoke,
            on_error: &on_error,
        };

        let event = Event::new("temp", serde_json::json!({}));
        let failures = invoker.deliver(
            &event,
            &[matched(&failing, "A"), matched(&panicking, "A"), matched(&ok, "A")],
        );

        assert_eq!(failures, 2);
        assert_eq!(*calls.lock().unwrap(), vec!["Ok"]);
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["Failing: nope", "Panicking: handler panicked: boom"]
        );
    }

    #[test]
    fn test_batch_groups_by_cluster() {
        let calls: Calls = Arc::default();
        let a1 = recording("a1", &calls);
        let any = recording("any", &calls);
        let a2 = recording("a2", &calls);
        let b1 = recording("b1", &calls);

        let on_error = |_: &HandlerError, _: &Event, _: &Handler| {};
        let invoker = Invoker {
            mode: DeliveryMode::Batch,
            on_invoke: &noop_invoke,
            on_error: &on_error,
        };

        let event = Event::new("temp", serde_json::json!({}));
        let failures = invoker.deliver(
            &event,
            &[
                matched(&a1, "A"),
                matched(&any, "*"),
                matched(&b1, "B"),
                matched(&a2, "A"),
                matched(&any, "*"),
            ],
        );

        assert_eq!(failures, 0);
        assert_eq!(*calls.lock().unwrap(), vec!["a1", "a2", "any", "any", "b1"]);
    }

    #[test]
    fn test_on_invoke_sees_every_call() {
        let seen: Arc<Mutex<usize>> = Arc::default();
        let counter = seen.clone();
        let on_invoke = move |_: &Event, _: &Handler| *counter.lock().unwrap() += 1;
        let on_error = |_: &HandlerError, _: &Event, _: &Handler| {};
        let invoker = Invoker {
            mode: DeliveryMode::Individual,
            on_invoke: &on_invoke,
            on_error: &on_error,
        };

        let h = Handler::new("H", |_| Ok(()));
        let event = Event::new("temp", serde_json::json!({}));
        invoker.deliver(&event, &[matched(&h, "A"), matched(&h, "*")]);
        assert_eq!(*seen.lock().unwrap(), 2);
    }
}
