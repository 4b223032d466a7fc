//! In-process pub/sub for built-in and application-defined events.
//!
//! Handlers run synchronously on the triggering thread, in subscription
//! order. A handler that errors or panics is logged and skipped; the rest
//! still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&[Value]) -> HandlerResult + Send + Sync>;

/// Built-in event names triggered by the session.
pub const CAMERA: &str = "camera";
pub const INSPECT: &str = "inspect";
pub const SELECT_OBJECT: &str = "select_object";
pub const GIZMO: &str = "gizmo";
pub const CONTROL: &str = "control";
pub const UPDATE_OBJECT: &str = "update_object";

/// Summary of one `trigger` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerReport {
    /// Handlers invoked.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Handlers for one event run in the
    /// order they were subscribed.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.lock().get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `event` with `args`.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// trigger further events without deadlocking.
    pub fn trigger(&self, event: &str, args: &[Value]) -> TriggerReport {
        let handlers: Vec<Handler> = match self.handlers.lock().get(event) {
            Some(list) => list.clone(),
            None => return TriggerReport::default(),
        };

        let mut report = TriggerReport::default();
        for (index, handler) in handlers.iter().enumerate() {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(event, index, error = %e, "event handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(event, index, "event handler panicked");
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock();
        let mut events: Vec<&String> = handlers.keys().collect();
        events.sort();
        f.debug_struct("EventDispatcher")
            .field("events", &events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_run_in_subscription_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(CAMERA, move |_args| {
                seen.lock().push(tag);
                Ok(())
            });
        }
        let report = dispatcher.trigger(CAMERA, &[]);
        assert_eq!(report.invoked, 3);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_handler_does_not_skip_others() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(Mutex::new(0));
        dispatcher.subscribe("custom", |_| Err("boom".into()));
        dispatcher.subscribe("custom", |_| panic!("handler panic"));
        {
            let hits = Arc::clone(&hits);
            dispatcher.subscribe("custom", move |args| {
                assert_eq!(args[0], serde_json::json!("payload"));
                *hits.lock() += 1;
                Ok(())
            });
        }
        let report = dispatcher.trigger("custom", &[serde_json::json!("payload")]);
        assert_eq!(report, TriggerReport { invoked: 3, failed: 2 });
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn unknown_event_is_noop() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.trigger("nobody", &[]), TriggerReport::default());
    }

    #[test]
    fn handler_may_subscribe_during_trigger() {
        let dispatcher = Arc::new(EventDispatcher::new());
        {
            let inner = Arc::clone(&dispatcher);
            dispatcher.subscribe(GIZMO, move |_| {
                inner.subscribe(GIZMO, |_| Ok(()));
                Ok(())
            });
        }
        assert_eq!(dispatcher.trigger(GIZMO, &[]).invoked, 1);
        assert_eq!(dispatcher.handler_count(GIZMO), 2);
    }
}
