//! Event bus
//!
//! Named-event publish/subscribe dispatch. Handlers for an event name are kept
//! in registration order; a publish starts every handler in that order on a
//! dedicated dispatch task and returns without waiting for them.
//!
//! A handler that returns an error or panics is logged and counted, and never
//! affects the other handlers of the same publish or the publisher.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::event::{Event, EventName, EventPayload};

/// A subscriber to bus events.
///
/// Every handler is driven as a future on the bus executor, so a handler that
/// finishes without awaiting behaves like a synchronous callback and one that
/// awaits yields to the scheduler at each suspension point.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs when the handler fails
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handle one event
    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}

/// Wrap an async closure as a shareable handler.
///
/// ```no_run
/// use parley_core::{handler_fn, EventBus, EventName};
///
/// let bus = EventBus::new();
/// bus.subscribe(
///     EventName::SessionCreated,
///     handler_fn("print", |event| async move {
///         println!("{:?}", event.payload());
///         anyhow::Ok(())
///     }),
/// );
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// Outcome of a single publish once every handler has finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that ran to completion, successfully or not
    pub invoked: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Handle to an in-progress publish.
///
/// Dropping it does not cancel the handlers.
#[derive(Debug)]
pub struct Dispatch {
    handle: Option<JoinHandle<DispatchReport>>,
}

impl Dispatch {
    fn empty() -> Self {
        Self { handle: None }
    }

    /// True when the event had no subscribers
    pub fn is_empty(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for every handler of this publish to finish.
    pub async fn finished(self) -> DispatchReport {
        match self.handle {
            None => DispatchReport::default(),
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!("Event dispatch task did not complete: {}", e);
                DispatchReport::default()
            }),
        }
    }
}

/// In-process publish/subscribe dispatcher.
///
/// Cloning is cheap and every clone shares the same subscriber lists, so one
/// bus is constructed at startup and handed to each component that needs it.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<DashMap<EventName, Vec<Arc<dyn EventHandler>>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(EventName, usize)> = self
            .handlers
            .iter()
            .map(|entry| (*entry.key(), entry.value().len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

impl EventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers for the same name run in registration order.
    pub fn subscribe(&self, name: EventName, handler: Arc<dyn EventHandler>) {
        debug!("Subscribing handler '{}' to '{}'", handler.name(), name);
        self.handlers.entry(name).or_default().push(handler);
    }

    /// Number of handlers registered for `name`
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.handlers.get(&name).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Publish an event to every handler registered for `name`.
    ///
    /// With no subscribers this is a no-op. Otherwise the handler list is
    /// snapshotted and a dispatch task is spawned that starts each handler in
    /// registration order; this call returns without waiting for them.
    pub fn publish(&self, name: EventName, payload: EventPayload) -> Dispatch {
        // Clone the list so the shard lock is not held while handlers run.
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(&name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!("No subscribers for '{}', event dropped", name);
            return Dispatch::empty();
        }

        let event = Arc::new(Event::new(name, payload));
        debug!("Publishing '{}' to {} handler(s)", name, handlers.len());

        Dispatch {
            handle: Some(tokio::spawn(dispatch(event, handlers))),
        }
    }
}

async fn dispatch(event: Arc<Event>, handlers: Vec<Arc<dyn EventHandler>>) -> DispatchReport {
    let mut running = FuturesUnordered::new();

    // FuturesUnordered polls newly pushed futures in insertion order, so every
    // handler is started in registration order before any is resumed.
    for handler in handlers {
        let event = Arc::clone(&event);
        running.push(async move {
            let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
            (handler, outcome)
        });
    }

    let mut report = DispatchReport::default();
    while let Some((handler, outcome)) = running.next().await {
        report.invoked += 1;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                report.failed += 1;
                warn!(
                    "Handler '{}' failed on '{}': {:#}",
                    handler.name(),
                    event.name(),
                    e
                );
            }
            Err(panic) => {
                report.failed += 1;
                error!(
                    "Handler '{}' panicked on '{}': {}",
                    handler.name(),
                    event.name(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }
    report
}

/// Best-effort text of a caught panic payload
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        fn name(&self) -> &str {
            "panics"
        }

        async fn handle(&self, _event: Arc<Event>) -> anyhow::Result<()> {
            panic!("handler exploded");
        }
    }

    fn recorder(log: Arc<Mutex<Vec<usize>>>, id: usize) -> Arc<dyn EventHandler> {
        handler_fn(format!("recorder-{}", id), move |_event| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(id);
                anyhow::Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        let dispatch = bus.publish(EventName::ResponseGenerated, EventPayload::message("s", "m"));

        assert!(dispatch.is_empty());
        assert_eq!(dispatch.finished().await, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in 0..4 {
            bus.subscribe(EventName::SessionCreated, recorder(Arc::clone(&log), id));
        }

        let report = bus
            .publish(EventName::SessionCreated, EventPayload::session("s1"))
            .finished()
            .await;

        assert_eq!(report.invoked, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            EventName::MessageReceived,
            handler_fn("fails", |_event| async {
                anyhow::Result::<()>::Err(anyhow::anyhow!("boom"))
            }),
        );
        bus.subscribe(EventName::MessageReceived, Arc::new(Panicking));
        bus.subscribe(EventName::MessageReceived, recorder(Arc::clone(&log), 7));

        let report = bus
            .publish(EventName::MessageReceived, EventPayload::message("s1", "hi"))
            .finished()
            .await;

        assert_eq!(report.invoked, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_publish_does_not_wait_for_async_handlers() {
        let bus = EventBus::new();
        let gate = Arc::new(Notify::new());
        let done = Arc::new(Mutex::new(false));

        let (gate_h, done_h) = (Arc::clone(&gate), Arc::clone(&done));
        bus.subscribe(
            EventName::ResponseGenerated,
            handler_fn("slow", move |_event| {
                let gate = Arc::clone(&gate_h);
                let done = Arc::clone(&done_h);
                async move {
                    gate.notified().await;
                    *done.lock().unwrap() = true;
                    anyhow::Ok(())
                }
            }),
        );

        let dispatch = bus.publish(EventName::ResponseGenerated, EventPayload::message("s", "m"));
        assert!(!*done.lock().unwrap());

        gate.notify_one();
        let report = dispatch.finished().await;
        assert_eq!(report.invoked, 1);
        assert!(*done.lock().unwrap());
    }

    #[tokio::test]
    async fn test_handler_receives_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_h = Arc::clone(&seen);
        bus.subscribe(
            EventName::ResponseGenerated,
            handler_fn("capture", move |event| {
                let seen = Arc::clone(&seen_h);
                async move {
                    *seen.lock().unwrap() = Some(event.payload().clone());
                    anyhow::Ok(())
                }
            }),
        );

        bus.publish(
            EventName::ResponseGenerated,
            EventPayload::message("abc", "done"),
        )
        .finished()
        .await;

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(EventPayload::message("abc", "done"))
        );
    }

    #[tokio::test]
    async fn test_subscriber_count_is_per_event() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventName::SessionClosed, recorder(Arc::clone(&log), 1));
        bus.subscribe(EventName::SessionClosed, recorder(Arc::clone(&log), 2));

        assert_eq!(bus.subscriber_count(EventName::SessionClosed), 2);
        assert_eq!(bus.subscriber_count(EventName::SessionCreated), 0);

        // Clones share subscriber lists.
        let clone = bus.clone();
        clone.subscribe(EventName::SessionCreated, recorder(log, 3));
        assert_eq!(bus.subscriber_count(EventName::SessionCreated), 1);
    }

    #[tokio::test]
    async fn test_subscribe_while_publishing() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventName::ServerStarted, recorder(Arc::clone(&log), 0));

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    bus.publish(EventName::ServerStarted, EventPayload::server("x"))
                        .finished()
                        .await;
                }
            })
        };
        for id in 1..20 {
            bus.subscribe(EventName::ServerStarted, recorder(Arc::clone(&log), id));
            tokio::task::yield_now().await;
        }
        publisher.await.unwrap();

        assert_eq!(bus.subscriber_count(EventName::ServerStarted), 20);
    }
}
