//! Fan-out dispatcher with per-handler failure isolation.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    marker::PhantomData,
    panic::AssertUnwindSafe,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    anyhow::Result,
    async_trait::async_trait,
    futures::FutureExt,
    tracing::{debug, trace, warn},
};

use crate::event::{Event, EventKind};

// ── Handler trait ───────────────────────────────────────────────────────────

/// Something that reacts to published events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// A human-readable name, used when reporting failures.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle(&self, event: &Event) -> Result<()>;
}

/// Adapter so plain async closures can subscribe.
struct FnHandler<F, Fut> {
    name: String,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        (self.f)(event.clone()).await
    }
}

// ── Subscriptions ───────────────────────────────────────────────────────────

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

// ── Error sink ──────────────────────────────────────────────────────────────

/// A handler that returned an error or panicked.
#[derive(Debug)]
pub struct HandlerFailure {
    pub event: EventKind,
    pub handler: String,
    pub error: anyhow::Error,
}

/// Receives every handler failure. There is exactly one sink per bus.
pub type ErrorSink = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

fn log_and_continue() -> ErrorSink {
    Arc::new(|failure: &HandlerFailure| {
        warn!(
            event = %failure.event,
            handler = %failure.handler,
            error = %failure.error,
            "event handler failed"
        );
    })
}

// ── EventBus ────────────────────────────────────────────────────────────────

/// In-process publish/subscribe hub.
///
/// Handlers for one `publish` are started together and awaited together; a
/// failing or panicking handler never affects its siblings or the publisher.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Subscription>>>,
    next_id: AtomicU64,
    error_sink: RwLock<ErrorSink>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            error_sink: RwLock::new(log_and_continue()),
        }
    }

    /// Replace the error sink (default: log and continue).
    pub fn set_error_sink(&self, sink: ErrorSink) {
        *self.error_sink.write().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    /// Register a handler. Subscribing the same handler twice yields two
    /// independent subscriptions.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(kind)
            .or_default()
            .push(Subscription { id, handler });
        debug!(event = %kind, subscription = %id, "event handler subscribed");
        id
    }

    /// Register an async closure as a handler.
    pub fn subscribe_fn<F, Fut>(
        &self,
        kind: EventKind,
        name: impl Into<String>,
        f: F,
    ) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.subscribe(
            kind,
            Arc::new(FnHandler {
                name: name.into(),
                f,
                _fut: PhantomData,
            }),
        )
    }

    /// Remove a subscription. No-op if it is not (or no longer) registered.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = handlers.get_mut(&kind) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                handlers.remove(&kind);
            }
        }
    }

    /// Number of handlers currently subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every current subscriber and wait for all of them.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe (themselves included) while running.
    pub async fn publish(&self, event: Event) {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match map.get(&kind) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.handler)).collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            trace!(event = %kind, "no subscribers");
            return;
        }

        debug!(event = %kind, count = handlers.len(), "publishing event");

        let event = &event;
        let futures = handlers.iter().map(|handler| async move {
            let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
            let result = match outcome {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            (handler.name().to_string(), result)
        });

        let results = futures::future::join_all(futures).await;

        let sink = Arc::clone(&self.error_sink.read().unwrap_or_else(|e| e.into_inner()));
        for (name, result) in results {
            if let Err(error) = result {
                sink(&HandlerFailure {
                    event: kind,
                    handler: name,
                    error,
                });
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex, OnceLock,
            atomic::{AtomicBool, AtomicUsize},
        },
        time::Duration,
    };

    use super::*;

    fn loaded(name: &str) -> Event {
        Event::PluginLoaded {
            name: name.into(),
            version: "1.0.0".into(),
        }
    }

    fn counting_sink() -> (ErrorSink, Arc<Mutex<Vec<(EventKind, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: ErrorSink = Arc::new(move |f: &HandlerFailure| {
            sink_seen
                .lock()
                .unwrap()
                .push((f.event, f.error.to_string()));
        });
        (sink, seen)
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(Event::GatewayStarted).await;
        assert_eq!(bus.listener_count(EventKind::GatewayStarted), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_run_concurrently() {
        let bus = EventBus::new();
        for ms in [10u64, 50] {
            bus.subscribe_fn(EventKind::GatewayStarted, format!("sleep-{ms}"), move |_| {
                async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(())
                }
            });
        }

        let start = tokio::time::Instant::now();
        bus.publish(Event::GatewayStarted).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn failing_handler_is_isolated_and_reported_once() {
        let bus = EventBus::new();
        let (sink, seen) = counting_sink();
        bus.set_error_sink(sink);

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        bus.subscribe_fn(EventKind::PluginLoaded, "boom", |_| async {
            Err(anyhow::anyhow!("boom"))
        });
        bus.subscribe_fn(EventKind::PluginLoaded, "ok", move |_| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::task::yield_now().await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        bus.publish(loaded("a")).await;

        assert!(finished.load(Ordering::SeqCst));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, EventKind::PluginLoaded);
        assert_eq!(seen[0].1, "boom");
    }

    #[tokio::test]
    async fn panicking_handler_is_reported() {
        struct Panicker;

        #[async_trait]
        impl EventHandler for Panicker {
            fn name(&self) -> &str {
                "panicker"
            }

            async fn handle(&self, _event: &Event) -> Result<()> {
                panic!("handler exploded");
            }
        }

        let bus = EventBus::new();
        let (sink, seen) = counting_sink();
        bus.set_error_sink(sink);
        bus.subscribe(EventKind::GatewayStopping, Arc::new(Panicker));

        bus.publish(Event::GatewayStopping).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1.contains("handler exploded"));
    }

    #[tokio::test]
    async fn same_handler_twice_runs_twice() {
        struct Counter(AtomicUsize);

        #[async_trait]
        impl EventHandler for Counter {
            async fn handle(&self, _event: &Event) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let bus = EventBus::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let first = bus.subscribe(EventKind::TaskCreated, counter.clone());
        bus.subscribe(EventKind::TaskCreated, counter.clone());
        assert_eq!(bus.listener_count(EventKind::TaskCreated), 2);

        let event = Event::TaskCreated {
            task_id: "t1".into(),
            agent_id: None,
            status: "open".into(),
        };
        bus.publish(event.clone()).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        bus.unsubscribe(EventKind::TaskCreated, first);
        bus.publish(event).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn handler_can_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id: Arc<OnceLock<SubscriptionId>> = Arc::new(OnceLock::new());

        let id = {
            let bus_ref = Arc::clone(&bus);
            let calls = Arc::clone(&calls);
            let own_id = Arc::clone(&own_id);
            bus.subscribe_fn(EventKind::SessionEnded, "once", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = own_id.get() {
                    bus_ref.unsubscribe(EventKind::SessionEnded, *id);
                }
                async { Ok(()) }
            })
        };
        own_id.set(id).unwrap();

        let sibling_calls = Arc::new(AtomicUsize::new(0));
        let sc = Arc::clone(&sibling_calls);
        bus.subscribe_fn(EventKind::SessionEnded, "sibling", move |_| {
            sc.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        let event = Event::SessionEnded {
            session_id: "s1".into(),
            agent_id: None,
        };
        bus.publish(event.clone()).await;
        bus.publish(event).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sibling_calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.listener_count(EventKind::SessionEnded), 1);
    }

    #[test]
    fn unsubscribe_unknown_is_a_noop() {
        let bus = EventBus::new();
        let id = bus.subscribe_fn(EventKind::MessageSent, "x", |_| async { Ok(()) });
        bus.unsubscribe(EventKind::MessageReceived, id);
        assert_eq!(bus.listener_count(EventKind::MessageSent), 1);
        bus.unsubscribe(EventKind::MessageSent, id);
        bus.unsubscribe(EventKind::MessageSent, id);
        assert_eq!(bus.listener_count(EventKind::MessageSent), 0);
    }
}
