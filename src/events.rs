//! In-process lifecycle event bus (spec §4.1/§6).
//!
//! Publish is synchronous: every registered closure handler runs inline on
//! the publisher's call stack before `publish` returns, so handlers must not
//! block for long. A `tokio::sync::broadcast` channel is also exposed for
//! callers that would rather `.await` the next event than register a
//! closure — useful from async test code that wants to assert on ordering
//! without holding a lock across an await point.
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::config::ServiceSpec;

/// `serviceName` is carried alongside the full `service` descriptor (spec
/// §6) rather than derived from it, so observers can correlate on the name
/// alone without destructuring the spec.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Starting { service_name: String, service: ServiceSpec },
    Started { service_name: String, service: ServiceSpec },
    Failed { service_name: String, service: ServiceSpec, error: String },
    Stopping { service_name: String, service: ServiceSpec },
    Stopped { service_name: String, service: ServiceSpec },
}

impl LifecycleEvent {
    pub fn service_name(&self) -> &str {
        match self {
            LifecycleEvent::Starting { service_name, .. }
            | LifecycleEvent::Started { service_name, .. }
            | LifecycleEvent::Failed { service_name, .. }
            | LifecycleEvent::Stopping { service_name, .. }
            | LifecycleEvent::Stopped { service_name, .. } => service_name,
        }
    }

    /// The full service descriptor this event concerns (spec §6, spec §7:
    /// "observers can correlate failures with state").
    pub fn service(&self) -> &ServiceSpec {
        match self {
            LifecycleEvent::Starting { service, .. }
            | LifecycleEvent::Started { service, .. }
            | LifecycleEvent::Failed { service, .. }
            | LifecycleEvent::Stopping { service, .. }
            | LifecycleEvent::Stopped { service, .. } => service,
        }
    }
}

type Handler = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    handlers: Arc<Mutex<Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            sender,
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a synchronous handler. Handlers run in registration order,
    /// inline, on every `publish` call.
    pub fn on(&self, handler: impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
        self.handlers.lock().expect("event bus handler lock poisoned").push(Box::new(handler));
    }

    /// Subscribes to an async stream of events. Lagging subscribers miss the
    /// oldest buffered events rather than blocking the publisher.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LifecycleEvent) {
        for handler in self.handlers.lock().expect("event bus handler lock poisoned").iter() {
            handler(&event);
        }
        // No subscribers is not an error; it just means nobody's listening yet.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_run_synchronously_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = order.clone();
        bus.on(move |_| order_a.lock().unwrap().push("a"));
        let order_b = order.clone();
        bus.on(move |_| order_b.lock().unwrap().push("b"));

        bus.publish(LifecycleEvent::Starting {
            service_name: "api".into(),
            service: ServiceSpec::local("api", "true"),
        });

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(LifecycleEvent::Started {
            service_name: "db".into(),
            service: ServiceSpec::local("db", "true"),
        });

        let event = rx.recv().await.expect("event");
        assert_eq!(event.service_name(), "db");
        assert_eq!(event.service().name, "db");
    }

    #[test]
    fn counts_handler_invocations() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.on(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(LifecycleEvent::Stopped {
            service_name: "api".into(),
            service: ServiceSpec::local("api", "true"),
        });
        bus.publish(LifecycleEvent::Stopped {
            service_name: "api".into(),
            service: ServiceSpec::local("api", "true"),
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
