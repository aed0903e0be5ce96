//! Message delivery between counterparties
use crate::error::TransportError;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tracing::debug;

/// Callback receiving the wire bytes of a signed contract update.
pub type Handler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Delivers serialized signed updates and routes inbound ones by contract id.
///
/// A transport knows nothing about validation.
pub trait Transport: Send + Sync {
    fn send(&self, contract_id: &str, payload: &[u8]) -> Result<(), TransportError>;
    fn subscribe(&self, contract_id: &str, handler: Handler) -> Subscription;
}

/// Registration of a handler. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
    pub fn cancel(mut self) {
        self.run_cancel();
    }
    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type Routes = HashMap<String, Vec<(u64, Handler)>>;

/// In-process transport. Every subscriber of a contract id receives every
/// message sent on it, the sender's own channel included.
#[derive(Clone, Default)]
pub struct LocalBus {
    routes: Arc<Mutex<Routes>>,
    next_id: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }
    /// Simulate a network outage: sends fail until reconnected.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
    pub fn subscriber_count(&self, contract_id: &str) -> usize {
        self.routes
            .lock()
            .map(|routes| routes.get(contract_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl Transport for LocalBus {
    fn send(&self, contract_id: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        // handlers run without the route lock held so they may send in turn
        let handlers: Vec<Handler> = {
            let routes = self
                .routes
                .lock()
                .map_err(|_| TransportError::Other("route table poisoned".into()))?;
            routes
                .get(contract_id)
                .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            return Err(TransportError::NoRoute(contract_id.to_string()));
        }

        debug!(contract_id, subscribers = handlers.len(), "delivering contract update");
        for handler in handlers {
            handler(payload);
        }
        Ok(())
    }

    fn subscribe(&self, contract_id: &str, handler: Handler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut routes) = self.routes.lock() {
            routes
                .entry(contract_id.to_string())
                .or_default()
                .push((id, handler));
        }

        let routes = Arc::clone(&self.routes);
        let contract_id = contract_id.to_string();
        Subscription::new(move || {
            if let Ok(mut routes) = routes.lock() {
                if let Some(subs) = routes.get_mut(&contract_id) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                    if subs.is_empty() {
                        routes.remove(&contract_id);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<AtomicU64>, Handler) {
        let hits = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&hits);
        let handler: Handler = Arc::new(move |_: &[u8]| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handler)
    }

    #[test]
    fn delivers_to_subscribers_of_contract() {
        let bus = LocalBus::new();
        let (hits, handler) = counter();
        let (other_hits, other) = counter();

        let _sub = bus.subscribe("contract1a", handler);
        let _other = bus.subscribe("contract1b", other);

        bus.send("contract1a", b"payload").unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(other_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = LocalBus::new();
        let (hits, handler) = counter();

        let sub = bus.subscribe("contract1a", handler);
        assert_eq!(bus.subscriber_count("contract1a"), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count("contract1a"), 0);
        assert!(matches!(
            bus.send("contract1a", b"payload"),
            Err(TransportError::NoRoute(_))
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn offline_bus_fails_sends() {
        let bus = LocalBus::new();
        let (_hits, handler) = counter();
        let _sub = bus.subscribe("contract1a", handler);

        bus.set_offline(true);
        assert!(matches!(
            bus.send("contract1a", b"payload"),
            Err(TransportError::Disconnected)
        ));

        bus.set_offline(false);
        assert!(bus.send("contract1a", b"payload").is_ok());
    }
}
