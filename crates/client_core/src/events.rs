//! Event channel: fan-out of engine push notifications to subscribed handlers.

use std::{
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::FutureExt;
use shared::protocol::{EngineEvent, EventName};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EngineEvent) -> anyhow::Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EngineEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &EngineEvent) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Wraps a synchronous closure as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&EngineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    name: EventName,
    id: u64,
}

impl Subscription {
    pub fn name(&self) -> EventName {
        self.name
    }
}

type HandlerList = Vec<(u64, Arc<dyn EventHandler>)>;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<BTreeMap<EventName, HandlerList>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn subscribe(&self, name: EventName, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .await
            .entry(name)
            .or_default()
            .push((id, handler));
        debug!(event = %name, subscription = id, "subscribed event handler");
        Subscription { name, id }
    }

    /// Returns whether the subscription was still registered.
    pub async fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut handlers = self.handlers.write().await;
        let Some(list) = handlers.get_mut(&subscription.name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&subscription.name);
        }
        removed
    }

    pub async fn handler_count(&self, name: EventName) -> usize {
        self.handlers
            .read()
            .await
            .get(&name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers `event` to every handler of its name, in subscription order.
    ///
    /// A failing or panicking handler is logged and skipped; the rest still run.
    /// Returns the number of handlers that completed successfully.
    pub async fn dispatch(&self, event: &EngineEvent) -> usize {
        let name = event.name();
        let handlers: HandlerList = self
            .handlers
            .read()
            .await
            .get(&name)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(event = %name, "no handlers registered; dropping event");
            return 0;
        }

        let mut delivered = 0;
        for (id, handler) in handlers {
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    warn!(event = %name, subscription = id, error = %err, "event handler failed");
                }
                Err(_) => {
                    warn!(event = %name, subscription = id, "event handler panicked");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
