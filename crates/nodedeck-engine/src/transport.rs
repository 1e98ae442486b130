use nodedeck_core::TriggerPayload;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("subscribe failed: {0}")]
pub struct SubscribeError(pub String);

/// Handle for one active subscription. Unsubscribing is idempotent and
/// also happens on drop, so every exit path releases the subscription.
pub struct SubscriptionToken {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionToken {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("active", &self.is_active())
            .finish()
    }
}

/// External trigger transport as the engine consumes it: subscribe to a
/// named event and receive payloads through the given channel, in emit
/// order. The sink decouples delivery from state mutation; subscribers
/// never mutate engine state from the transport's own context.
pub trait TriggerTransport: Send + Sync {
    fn subscribe(
        &self,
        event: &str,
        sink: UnboundedSender<TriggerPayload>,
    ) -> Result<SubscriptionToken, SubscribeError>;
}

#[derive(Default)]
struct TransportInner {
    subscribers: Mutex<HashMap<String, Vec<(u64, UnboundedSender<TriggerPayload>)>>>,
    next_id: AtomicU64,
}

/// In-process trigger transport: emitters and subscribers share a
/// per-event sender list. Delivery order matches emit order.
#[derive(Clone, Default)]
pub struct LocalTrayTransport {
    inner: Arc<TransportInner>,
}

impl LocalTrayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a payload to all current subscribers of `event`. Returns
    /// how many subscribers received it; closed sinks are pruned.
    pub fn emit(&self, event: &str, payload: TriggerPayload) -> usize {
        let Ok(mut subscribers) = self.inner.subscribers.lock() else {
            debug!(event, "subscriber lock poisoned; dropping payload");
            return 0;
        };
        let Some(sinks) = subscribers.get_mut(event) else {
            return 0;
        };
        sinks.retain(|(_, sink)| sink.send(payload.clone()).is_ok());
        sinks.len()
    }
}

impl TriggerTransport for LocalTrayTransport {
    fn subscribe(
        &self,
        event: &str,
        sink: UnboundedSender<TriggerPayload>,
    ) -> Result<SubscriptionToken, SubscribeError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut subscribers = self
                .inner
                .subscribers
                .lock()
                .map_err(|_| SubscribeError("transport lock poisoned".to_string()))?;
            subscribers
                .entry(event.to_string())
                .or_default()
                .push((id, sink));
        }
        debug!(event, id, "trigger subscription registered");

        let inner = Arc::clone(&self.inner);
        let event = event.to_string();
        Ok(SubscriptionToken::new(move || {
            if let Ok(mut subscribers) = inner.subscribers.lock() {
                if let Some(sinks) = subscribers.get_mut(&event) {
                    sinks.retain(|(sink_id, _)| *sink_id != id);
                }
            }
            debug!(event = %event, id, "trigger subscription removed");
        }))
    }
}
