//! Lifecycle channel abstraction
//!
//! The identity platform exposes one process-wide notification channel. It is
//! modelled as an injected [`HubChannel`] so each consumer owns an explicit
//! subscription whose lifetime is tied to a [`HubListener`] value.

use crate::types::HubEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Event bus error types.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Failed to subscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Failed to dispatch event
    #[error("Failed to dispatch event: {0}")]
    DispatchError(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Lifecycle channel statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Total events dispatched
    pub events_dispatched: u64,
    /// Total deliveries to listeners
    pub events_delivered: u64,
    /// Listeners currently subscribed
    pub active_listeners: usize,
}

/// The identity platform's lifecycle notification channel.
pub trait HubChannel: Send + Sync {
    /// Subscribe to a channel.
    ///
    /// The subscription lives as long as the returned listener.
    fn listen(&self, channel: &str) -> EventBusResult<HubListener>;

    /// Dispatch an event to every listener on its channel.
    ///
    /// Returns the number of listeners the event was delivered to.
    fn dispatch(&self, event: HubEvent) -> EventBusResult<usize>;

    /// Get channel statistics.
    fn stats(&self) -> HubStats;
}

/// Scoped subscription handle.
///
/// Dropping the listener releases the subscription, so a consumer that is
/// torn down and recreated never ends up with two live subscriptions.
pub struct HubListener {
    id: Uuid,
    channel: String,
    receiver: mpsc::UnboundedReceiver<HubEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for HubListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubListener")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("released", &self.release.is_none())
            .finish()
    }
}

impl HubListener {
    /// Create a listener.
    ///
    /// # Arguments
    ///
    /// * `id` - Subscription ID
    /// * `channel` - Channel name
    /// * `receiver` - Queue the channel delivers into
    /// * `release` - Called exactly once when the listener is dropped
    pub fn new(
        id: Uuid,
        channel: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<HubEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            channel: channel.into(),
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Subscription ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next event.
    pub async fn recv(&mut self) -> EventBusResult<HubEvent> {
        self.receiver.recv().await.ok_or(EventBusError::ChannelClosed)
    }

    /// Receive an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for HubListener {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

struct ListenerEntry {
    channel: String,
    sender: mpsc::UnboundedSender<HubEvent>,
}

#[derive(Default)]
struct HubInner {
    listeners: Mutex<HashMap<Uuid, ListenerEntry>>,
    events_dispatched: AtomicU64,
    events_delivered: AtomicU64,
}

impl HubInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<Uuid, ListenerEntry>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: Uuid) {
        if self.listeners().remove(&id).is_some() {
            debug!(listener_id = %id, "Hub listener released");
        }
    }
}

/// In-memory lifecycle channel.
///
/// Suitable for single-process clients and testing. Each listener gets its own
/// unbounded queue so a slow consumer never drops lifecycle events.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHub")
            .field("active_listeners", &self.inner.listeners().len())
            .finish()
    }
}

impl MemoryHub {
    /// Create a new in-memory hub.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HubChannel for MemoryHub {
    fn listen(&self, channel: &str) -> EventBusResult<HubListener> {
        if channel.trim().is_empty() {
            return Err(EventBusError::SubscribeError(
                "channel name must not be empty".to_string(),
            ));
        }

        let id = Uuid::now_v7();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.inner.listeners().insert(
            id,
            ListenerEntry {
                channel: channel.to_string(),
                sender,
            },
        );
        debug!(listener_id = %id, channel, "Hub listener registered");

        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        Ok(HubListener::new(id, channel, receiver, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        }))
    }

    fn dispatch(&self, event: HubEvent) -> EventBusResult<usize> {
        self.inner.events_dispatched.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let listeners = self.inner.listeners();
            for (id, entry) in listeners.iter().filter(|(_, e)| e.channel == event.channel) {
                if entry.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }

        for id in closed {
            self.inner.remove(id);
        }

        self.inner
            .events_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);

        debug!(
            channel = %event.channel,
            event = %event.event,
            delivered,
            "Hub event dispatched"
        );

        Ok(delivered)
    }

    fn stats(&self) -> HubStats {
        HubStats {
            events_dispatched: self.inner.events_dispatched.load(Ordering::Relaxed),
            events_delivered: self.inner.events_delivered.load(Ordering::Relaxed),
            active_listeners: self.inner.listeners().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_listen_and_dispatch() {
        let hub = MemoryHub::new();
        let mut listener = hub.listen("auth").unwrap();

        let delivered = hub.dispatch(HubEvent::auth("signInWithRedirect", Value::Null)).unwrap();
        assert_eq!(delivered, 1);

        let received = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            listener.recv(),
        )
        .await;

        assert_eq!(received.unwrap().unwrap().event, "signInWithRedirect");
    }

    #[test]
    fn test_channels_are_isolated() {
        let hub = MemoryHub::new();
        let mut auth = hub.listen("auth").unwrap();

        let delivered = hub
            .dispatch(HubEvent::new("storage", "upload", Value::Null))
            .unwrap();

        assert_eq!(delivered, 0);
        assert!(auth.try_recv().is_none());
    }

    #[test]
    fn test_drop_releases_listener() {
        let hub = MemoryHub::new();
        let listener = hub.listen("auth").unwrap();
        assert_eq!(hub.stats().active_listeners, 1);

        drop(listener);
        assert_eq!(hub.stats().active_listeners, 0);

        let delivered = hub.dispatch(HubEvent::auth("signInWithRedirect", Value::Null)).unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_listener_outliving_hub() {
        let hub = MemoryHub::new();
        let listener = hub.listen("auth").unwrap();
        drop(hub);
        drop(listener);
    }

    #[test]
    fn test_empty_channel_rejected() {
        let hub = MemoryHub::new();
        assert!(matches!(hub.listen(""), Err(EventBusError::SubscribeError(_))));
    }

    #[test]
    fn test_stats() {
        let hub = MemoryHub::new();
        let _a = hub.listen("auth").unwrap();
        let _b = hub.listen("auth").unwrap();

        hub.dispatch(HubEvent::auth("customOAuthState", Value::Null)).unwrap();

        let stats = hub.stats();
        assert_eq!(stats.events_dispatched, 1);
        assert_eq!(stats.events_delivered, 2);
        assert_eq!(stats.active_listeners, 2);
    }
}
