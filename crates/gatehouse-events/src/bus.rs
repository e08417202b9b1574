//! Auth event bus
//!
//! Subscribes once to the platform's `auth` channel and republishes the
//! lifecycle notifications that complete (or abort) a federated sign-in.

use crate::hub::{EventBusResult, HubChannel, HubListener};
use crate::types::{AuthEvent, HubEvent, AUTH_CHANNEL};
use tracing::{debug, info};
use uuid::Uuid;

/// Filtered view of the platform's auth lifecycle channel.
///
/// Holds exactly one hub subscription for its whole lifetime and releases it
/// when dropped.
#[derive(Debug)]
pub struct AuthEventBus {
    listener: HubListener,
}

impl AuthEventBus {
    /// Subscribe to the auth channel.
    pub fn attach(hub: &dyn HubChannel) -> EventBusResult<Self> {
        let listener = hub.listen(AUTH_CHANNEL)?;
        info!(listener_id = %listener.id(), "Auth event bus attached");
        Ok(Self { listener })
    }

    /// Subscription ID of the underlying listener.
    pub fn listener_id(&self) -> Uuid {
        self.listener.id()
    }

    /// Wait for the next auth event.
    ///
    /// Unrelated lifecycle events are skipped. Returns `None` once the hub
    /// side of the channel is gone.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            let raw = self.listener.recv().await.ok()?;
            if let Some(event) = Self::translate(&raw) {
                return Some(event);
            }
        }
    }

    /// Take the next already queued auth event without waiting.
    pub fn try_next(&mut self) -> Option<AuthEvent> {
        while let Some(raw) = self.listener.try_recv() {
            if let Some(event) = Self::translate(&raw) {
                return Some(event);
            }
        }
        None
    }

    fn translate(raw: &HubEvent) -> Option<AuthEvent> {
        let event = AuthEvent::from_hub(raw);
        match &event {
            Some(event) => debug!(hub_event = %raw.event, ?event, "Auth event received"),
            None => debug!(hub_event = %raw.event, "Ignoring lifecycle event"),
        }
        event
    }
}
