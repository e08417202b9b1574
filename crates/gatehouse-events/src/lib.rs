//! # Gatehouse Events
//!
//! This crate models the identity platform's lifecycle channel and turns its
//! notifications into the few events the sign-in flow cares about.
//!
//! ## Overview
//!
//! The gatehouse-events crate handles:
//! - **Hub channel**: The platform-wide notification channel, injected as a
//!   [`HubChannel`] rather than reached through a global
//! - **Listeners**: Scoped subscriptions that release themselves on drop
//! - **Auth events**: Redirect completion, redirect failure and custom OAuth
//!   state, filtered out of the raw lifecycle stream
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gatehouse_events::{AuthEvent, AuthEventBus, HubChannel, HubEvent, MemoryHub};
//!
//! async fn example() {
//!     let hub = MemoryHub::new();
//!     let mut bus = AuthEventBus::attach(&hub).unwrap();
//!
//!     hub.dispatch(HubEvent::auth("signInWithRedirect", serde_json::Value::Null))
//!         .unwrap();
//!
//!     assert_eq!(bus.next().await, Some(AuthEvent::RedirectCompleted));
//!
//!     // Dropping the bus releases the subscription
//!     drop(bus);
//!     assert_eq!(hub.stats().active_listeners, 0);
//! }
//! ```
//!
//! ## Lifecycle Events
//!
//! | hub event | auth event |
//! |---|---|
//! | `signInWithRedirect` | `RedirectCompleted` |
//! | `signInWithRedirect_failure` | `RedirectFailed(message)` |
//! | `customOAuthState` | `CustomStateReceived(state)` |
//!
//! Everything else on the `auth` channel (token refresh, sign-out, ...) is
//! ignored.

pub mod bus;
pub mod hub;
pub mod types;

// Re-export main types
pub use bus::AuthEventBus;
pub use hub::{
    EventBusError, EventBusResult, HubChannel, HubListener, HubStats, MemoryHub,
};
pub use types::{AuthEvent, HubEvent, AUTH_CHANNEL};
