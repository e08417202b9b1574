//! # Gatehouse Session
//!
//! This crate drives sign-in against an identity pool: credential sign-in,
//! registration with confirmation codes, federated redirects, and the
//! authorized backend call that follows.
//!
//! ## Overview
//!
//! The gatehouse-session crate handles:
//! - **State machine**: Sign-in, sign-up, confirmation, resolution and the
//!   signed-in state, with stale responses discarded
//! - **Session resolution**: One path from "the platform has a session" to a
//!   normalized [`Identity`](gatehouse_identity::Identity)
//! - **Backend check**: A single bearer-token call to the protected API whose
//!   result is shown but never blocks sign-in
//! - **Platform interface**: The [`IdentityPlatform`] trait plus an in-memory
//!   implementation
//! - **Configuration**: Pool, OAuth and backend settings from the environment
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gatehouse_events::MemoryHub;
//! use gatehouse_session::{
//!     AuthState, AuthStateMachine, BackendAuthClient, ClientConfig, MemoryPlatform,
//! };
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let config = ClientConfig::from_env();
//!     let hub = MemoryHub::new();
//!     let platform = Arc::new(MemoryPlatform::with_hub(hub.clone()));
//!     let backend = Arc::new(BackendAuthClient::from_config(&config).unwrap());
//!
//!     let machine = AuthStateMachine::mount(platform, backend, &hub).unwrap();
//!     if machine.check_existing_session().await == AuthState::SignIn {
//!         machine.set_email("jane@example.com").await;
//!         machine.set_password("correct horse").await;
//!         machine.submit_sign_in().await;
//!     }
//!
//!     if let Some(result) = machine.backend_settled().await {
//!         println!("backend ok: {}", result.ok);
//!     }
//! }
//! ```
//!
//! ## Transitions
//!
//! | from | to | when |
//! |---|---|---|
//! | `Resolving` | `Authenticated` | existing session, redirect event, or sign-in |
//! | `Resolving` | `SignIn` | no session at startup |
//! | `SignIn` | `Failed { SignIn }` | bad credentials or network failure |
//! | `SignUp` | `Confirm` | account created, code required |
//! | `Confirm` | `Authenticated` | code accepted, automatic sign-in |
//! | any form | `SignIn` | back to sign-in |
//! | `Authenticated` | `SignIn` | sign-out |

pub mod backend;
pub mod config;
pub mod error;
pub mod machine;
pub mod memory;
pub mod platform;
pub mod resolver;
pub mod state;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use backend::{
    BackendAuthClient, BackendError, BackendResult, IntegrationStatus, ResourceAuthorizer,
};
pub use config::{BackendEndpoint, ClientConfig, ConfigError};
pub use error::{AuthFlowError, AuthFlowResult};
pub use machine::AuthStateMachine;
pub use memory::MemoryPlatform;
pub use platform::{
    AuthSession, CurrentUser, IdToken, IdentityPlatform, PlatformError, PlatformResult,
    SessionTokens, SignInNextStep, SignInOutcome, SignOutOptions, SignUpOutcome, SignUpRequest,
};
pub use resolver::{Resolution, SessionResolver};
pub use state::{AuthState, AuthenticatedSession, Credentials, FormMode};
