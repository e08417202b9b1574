//! In-memory identity platform
//!
//! A single-process [`IdentityPlatform`] with its own user store. Useful for
//! local development and tests: it behaves like a hosted user pool (password
//! policy, confirmation codes, unconfirmed accounts) and publishes redirect
//! completions on a [`MemoryHub`] the way the hosted platform does.

use crate::platform::{
    AuthSession, CurrentUser, IdToken, IdentityPlatform, PlatformError, PlatformResult,
    SignInNextStep, SignInOutcome, SignOutOptions, SignUpOutcome, SignUpRequest,
};
use async_trait::async_trait;
use gatehouse_events::types::names;
use gatehouse_events::{HubChannel, HubEvent, MemoryHub};
use gatehouse_identity::claims::names as claim_names;
use gatehouse_identity::{ClaimSet, FederatedProvider};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confirmation code issued to new accounts unless overridden.
pub const DEFAULT_CONFIRMATION_CODE: &str = "123456";

const MIN_POOL_PASSWORD_LENGTH: usize = 8;

/// Calls made against a [`MemoryPlatform`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformCalls {
    /// Credential sign-ins as (username, password)
    pub sign_ins: Vec<(String, String)>,
    /// Registrations
    pub sign_ups: Vec<String>,
    /// Confirmations as (username, code)
    pub confirmations: Vec<(String, String)>,
    /// Federated redirects started
    pub redirects: Vec<String>,
    /// `get_current_user` calls
    pub current_user_lookups: u32,
    /// `fetch_user_attributes` calls
    pub attribute_fetches: u32,
    /// Sign-outs, `true` for global
    pub sign_outs: Vec<bool>,
}

impl PlatformCalls {
    /// Total network-backed form calls (sign-in, sign-up, confirm).
    pub fn form_calls(&self) -> usize {
        self.sign_ins.len() + self.sign_ups.len() + self.confirmations.len()
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    user_attributes: bool,
    global_sign_out: bool,
    local_sign_out: bool,
    redirects: bool,
}

struct Account {
    user_id: String,
    password: String,
    confirmed: bool,
    code: String,
    attributes: HashMap<String, String>,
    issued_token: Option<String>,
}

struct ActiveSession {
    user: CurrentUser,
    id_token: IdToken,
    attributes: ClaimSet,
}

#[derive(Default)]
struct PlatformData {
    accounts: HashMap<String, Account>,
    session: Option<ActiveSession>,
    calls: PlatformCalls,
    faults: Faults,
    auto_confirm: bool,
    latency: Option<Duration>,
    sign_in_hold: Option<Arc<Semaphore>>,
}

/// In-memory identity platform.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    data: Arc<Mutex<PlatformData>>,
    hub: Option<MemoryHub>,
}

impl std::fmt::Debug for MemoryPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data();
        f.debug_struct("MemoryPlatform")
            .field("accounts", &data.accounts.len())
            .field("signed_in", &data.session.is_some())
            .field("has_hub", &self.hub.is_some())
            .finish()
    }
}

impl MemoryPlatform {
    /// Create a platform with no hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a platform that publishes lifecycle events on `hub`.
    pub fn with_hub(hub: MemoryHub) -> Self {
        Self {
            data: Arc::default(),
            hub: Some(hub),
        }
    }

    fn data(&self) -> MutexGuard<'_, PlatformData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.data().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn publish(&self, event: HubEvent) {
        if let Some(hub) = &self.hub {
            if let Err(e) = hub.dispatch(event) {
                warn!(error = %e, "Failed to publish lifecycle event");
            }
        }
    }

    /// Add a confirmed account and return its user ID.
    pub fn register(&self, email: &str, password: &str, name: Option<&str>) -> String {
        let user_id = Uuid::now_v7().to_string();
        let mut attributes = HashMap::new();
        attributes.insert(claim_names::EMAIL.to_string(), email.to_string());
        if let Some(name) = name {
            attributes.insert(claim_names::NAME.to_string(), name.to_string());
        }

        self.data().accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
                confirmed: true,
                code: DEFAULT_CONFIRMATION_CODE.to_string(),
                attributes,
                issued_token: None,
            },
        );
        user_id
    }

    /// Issue `raw` as the ID token for every sign-in of `email`.
    ///
    /// The token is handed out without a decoded payload, so consumers have
    /// to decode it themselves. Returns `false` if no such account exists.
    pub fn issue_token(&self, email: &str, raw: impl Into<String>) -> bool {
        match self.data().accounts.get_mut(email) {
            Some(account) => {
                account.issued_token = Some(raw.into());
                true
            }
            None => false,
        }
    }

    /// Install a session directly, as if it survived from an earlier visit.
    pub fn establish_session(&self, user: CurrentUser, id_token: IdToken, attributes: ClaimSet) {
        debug!(user_id = %user.user_id, "Session established");
        self.data().session = Some(ActiveSession {
            user,
            id_token,
            attributes,
        });
    }

    /// Finish a federated redirect: store a session carrying `claims` and
    /// publish the completion events.
    pub fn complete_redirect(&self, user_id: &str, claims: ClaimSet, custom_state: Option<&str>) {
        let username = claims
            .string(claim_names::COGNITO_USERNAME)
            .unwrap_or_else(|| user_id.to_string());
        let id_token = IdToken::new(opaque_token(user_id)).with_payload(claims.clone());

        self.establish_session(
            CurrentUser {
                user_id: user_id.to_string(),
                username,
            },
            id_token,
            claims,
        );

        self.publish(HubEvent::auth(names::SIGN_IN_WITH_REDIRECT, Value::Null));
        if let Some(state) = custom_state {
            self.publish(HubEvent::auth(
                names::CUSTOM_OAUTH_STATE,
                Value::String(state.to_string()),
            ));
        }
    }

    /// Publish a failed federated redirect.
    pub fn fail_redirect(&self, message: &str) {
        self.publish(
            HubEvent::auth(names::SIGN_IN_WITH_REDIRECT_FAILURE, Value::Null).with_message(message),
        );
    }

    /// Raw ID token of the current session.
    pub fn current_id_token(&self) -> Option<String> {
        self.data().session.as_ref().map(|s| s.id_token.raw.clone())
    }

    /// Check if a session exists.
    pub fn is_signed_in(&self) -> bool {
        self.data().session.is_some()
    }

    /// Snapshot of the calls made so far.
    pub fn calls(&self) -> PlatformCalls {
        self.data().calls.clone()
    }

    /// Delay every platform call.
    pub fn set_latency(&self, latency: Duration) {
        self.data().latency = Some(latency);
    }

    /// Confirm new accounts at sign-up without a code.
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.data().auto_confirm = enabled;
    }

    /// Make `fetch_user_attributes` fail.
    pub fn fail_user_attributes(&self, fail: bool) {
        self.data().faults.user_attributes = fail;
    }

    /// Make sign-out fail for the given scope.
    pub fn fail_sign_out(&self, global: bool, local: bool) {
        let mut data = self.data();
        data.faults.global_sign_out = global;
        data.faults.local_sign_out = local;
    }

    /// Reject federated redirect requests.
    pub fn reject_redirects(&self, reject: bool) {
        self.data().faults.redirects = reject;
    }

    /// Keep sign-in calls waiting until [`release_sign_ins`](Self::release_sign_ins).
    ///
    /// The call is recorded before it waits, and the password is checked
    /// after it resumes.
    pub fn hold_sign_ins(&self) {
        self.data()
            .sign_in_hold
            .get_or_insert_with(|| Arc::new(Semaphore::new(0)));
    }

    /// Let held and future sign-in calls proceed.
    pub fn release_sign_ins(&self) {
        if let Some(hold) = self.data().sign_in_hold.take() {
            hold.close();
        }
    }
}

fn opaque_token(user_id: &str) -> String {
    format!("memory.{}.{}", user_id, Uuid::now_v7().simple())
}

fn session_claims(user_id: &str, username: &str, attributes: &HashMap<String, String>) -> ClaimSet {
    let mut claims = ClaimSet::from_attributes(attributes.clone());
    claims.insert(claim_names::SUB, user_id);
    claims.insert(claim_names::COGNITO_USERNAME, username);
    if !claims.contains(claim_names::EMAIL_VERIFIED) {
        claims.insert(claim_names::EMAIL_VERIFIED, true);
    }
    claims
}

#[async_trait]
impl IdentityPlatform for MemoryPlatform {
    async fn sign_in(&self, username: &str, password: &str) -> PlatformResult<SignInOutcome> {
        self.data()
            .calls
            .sign_ins
            .push((username.to_string(), password.to_string()));
        self.simulate_latency().await;

        let hold = self.data().sign_in_hold.clone();
        if let Some(hold) = hold {
            // Closed on release
            let _ = hold.acquire().await;
        }

        let mut data = self.data();
        let account = data
            .accounts
            .get(username)
            .ok_or_else(|| PlatformError::UserNotFound("User does not exist.".to_string()))?;

        if account.password != password {
            return Err(PlatformError::NotAuthorized(
                "Incorrect username or password.".to_string(),
            ));
        }

        if !account.confirmed {
            return Ok(SignInOutcome {
                is_signed_in: false,
                next_step: SignInNextStep::ConfirmSignUp,
            });
        }

        let user_id = account.user_id.clone();
        let claims = session_claims(&user_id, username, &account.attributes);
        let id_token = match &account.issued_token {
            Some(raw) => IdToken::new(raw.clone()),
            None => IdToken::new(opaque_token(&user_id)).with_payload(claims.clone()),
        };
        data.session = Some(ActiveSession {
            user: CurrentUser {
                user_id: user_id.clone(),
                username: username.to_string(),
            },
            id_token,
            attributes: claims,
        });

        info!(user_id = %user_id, "Signed in");
        Ok(SignInOutcome::signed_in())
    }

    async fn sign_up(&self, request: SignUpRequest) -> PlatformResult<SignUpOutcome> {
        self.data().calls.sign_ups.push(request.username.clone());
        self.simulate_latency().await;

        let mut data = self.data();
        if data.accounts.contains_key(&request.username) {
            return Err(PlatformError::UsernameExists(
                "An account with the given email already exists.".to_string(),
            ));
        }
        if request.password.chars().count() < MIN_POOL_PASSWORD_LENGTH {
            return Err(PlatformError::InvalidPassword(
                "Password did not conform with policy: Password not long enough".to_string(),
            ));
        }

        let user_id = Uuid::now_v7().to_string();
        let confirmed = data.auto_confirm;
        data.accounts.insert(
            request.username.clone(),
            Account {
                user_id: user_id.clone(),
                password: request.password,
                confirmed,
                code: DEFAULT_CONFIRMATION_CODE.to_string(),
                attributes: request.attributes,
                issued_token: None,
            },
        );

        debug!(user_id = %user_id, confirmed, "Account created");
        Ok(SignUpOutcome {
            user_confirmed: confirmed,
            user_id: Some(user_id),
        })
    }

    async fn confirm_sign_up(&self, username: &str, code: &str) -> PlatformResult<()> {
        self.data()
            .calls
            .confirmations
            .push((username.to_string(), code.to_string()));
        self.simulate_latency().await;

        let mut data = self.data();
        let account = data
            .accounts
            .get_mut(username)
            .ok_or_else(|| PlatformError::UserNotFound("Username/client id combination not found.".to_string()))?;

        if account.code != code.trim() {
            return Err(PlatformError::CodeMismatch(
                "Invalid verification code provided, please try again.".to_string(),
            ));
        }

        account.confirmed = true;
        Ok(())
    }

    async fn sign_in_with_redirect(
        &self,
        provider: FederatedProvider,
        custom_state: Option<String>,
    ) -> PlatformResult<()> {
        self.data().calls.redirects.push(provider.as_str().to_string());
        self.simulate_latency().await;

        if self.data().faults.redirects {
            return Err(PlatformError::Service {
                code: "OAuthNotConfigureException".to_string(),
                message: "oauth param not configured.".to_string(),
            });
        }

        debug!(provider = %provider, has_state = custom_state.is_some(), "Redirect started");
        Ok(())
    }

    async fn get_current_user(&self) -> PlatformResult<CurrentUser> {
        self.data().calls.current_user_lookups += 1;
        self.simulate_latency().await;

        self.data()
            .session
            .as_ref()
            .map(|s| s.user.clone())
            .ok_or(PlatformError::NotAuthenticated)
    }

    async fn fetch_auth_session(&self) -> PlatformResult<AuthSession> {
        self.simulate_latency().await;

        Ok(self
            .data()
            .session
            .as_ref()
            .map(|s| AuthSession::with_id_token(s.id_token.clone()))
            .unwrap_or_default())
    }

    async fn fetch_user_attributes(&self) -> PlatformResult<ClaimSet> {
        self.data().calls.attribute_fetches += 1;
        self.simulate_latency().await;

        let data = self.data();
        if data.faults.user_attributes {
            return Err(PlatformError::Service {
                code: "InternalErrorException".to_string(),
                message: "attribute lookup failed".to_string(),
            });
        }

        data.session
            .as_ref()
            .map(|s| s.attributes.clone())
            .ok_or(PlatformError::NotAuthenticated)
    }

    async fn sign_out(&self, options: SignOutOptions) -> PlatformResult<()> {
        self.data().calls.sign_outs.push(options.global);
        self.simulate_latency().await;

        {
            let mut data = self.data();
            let fail = if options.global {
                data.faults.global_sign_out
            } else {
                data.faults.local_sign_out
            };
            if fail {
                return Err(PlatformError::Network("sign-out request failed".to_string()));
            }
            data.session = None;
        }

        self.publish(HubEvent::auth("signedOut", Value::Null));
        Ok(())
    }
}
