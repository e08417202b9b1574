//! Sign-in state machine
//!
//! Owns the form state and drives every transition between signed-out forms,
//! session resolution and the signed-in state.
//!
//! Methods take `&self` so a UI can poll state while a submission is in
//! flight. State lives behind a lock that is never held across a platform
//! call. Each transition captures an epoch; mode switches, new submissions,
//! committed sessions and sign-out bump it, and a completion whose epoch is
//! stale is dropped.

use crate::backend::{BackendResult, ResourceAuthorizer};
use crate::error::{AuthFlowError, AuthFlowResult, SIGN_IN_FAILED, SIGN_OUT_FAILED};
use crate::platform::{
    IdentityPlatform, PlatformResult, SignInNextStep, SignInOutcome, SignOutOptions,
    SignUpRequest,
};
use crate::resolver::SessionResolver;
use crate::state::{AuthState, AuthenticatedSession, Credentials, FormMode};
use gatehouse_events::{AuthEvent, AuthEventBus, EventBusResult, HubChannel};
use gatehouse_identity::claims::names as claim_names;
use gatehouse_identity::{FederatedProvider, Identity};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Role attribute written to new accounts.
pub const DEFAULT_USER_ROLE: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Startup,
    Redirect,
    Credentials,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Redirect => "redirect",
            Trigger::Credentials => "credentials",
        }
    }
}

struct MachineInner {
    state: AuthState,
    credentials: Credentials,
    busy: bool,
    checking_auth: bool,
    epoch: u64,
    backend_check: Option<BackendCheck>,
}

/// The background backend call of the current session.
struct BackendCheck {
    task: JoinHandle<()>,
    settled: watch::Receiver<bool>,
}

impl MachineInner {
    /// Start a network-backed submission.
    fn begin(&mut self) -> u64 {
        self.epoch += 1;
        self.busy = true;
        self.epoch
    }

    fn fail(&mut self, form: FormMode, error: AuthFlowError) {
        self.busy = false;
        self.state = AuthState::Failed { form, error };
    }

    fn abort_backend(&mut self) {
        if let Some(check) = self.backend_check.take() {
            check.task.abort();
        }
    }

    /// Returns the current state when a submission for `form` must be ignored.
    fn reject_submission(&self, form: FormMode) -> Option<AuthState> {
        if self.busy {
            debug!(form = %form, "Submission ignored while another is in flight");
            return Some(self.state.clone());
        }
        if self.state.form() != Some(form) {
            debug!(form = %form, state = self.state.name(), "Submission ignored; form not active");
            return Some(self.state.clone());
        }
        None
    }
}

/// Sign-in flow controller.
pub struct AuthStateMachine {
    platform: Arc<dyn IdentityPlatform>,
    resolver: SessionResolver,
    inner: Arc<RwLock<MachineInner>>,
    events: Mutex<Option<AuthEventBus>>,
    mounted: watch::Sender<bool>,
}

impl std::fmt::Debug for AuthStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateMachine")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl AuthStateMachine {
    /// Create the machine and subscribe to the platform's auth channel.
    ///
    /// The subscription is held until [`unmount`](Self::unmount) or drop.
    pub fn mount(
        platform: Arc<dyn IdentityPlatform>,
        authorizer: Arc<dyn ResourceAuthorizer>,
        hub: &dyn HubChannel,
    ) -> EventBusResult<Self> {
        let bus = AuthEventBus::attach(hub)?;
        Ok(Self::build(platform, authorizer, Some(bus)))
    }

    /// Create the machine without a hub subscription.
    ///
    /// Redirect events must then be fed in through [`handle_event`](Self::handle_event).
    pub fn detached(
        platform: Arc<dyn IdentityPlatform>,
        authorizer: Arc<dyn ResourceAuthorizer>,
    ) -> Self {
        Self::build(platform, authorizer, None)
    }

    fn build(
        platform: Arc<dyn IdentityPlatform>,
        authorizer: Arc<dyn ResourceAuthorizer>,
        bus: Option<AuthEventBus>,
    ) -> Self {
        let resolver = SessionResolver::new(Arc::clone(&platform), authorizer);
        Self {
            platform,
            resolver,
            inner: Arc::new(RwLock::new(MachineInner {
                state: AuthState::Resolving,
                credentials: Credentials::default(),
                busy: false,
                checking_auth: true,
                epoch: 0,
                backend_check: None,
            })),
            mounted: watch::channel(bus.is_some()).0,
            events: Mutex::new(bus),
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Current state.
    pub async fn state(&self) -> AuthState {
        self.inner.read().await.state.clone()
    }

    /// Whether a form submission is in flight.
    pub async fn is_busy(&self) -> bool {
        self.inner.read().await.busy
    }

    /// Whether the machine is still looking for an existing or redirected session.
    pub async fn is_checking_auth(&self) -> bool {
        self.inner.read().await.checking_auth
    }

    /// Current form input.
    pub async fn credentials(&self) -> Credentials {
        self.inner.read().await.credentials.clone()
    }

    /// Signed-in identity.
    pub async fn identity(&self) -> Option<Arc<Identity>> {
        self.inner.read().await.state.identity().cloned()
    }

    /// Whether the auth channel subscription is held.
    pub async fn is_mounted(&self) -> bool {
        *self.mounted.borrow()
    }

    // ---------------------------------------------------------------------
    // Form input
    // ---------------------------------------------------------------------

    /// Edit the form input.
    pub async fn update_credentials<F>(&self, update: F)
    where
        F: FnOnce(&mut Credentials) + Send,
    {
        update(&mut self.inner.write().await.credentials);
    }

    /// Set the email.
    pub async fn set_email(&self, email: impl Into<String>) {
        let email = email.into();
        self.update_credentials(|c| c.email = email).await;
    }

    /// Set the password.
    pub async fn set_password(&self, password: impl Into<String>) {
        let password = password.into();
        self.update_credentials(|c| c.password = password).await;
    }

    /// Set the repeated password.
    pub async fn set_confirm_password(&self, password: impl Into<String>) {
        let password = password.into();
        self.update_credentials(|c| c.confirm_password = password).await;
    }

    /// Set the display name.
    pub async fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.update_credentials(|c| c.name = name).await;
    }

    /// Set the confirmation code.
    pub async fn set_confirmation_code(&self, code: impl Into<String>) {
        let code = code.into();
        self.update_credentials(|c| c.confirmation_code = code).await;
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    /// Look for a session that already exists (startup).
    #[instrument(skip(self))]
    pub async fn check_existing_session(&self) -> AuthState {
        let epoch = {
            let mut inner = self.inner.write().await;
            if inner.state.is_authenticated() {
                return inner.state.clone();
            }
            inner.checking_auth = true;
            inner.epoch
        };

        self.resolve_session(Trigger::Startup, epoch).await
    }

    /// Sign in with the entered email and password.
    #[instrument(skip(self))]
    pub async fn submit_sign_in(&self) -> AuthState {
        let (epoch, email, password) = {
            let mut inner = self.inner.write().await;
            if let Some(state) = inner.reject_submission(FormMode::SignIn) {
                return state;
            }
            let epoch = inner.begin();
            inner.state = AuthState::SignIn;
            (
                epoch,
                inner.credentials.email.clone(),
                inner.credentials.password.clone(),
            )
        };

        let result = self.platform.sign_in(&email, &password).await;
        self.after_sign_in(epoch, result).await
    }

    /// Register with the entered details.
    #[instrument(skip(self))]
    pub async fn submit_sign_up(&self) -> AuthState {
        let (epoch, request) = {
            let mut inner = self.inner.write().await;
            if let Some(state) = inner.reject_submission(FormMode::SignUp) {
                return state;
            }

            if let Err(error) = inner.credentials.validate_sign_up() {
                debug!(code = error.error_code(), "Sign-up input rejected");
                inner.epoch += 1;
                inner.fail(FormMode::SignUp, error);
                return inner.state.clone();
            }

            let epoch = inner.begin();
            inner.state = AuthState::SignUp;

            let credentials = &inner.credentials;
            let request = SignUpRequest::new(&credentials.email, &credentials.password)
                .with_attribute(claim_names::EMAIL, &credentials.email)
                .with_attribute(claim_names::NAME, &credentials.name)
                .with_attribute(claim_names::CUSTOM_USER_ROLE, DEFAULT_USER_ROLE);
            (epoch, request)
        };

        let result = self.platform.sign_up(request).await;
        {
            let mut inner = self.inner.write().await;
            if inner.epoch != epoch {
                debug!("Discarding stale sign-up response");
                return inner.state.clone();
            }

            match result {
                Ok(outcome) if outcome.user_confirmed => {
                    info!("Account confirmed at sign-up; signing in");
                }
                Ok(outcome) => {
                    info!(user_id = ?outcome.user_id, "Account created; confirmation required");
                    inner.busy = false;
                    inner.credentials.clear_code();
                    inner.state = AuthState::Confirm;
                    return inner.state.clone();
                }
                Err(e) => {
                    warn!(error = %e, "Sign-up rejected");
                    inner.fail(FormMode::SignUp, AuthFlowError::from_sign_up(&e));
                    return inner.state.clone();
                }
            }
        }

        self.sign_in_with_form_credentials(epoch).await
    }

    /// Confirm the registration, then sign in with the same credentials.
    #[instrument(skip(self))]
    pub async fn submit_confirmation(&self) -> AuthState {
        let (epoch, email, code) = {
            let mut inner = self.inner.write().await;
            if let Some(state) = inner.reject_submission(FormMode::Confirm) {
                return state;
            }
            let epoch = inner.begin();
            inner.state = AuthState::Confirm;
            (
                epoch,
                inner.credentials.email.clone(),
                inner.credentials.confirmation_code.trim().to_string(),
            )
        };

        let result = self.platform.confirm_sign_up(&email, &code).await;
        {
            let mut inner = self.inner.write().await;
            if inner.epoch != epoch {
                debug!("Discarding stale confirmation response");
                return inner.state.clone();
            }
            if let Err(e) = result {
                warn!(error = %e, "Confirmation rejected");
                inner.fail(FormMode::Confirm, AuthFlowError::from_confirm(&e));
                return inner.state.clone();
            }
            info!("Registration confirmed; signing in");
        }

        self.sign_in_with_form_credentials(epoch).await
    }

    /// Start a federated sign-in.
    ///
    /// Returns once the redirect is requested. Completion arrives on the auth
    /// channel.
    #[instrument(skip_all, fields(provider = %provider))]
    pub async fn sign_in_with_provider(
        &self,
        provider: FederatedProvider,
        custom_state: Option<String>,
    ) -> AuthState {
        let epoch = {
            let mut inner = self.inner.write().await;
            if let Some(state) = inner.reject_submission(FormMode::SignIn) {
                return state;
            }
            let epoch = inner.begin();
            inner.checking_auth = true;
            inner.state = AuthState::Resolving;
            epoch
        };

        let result = self
            .platform
            .sign_in_with_redirect(provider.clone(), custom_state)
            .await;

        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            return inner.state.clone();
        }
        inner.busy = false;

        match result {
            Ok(()) => info!("Redirect requested; waiting for completion"),
            Err(e) if matches!(inner.state, AuthState::Resolving) => {
                warn!(error = %e, "Redirect request rejected");
                inner.checking_auth = false;
                inner.fail(FormMode::SignIn, AuthFlowError::federated(provider.as_str()));
            }
            Err(e) => debug!(error = %e, "Redirect request failed after the state moved on"),
        }
        inner.state.clone()
    }

    /// Switch to another form. Clears the error and confirmation code.
    pub async fn switch_mode(&self, form: FormMode) -> AuthState {
        let mut inner = self.inner.write().await;
        if inner.state.is_authenticated() {
            debug!(form = %form, "Mode switch ignored while signed in");
            return inner.state.clone();
        }

        let leaving_registration = inner
            .state
            .form()
            .map_or(false, |current| current.is_registration())
            && !form.is_registration();

        inner.epoch += 1;
        inner.busy = false;
        inner.checking_auth = false;
        if leaving_registration {
            inner.credentials.clear_registration();
        } else {
            inner.credentials.clear_code();
        }
        inner.state = AuthState::for_form(form);

        debug!(form = %form, "Form switched");
        inner.state.clone()
    }

    /// Return to a clean sign-in form.
    pub async fn back_to_sign_in(&self) -> AuthState {
        self.switch_mode(FormMode::SignIn).await
    }

    /// Sign out.
    ///
    /// A global sign-out is tried first, then a local one. If both fail the
    /// session stays signed in and the error is returned.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> AuthFlowResult<AuthState> {
        {
            let inner = self.inner.read().await;
            if !inner.state.is_authenticated() {
                debug!(state = inner.state.name(), "Sign-out ignored; not signed in");
                return Ok(inner.state.clone());
            }
        }

        if let Err(global) = self.platform.sign_out(SignOutOptions::global()).await {
            warn!(error = %global, "Global sign-out failed; signing out locally");
            if let Err(local) = self.platform.sign_out(SignOutOptions::local()).await {
                error!(error = %local, "Sign-out failed");
                return Err(AuthFlowError::network(&local, SIGN_OUT_FAILED));
            }
        }

        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        inner.busy = false;
        inner.checking_auth = false;
        inner.credentials.clear();
        inner.abort_backend();
        inner.state = AuthState::SignIn;

        info!("Signed out");
        Ok(inner.state.clone())
    }

    // ---------------------------------------------------------------------
    // Auth channel
    // ---------------------------------------------------------------------

    /// Apply one auth event.
    pub async fn handle_event(&self, event: AuthEvent) -> AuthState {
        match event {
            AuthEvent::RedirectCompleted | AuthEvent::CustomStateReceived(_) => {
                if let AuthEvent::CustomStateReceived(state) = &event {
                    debug!(custom_state = %state, "OAuth custom state returned");
                }
                let epoch = {
                    let inner = self.inner.read().await;
                    if inner.state.is_authenticated() {
                        debug!("Already signed in; redirect event ignored");
                        return inner.state.clone();
                    }
                    inner.epoch
                };
                self.resolve_session(Trigger::Redirect, epoch).await
            }
            AuthEvent::RedirectFailed(message) => {
                let mut inner = self.inner.write().await;
                if inner.state.is_authenticated() {
                    debug!("Already signed in; redirect failure ignored");
                    return inner.state.clone();
                }

                warn!(message = %message, "Federated sign-in failed");
                inner.epoch += 1;
                inner.checking_auth = false;
                inner.credentials.clear_code();
                inner.fail(FormMode::SignIn, AuthFlowError::FederatedSignInError(message));
                inner.state.clone()
            }
        }
    }

    /// Wait for and apply the next auth event.
    ///
    /// Returns `None` when unmounted or when the hub is gone.
    pub async fn process_next_event(&self) -> Option<AuthEvent> {
        let mut unmounted = self.mounted.subscribe();
        let event = {
            let mut events = self.events.lock().await;
            let bus = events.as_mut()?;
            tokio::select! {
                event = bus.next() => event?,
                _ = unmounted.wait_for(|mounted| !*mounted) => return None,
            }
        };

        self.handle_event(event.clone()).await;
        Some(event)
    }

    /// Apply every auth event already queued, without waiting.
    pub async fn process_pending_events(&self) -> usize {
        let mut processed = 0;
        loop {
            // A parked event loop holds the bus and drains it itself
            let event = match self.events.try_lock() {
                Ok(mut events) => events.as_mut().and_then(AuthEventBus::try_next),
                Err(_) => None,
            };
            let Some(event) = event else {
                return processed;
            };

            self.handle_event(event).await;
            processed += 1;
        }
    }

    /// Apply auth events until unmounted or the hub is gone.
    pub async fn run_event_loop(&self) {
        while self.process_next_event().await.is_some() {}
        debug!("Auth event loop finished");
    }

    /// Release the auth channel subscription and cancel the backend check.
    pub async fn unmount(&self) {
        self.mounted.send_replace(false);
        if let Some(bus) = self.events.lock().await.take() {
            info!(listener_id = %bus.listener_id(), "Auth event bus detached");
        }
        self.inner.write().await.abort_backend();
    }

    // ---------------------------------------------------------------------
    // Backend integration check
    // ---------------------------------------------------------------------

    /// Wait for the backend check started by the last sign-in and return its
    /// result, if the session is still current.
    pub async fn backend_settled(&self) -> Option<BackendResult> {
        let settled = self
            .inner
            .read()
            .await
            .backend_check
            .as_ref()
            .map(|check| check.settled.clone());
        if let Some(mut settled) = settled {
            if settled.wait_for(|done| *done).await.is_err() {
                debug!("Backend check was cancelled");
            }
        }

        match &self.inner.read().await.state {
            AuthState::Authenticated(session) => session.backend.clone(),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn sign_in_with_form_credentials(&self, epoch: u64) -> AuthState {
        let (email, password) = {
            let inner = self.inner.read().await;
            (
                inner.credentials.email.clone(),
                inner.credentials.password.clone(),
            )
        };

        let result = self.platform.sign_in(&email, &password).await;
        self.after_sign_in(epoch, result).await
    }

    async fn after_sign_in(&self, epoch: u64, result: PlatformResult<SignInOutcome>) -> AuthState {
        {
            let mut inner = self.inner.write().await;
            if inner.epoch != epoch {
                debug!("Discarding stale sign-in response");
                return inner.state.clone();
            }

            match result {
                Ok(outcome) if outcome.is_signed_in => {
                    inner.state = AuthState::Resolving;
                }
                Ok(SignInOutcome {
                    next_step: SignInNextStep::ConfirmSignUp,
                    ..
                }) => {
                    info!("Account not confirmed; asking for the code");
                    inner.busy = false;
                    inner.credentials.clear_code();
                    inner.state = AuthState::Confirm;
                    return inner.state.clone();
                }
                Ok(outcome) => {
                    warn!(next_step = ?outcome.next_step, "Sign-in needs a step this flow does not support");
                    inner.fail(
                        FormMode::SignIn,
                        AuthFlowError::NetworkError(SIGN_IN_FAILED.to_string()),
                    );
                    return inner.state.clone();
                }
                Err(e) => {
                    warn!(error = %e, "Sign-in rejected");
                    inner.fail(FormMode::SignIn, AuthFlowError::from_sign_in(&e));
                    return inner.state.clone();
                }
            }
        }

        self.resolve_session(Trigger::Credentials, epoch).await
    }

    /// Resolve the session and commit it if the state still wants one.
    async fn resolve_session(&self, trigger: Trigger, epoch: u64) -> AuthState {
        let outcome = self.resolver.resolve().await;

        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            debug!(trigger = trigger.as_str(), "Discarding stale resolution");
            return inner.state.clone();
        }
        if inner.state.is_authenticated() {
            debug!(trigger = trigger.as_str(), "Session already committed; resolution ignored");
            return inner.state.clone();
        }

        match outcome {
            Ok(resolution) => {
                if !inner.state.accepts_resolution() {
                    debug!(
                        trigger = trigger.as_str(),
                        state = inner.state.name(),
                        "State no longer accepts a session"
                    );
                    return inner.state.clone();
                }

                let identity = Arc::new(resolution.identity);
                // Completions still in flight for the forms are now stale
                inner.epoch += 1;
                inner.state = AuthState::Authenticated(AuthenticatedSession {
                    identity: Arc::clone(&identity),
                    backend: None,
                });
                inner.busy = false;
                inner.checking_auth = false;
                inner.credentials.clear();

                info!(
                    trigger = trigger.as_str(),
                    subject = %identity.subject_id,
                    summary = %identity.sign_in_summary(),
                    "Signed in"
                );

                match resolution.id_token {
                    Some(id_token) => self.spawn_backend_check(&mut inner, identity, id_token),
                    None => warn!("Session has no ID token; backend check skipped"),
                }
            }
            Err(error) => {
                inner.busy = false;
                inner.checking_auth = false;

                match (trigger, &error) {
                    (Trigger::Startup, AuthFlowError::SessionExpired) => {
                        debug!("No existing session");
                        if matches!(inner.state, AuthState::Resolving) {
                            inner.state = AuthState::SignIn;
                        }
                    }
                    (Trigger::Startup, _) => {
                        warn!(error = %error, "Existing session could not be read");
                        if matches!(inner.state, AuthState::Resolving) {
                            inner.fail(FormMode::SignIn, error);
                        }
                    }
                    _ => {
                        warn!(trigger = trigger.as_str(), error = %error, "Session resolution failed");
                        if inner.state.accepts_resolution() {
                            inner.fail(FormMode::SignIn, error);
                        }
                    }
                }
            }
        }

        inner.state.clone()
    }

    fn spawn_backend_check(&self, inner: &mut MachineInner, identity: Arc<Identity>, id_token: String) {
        inner.abort_backend();

        let call = self.resolver.authorize_in_background(id_token);
        let shared = Arc::clone(&self.inner);
        let (done, settled) = watch::channel(false);

        let task = tokio::spawn(async move {
            let result = match call.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Backend check task failed");
                    BackendResult::failure(None)
                }
            };

            let mut inner = shared.write().await;
            match &mut inner.state {
                AuthState::Authenticated(session) if Arc::ptr_eq(&session.identity, &identity) => {
                    debug!(ok = result.ok, status = ?result.status, "Backend result attached");
                    session.backend = Some(result);
                }
                _ => debug!("Session changed before the backend answered; result dropped"),
            }
            done.send_replace(true);
        });
        inner.backend_check = Some(BackendCheck { task, settled });
    }
}
