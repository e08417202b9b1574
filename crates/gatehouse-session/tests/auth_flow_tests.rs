//! End-to-End tests for the sign-in flow.
//!
//! These tests drive the state machine against the in-memory identity
//! platform and a wiremock backend, and check the resulting states together
//! with the HTTP calls the backend receives.
//!
//! Flows:
//! 1. Credential sign-in → backend check with the session's ID token
//! 2. Backend failure → signed in anyway, integration degraded
//! 3. Startup check racing a redirect event → one identity, one backend call
//! 4. Sign-up → confirm → signed in with the same credentials
//! 5. Local validation → no network traffic
//! 6. Redirect failure, stale responses, redirect racing a sign-in, unmount

use gatehouse_events::{HubChannel, HubEvent, MemoryHub};
use gatehouse_identity::{ClaimSet, FederatedProvider, UNMAPPED_EMAIL};
use gatehouse_session::memory::DEFAULT_CONFIRMATION_CODE;
use gatehouse_session::{
    AuthFlowError, AuthState, AuthStateMachine, BackendAuthClient, BackendEndpoint, ClientConfig,
    CurrentUser, FormMode, IdToken, IntegrationStatus, MemoryPlatform,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test fixture providing a mock backend and an in-memory platform.
struct TestFixture {
    /// Mock backend server.
    backend_server: MockServer,
    /// Lifecycle channel shared by platform and machine.
    hub: MemoryHub,
    /// Identity platform.
    platform: MemoryPlatform,
    /// Client configuration pointing at the mock backend.
    config: ClientConfig,
}

impl TestFixture {
    /// Create a new test fixture.
    async fn new() -> Self {
        let backend_server = MockServer::start().await;
        let hub = MemoryHub::new();
        let platform = MemoryPlatform::with_hub(hub.clone());

        let mut config = ClientConfig::default();
        config.backend = BackendEndpoint::new(backend_server.uri());
        config.backend_timeout_secs = 5;

        Self {
            backend_server,
            hub,
            platform,
            config,
        }
    }

    /// Get a backend client configured for the mock server.
    fn backend_client(&self) -> BackendAuthClient {
        BackendAuthClient::from_config(&self.config).unwrap()
    }

    /// Mount a state machine on the fixture's hub.
    fn machine(&self) -> AuthStateMachine {
        AuthStateMachine::mount(
            Arc::new(self.platform.clone()),
            Arc::new(self.backend_client()),
            &self.hub,
        )
        .unwrap()
    }

    /// Expect exactly `times` profile calls carrying `token`.
    async fn expect_profile_call(&self, token: &str, times: u64, status: u16) {
        let bearer = format!("Bearer {}", token);
        let response = if status < 300 {
            ResponseTemplate::new(status).set_body_json(json!({
                "user_id": "from-backend",
                "role": "user"
            }))
        } else {
            ResponseTemplate::new(status).set_body_string("internal error")
        };

        Mock::given(method("GET"))
            .and(path("/api/profile"))
            .and(header("Authorization", bearer.as_str()))
            .respond_with(response)
            .expect(times)
            .mount(&self.backend_server)
            .await;
    }

    /// Expect no backend traffic at all.
    async fn expect_no_backend_calls(&self) {
        Mock::given(method("GET"))
            .and(path("/api/profile"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&self.backend_server)
            .await;
    }
}

/// Sign an ID token the way the platform would.
fn signed_id_token(claims: serde_json::Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"pool-signing-secret"),
    )
    .unwrap()
}

async fn enter_sign_up(machine: &AuthStateMachine, password: &str, confirm: &str) {
    machine.switch_mode(FormMode::SignUp).await;
    machine.set_email("new@example.com").await;
    machine.set_name("New User").await;
    machine.set_password(password).await;
    machine.set_confirm_password(confirm).await;
}

// =============================================================================
// Test 1: credential sign-in
// =============================================================================

/// Valid credentials reach `Authenticated` and the backend sees exactly one
/// request carrying the session's ID token.
#[tokio::test]
async fn test_sign_in_calls_backend_once_with_id_token() {
    let fixture = TestFixture::new().await;
    let user_id = fixture
        .platform
        .register("jane@example.com", "correct-horse", Some("Jane Doe"));

    let token = signed_id_token(json!({
        "sub": user_id,
        "email": "jane@example.com",
        "email_verified": "true",
        "name": "Jane Doe",
        "cognito:username": "jane@example.com"
    }));
    assert!(fixture.platform.issue_token("jane@example.com", token.as_str()));
    fixture.expect_profile_call(&token, 1, 200).await;

    let machine = fixture.machine();
    assert_eq!(machine.check_existing_session().await, AuthState::SignIn);

    machine.set_email("jane@example.com").await;
    machine.set_password("correct-horse").await;
    let state = machine.submit_sign_in().await;

    let identity = state.identity().unwrap();
    assert_eq!(identity.subject_id.as_str(), user_id);
    assert_eq!(identity.email.as_deref(), Some("jane@example.com"));
    assert!(identity.email_verified);
    assert!(!identity.is_federated());
    assert_eq!(identity.sign_in_summary(), "Logged in with AWS Cognito");

    let backend = machine.backend_settled().await.unwrap();
    assert!(backend.ok);
    assert_eq!(backend.status, Some(200));
    assert_eq!(backend.payload.unwrap()["role"], "user");

    match machine.state().await {
        AuthState::Authenticated(session) => {
            assert_eq!(session.integration_status(), IntegrationStatus::Connected);
        }
        other => panic!("expected authenticated state, got {:?}", other),
    }
}

// =============================================================================
// Test 2: backend failure never reverts sign-in
// =============================================================================

#[tokio::test]
async fn test_backend_failure_keeps_session() {
    let fixture = TestFixture::new().await;
    fixture.platform.establish_session(
        CurrentUser {
            user_id: "user-500".to_string(),
            username: "user-500".to_string(),
        },
        IdToken::new("existing-session-token")
            .with_payload(ClaimSet::new().with("sub", "user-500").with("email", "x@example.com")),
        ClaimSet::new(),
    );
    fixture.expect_profile_call("existing-session-token", 1, 500).await;

    let machine = fixture.machine();
    assert!(machine.check_existing_session().await.is_authenticated());

    let backend = machine.backend_settled().await.unwrap();
    assert!(!backend.ok);
    assert_eq!(backend.status, Some(500));
    assert!(backend.payload.is_none());

    match machine.state().await {
        AuthState::Authenticated(session) => {
            assert_eq!(session.identity.subject_id.as_str(), "user-500");
            assert_eq!(session.integration_status(), IntegrationStatus::Degraded);
        }
        other => panic!("expected authenticated state, got {:?}", other),
    }
}

// =============================================================================
// Test 3: startup check racing a redirect event
// =============================================================================

/// Both triggers resolve the same session; the second is a no-op and the
/// backend is called once.
#[tokio::test]
async fn test_startup_and_redirect_race_is_idempotent() {
    let fixture = TestFixture::new().await;
    let machine = fixture.machine();
    fixture.platform.set_latency(Duration::from_millis(20));

    fixture.platform.complete_redirect(
        "google_1234",
        ClaimSet::new()
            .with("sub", "google_1234")
            .with("identities", r#"[{"providerName":"Google","userId":"1234"}]"#),
        None,
    );
    let token = fixture.platform.current_id_token().unwrap();
    fixture.expect_profile_call(&token, 1, 200).await;

    let (startup, event) = tokio::join!(
        machine.check_existing_session(),
        machine.process_next_event()
    );
    assert!(event.is_some());
    assert!(startup.is_authenticated());

    let identity = machine.identity().await.unwrap();
    assert_eq!(identity.subject_id.as_str(), "google_1234");
    assert_eq!(identity.provider_name.as_deref(), Some("Google"));
    assert_eq!(identity.email.as_deref(), Some(UNMAPPED_EMAIL));
    assert!(identity.email_verified);
    assert_eq!(identity.sign_in_summary(), "Logged in via Google OAuth");

    assert!(machine.backend_settled().await.unwrap().ok);
    assert!(!machine.is_checking_auth().await);
}

// =============================================================================
// Test 4: sign-up → confirm → signed in
// =============================================================================

#[tokio::test]
async fn test_sign_up_confirm_signs_in_with_same_credentials() {
    let fixture = TestFixture::new().await;
    let machine = fixture.machine();
    machine.check_existing_session().await;

    enter_sign_up(&machine, "longenough1", "longenough1").await;
    assert_eq!(machine.submit_sign_up().await, AuthState::Confirm);
    assert_eq!(machine.credentials().await.email, "new@example.com");

    // The token only exists once the account does
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&fixture.backend_server)
        .await;

    machine.set_confirmation_code(DEFAULT_CONFIRMATION_CODE).await;
    let state = machine.submit_confirmation().await;

    let identity = state.identity().unwrap();
    assert_eq!(identity.email.as_deref(), Some("new@example.com"));
    assert_eq!(identity.display_name.as_deref(), Some("New User"));

    let calls = fixture.platform.calls();
    assert_eq!(calls.sign_ups, vec!["new@example.com".to_string()]);
    assert_eq!(
        calls.confirmations,
        vec![("new@example.com".to_string(), DEFAULT_CONFIRMATION_CODE.to_string())]
    );
    assert_eq!(
        calls.sign_ins,
        vec![("new@example.com".to_string(), "longenough1".to_string())]
    );

    assert!(machine.backend_settled().await.unwrap().ok);
    assert_eq!(machine.credentials().await.password, "");
}

// =============================================================================
// Test 5: local validation
// =============================================================================

#[tokio::test]
async fn test_sign_up_validation_makes_no_network_call() {
    let fixture = TestFixture::new().await;
    fixture.expect_no_backend_calls().await;
    let machine = fixture.machine();
    machine.check_existing_session().await;

    enter_sign_up(&machine, "short", "short").await;
    assert_eq!(
        machine.submit_sign_up().await,
        AuthState::Failed {
            form: FormMode::SignUp,
            error: AuthFlowError::PasswordTooShort,
        }
    );

    machine.set_password("longenough1").await;
    machine.set_confirm_password("longenough2").await;
    assert_eq!(
        machine.submit_sign_up().await,
        AuthState::Failed {
            form: FormMode::SignUp,
            error: AuthFlowError::PasswordMismatch,
        }
    );

    assert_eq!(fixture.platform.calls().form_calls(), 0);
    assert!(!machine.is_busy().await);
}

// =============================================================================
// Test 6: redirect failure
// =============================================================================

#[tokio::test]
async fn test_redirect_failure_surfaces_on_sign_in_form() {
    let fixture = TestFixture::new().await;
    fixture.expect_no_backend_calls().await;
    let machine = fixture.machine();
    machine.check_existing_session().await;

    let state = machine
        .sign_in_with_provider(FederatedProvider::Google, None)
        .await;
    assert_eq!(state, AuthState::Resolving);
    assert!(machine.is_checking_auth().await);
    assert_eq!(fixture.platform.calls().redirects, vec!["Google".to_string()]);

    fixture
        .platform
        .fail_redirect("ACCOUNT_LINKED: please sign in with Google again");
    let event = tokio::time::timeout(Duration::from_secs(1), machine.process_next_event())
        .await
        .unwrap();
    assert!(event.is_some());

    assert_eq!(
        machine.state().await,
        AuthState::Failed {
            form: FormMode::SignIn,
            error: AuthFlowError::FederatedSignInError(
                "ACCOUNT_LINKED: please sign in with Google again".to_string()
            ),
        }
    );
    assert!(!machine.is_checking_auth().await);
}

// =============================================================================
// Test 7: stale responses
// =============================================================================

/// A sign-in that completes after the user switched forms is dropped.
#[tokio::test]
async fn test_stale_sign_in_after_mode_switch_is_discarded() {
    let fixture = TestFixture::new().await;
    fixture.expect_no_backend_calls().await;
    fixture
        .platform
        .register("jane@example.com", "correct-horse", None);

    let machine = fixture.machine();
    machine.check_existing_session().await;
    machine.set_email("jane@example.com").await;
    machine.set_password("correct-horse").await;
    fixture.platform.set_latency(Duration::from_millis(150));

    let (submitted, switched) = tokio::join!(machine.submit_sign_in(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        machine.switch_mode(FormMode::SignUp).await
    });

    assert_eq!(switched, AuthState::SignUp);
    assert_eq!(submitted, AuthState::SignUp);
    assert_eq!(machine.state().await, AuthState::SignUp);
    assert!(machine.identity().await.is_none());
    assert!(!machine.is_busy().await);
}

/// A backend answer that arrives after sign-out is not attached anywhere.
#[tokio::test]
async fn test_backend_result_after_sign_out_is_dropped() {
    let fixture = TestFixture::new().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&fixture.backend_server)
        .await;

    fixture
        .platform
        .register("jane@example.com", "correct-horse", None);
    let machine = fixture.machine();
    machine.check_existing_session().await;
    machine.set_email("jane@example.com").await;
    machine.set_password("correct-horse").await;
    assert!(machine.submit_sign_in().await.is_authenticated());

    assert_eq!(machine.sign_out().await, Ok(AuthState::SignIn));
    assert_eq!(machine.backend_settled().await, None);
    assert_eq!(machine.credentials().await.email, "");
    assert!(!fixture.platform.is_signed_in());
}

/// A second submission while the first is in flight is ignored.
#[tokio::test]
async fn test_double_submission_signs_in_once() {
    let fixture = TestFixture::new().await;
    fixture
        .platform
        .register("jane@example.com", "correct-horse", None);
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&fixture.backend_server)
        .await;

    let machine = fixture.machine();
    machine.check_existing_session().await;
    machine.set_email("jane@example.com").await;
    machine.set_password("correct-horse").await;
    fixture.platform.set_latency(Duration::from_millis(50));

    let (first, second) = tokio::join!(machine.submit_sign_in(), machine.submit_sign_in());
    assert!(first.is_authenticated());
    assert_eq!(second, AuthState::SignIn);
    assert_eq!(fixture.platform.calls().sign_ins.len(), 1);

    machine.backend_settled().await;
}

/// A redirect session committed while a credential sign-in is in flight
/// stays; the late sign-in response neither replaces it nor calls the
/// backend again.
#[tokio::test]
async fn test_redirect_commit_during_sign_in_wins() {
    let fixture = TestFixture::new().await;
    fixture
        .platform
        .register("jane@example.com", "correct-horse", None);

    let machine = fixture.machine();
    machine.check_existing_session().await;
    machine.set_email("jane@example.com").await;
    machine.set_password("correct-horse").await;
    fixture.platform.hold_sign_ins();

    let (submitted, committed) = tokio::join!(machine.submit_sign_in(), async {
        while !machine.is_busy().await {
            tokio::task::yield_now().await;
        }
        fixture.platform.complete_redirect(
            "google_1234",
            ClaimSet::new()
                .with("sub", "google_1234")
                .with("identities", r#"[{"providerName":"Google"}]"#),
            None,
        );
        let token = fixture.platform.current_id_token().unwrap();
        fixture.expect_profile_call(&token, 1, 200).await;
        fixture.expect_no_backend_calls().await;

        assert!(machine.process_next_event().await.is_some());
        fixture.platform.release_sign_ins();
        machine.state().await
    });

    let redirect_identity = committed.identity().unwrap().clone();
    assert_eq!(redirect_identity.subject_id.as_str(), "google_1234");
    assert!(Arc::ptr_eq(submitted.identity().unwrap(), &redirect_identity));
    assert_eq!(fixture.platform.calls().sign_ins.len(), 1);

    assert!(machine.backend_settled().await.unwrap().ok);
    let identity = machine.identity().await.unwrap();
    assert!(Arc::ptr_eq(&identity, &redirect_identity));
    assert_eq!(identity.provider_name.as_deref(), Some("Google"));
}

// =============================================================================
// Test 8: unmount
// =============================================================================

#[tokio::test]
async fn test_unmount_while_event_loop_runs() {
    let fixture = TestFixture::new().await;
    let machine = Arc::new(fixture.machine());
    let event_loop = tokio::spawn({
        let machine = Arc::clone(&machine);
        async move { machine.run_event_loop().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fixture.hub.stats().active_listeners, 1);

    tokio::time::timeout(Duration::from_secs(1), machine.unmount())
        .await
        .unwrap();
    assert_eq!(fixture.hub.stats().active_listeners, 0);
    assert!(!machine.is_mounted().await);

    // The loop ends instead of waiting for another event
    tokio::time::timeout(Duration::from_secs(1), event_loop)
        .await
        .unwrap()
        .unwrap();

    let delivered = fixture
        .hub
        .dispatch(HubEvent::auth("signInWithRedirect", serde_json::Value::Null))
        .unwrap();
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_unmount_releases_hub_listener() {
    let fixture = TestFixture::new().await;
    let machine = fixture.machine();
    assert_eq!(fixture.hub.stats().active_listeners, 1);

    machine.unmount().await;
    assert_eq!(fixture.hub.stats().active_listeners, 0);

    let delivered = fixture
        .hub
        .dispatch(HubEvent::auth("signInWithRedirect", serde_json::Value::Null))
        .unwrap();
    assert_eq!(delivered, 0);

    // Remounting subscribes exactly once again
    let remounted = fixture.machine();
    assert_eq!(fixture.hub.stats().active_listeners, 1);
    drop(remounted);
    assert_eq!(fixture.hub.stats().active_listeners, 0);
}
