//! End-to-end behaviour of the session store against in-memory providers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatehouse_runtime::StoreError;
use gatehouse_runtime::retry::RetryPolicy;
use gatehouse_session::mocks::{MockIdentityProvider, MockProfileRepository};
use gatehouse_session::{
    AuthConfig, AuthPhase, AuthStore, ErrorKind, GuardDecision, IdentityId, OAuthProvider,
    Profile, ProviderError, RouteGuard, Session, SessionEnvironment, SessionError, SessionState,
    SessionUser,
};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

type Auth = AuthStore<MockIdentityProvider, MockProfileRepository>;

fn config() -> AuthConfig {
    AuthConfig::default()
        .with_session_retry(RetryPolicy::none())
        .with_request_timeout(Some(Duration::from_millis(500)))
        .with_shutdown_timeout(Duration::from_millis(500))
}

fn auth(identity: &MockIdentityProvider, profiles: &MockProfileRepository) -> Auth {
    AuthStore::new(SessionEnvironment::new(identity.clone(), profiles.clone(), config()))
}

fn session_for(id: IdentityId) -> Session {
    Session::new(
        SessionUser::new(id).with_display_name("Ada Lovelace"),
        format!("token-{id}"),
    )
}

async fn until(auth: &Auth, done: impl Fn(&SessionState) -> bool) -> SessionState {
    let mut snapshots = auth.watch();
    let state = tokio::time::timeout(Duration::from_secs(2), snapshots.wait_for(|s| done(s)))
        .await
        .expect("state did not settle")
        .unwrap()
        .clone();
    state
}

#[tokio::test]
async fn signed_out_visitor_resolves_to_logged_out() {
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);

    assert_eq!(auth.phase(), AuthPhase::Unresolved);
    assert_eq!(auth.guard(RouteGuard::protected()), GuardDecision::Loading);

    assert_ok!(auth.initialize().await);

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.session, None);
    assert!(!snapshot.is_session_loading);
    assert_eq!(snapshot.last_error, None);
    assert_eq!(auth.phase(), AuthPhase::LoggedOut);
    assert_eq!(
        auth.guard(RouteGuard::protected()),
        GuardDecision::Redirect { to: "/login".into() }
    );
    assert_eq!(auth.guard(RouteGuard::public_only()), GuardDecision::Render);
    assert_eq!(profiles.call_count(), 0);
}

#[tokio::test]
async fn onboarded_session_is_ready_after_initialize() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id).onboarded());
    let auth = auth(&identity, &profiles);

    assert_ok!(auth.initialize().await);

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.identity(), Some(id));
    assert_eq!(snapshot.profile.as_ref().map(|p| p.id), Some(id));
    assert!(!snapshot.is_loading());
    assert_eq!(auth.phase(), AuthPhase::Ready);
    assert_eq!(auth.guard(RouteGuard::protected()), GuardDecision::Render);
    assert_eq!(
        auth.guard(RouteGuard::public_only()),
        GuardDecision::Redirect { to: "/".into() }
    );
}

#[tokio::test]
async fn missing_profile_means_onboarding_incomplete() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);

    assert_ok!(auth.initialize().await);

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.profile, None);
    assert_eq!(snapshot.last_error, None);
    assert!(!snapshot.is_session_loading);
    assert_eq!(auth.phase(), AuthPhase::OnboardingIncomplete);
    assert_eq!(
        auth.guard(RouteGuard::protected()),
        GuardDecision::Redirect {
            to: "/new-account-registration".into()
        }
    );
    assert_eq!(auth.guard(RouteGuard::onboarding()), GuardDecision::Render);
}

#[tokio::test]
async fn incomplete_profile_is_gated_to_onboarding() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id));
    let auth = auth(&identity, &profiles);

    assert_ok!(auth.initialize().await);

    assert_eq!(
        auth.guard(RouteGuard::protected()),
        GuardDecision::Redirect {
            to: "/new-account-registration".into()
        }
    );
    assert_eq!(auth.guard(RouteGuard::onboarding()), GuardDecision::Render);
}

#[tokio::test]
async fn profile_lookup_failure_degrades_to_absent_profile() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new();
    profiles.fail_for(id, ProviderError::Network("connection reset".into()));
    let auth = auth(&identity, &profiles);

    assert_ok!(auth.initialize().await);

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.profile, None);
    assert_eq!(snapshot.last_error, Some(ErrorKind::ProfileLookupFailed));
    assert!(!snapshot.is_loading());
    assert_eq!(auth.phase(), AuthPhase::OnboardingIncomplete);
}

#[tokio::test]
async fn session_retrieval_failure_degrades_to_logged_out() {
    let identity = MockIdentityProvider::new().with_session(session_for(IdentityId::new()));
    identity.fail_current_session(ProviderError::Rejected {
        status: 503,
        message: "maintenance".into(),
    });
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);

    assert_ok!(auth.initialize().await);

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.session, None);
    assert_eq!(snapshot.last_error, Some(ErrorKind::SessionRetrievalFailed));
    assert_eq!(auth.phase(), AuthPhase::LoggedOut);
}

#[tokio::test]
async fn hanging_provider_times_out() {
    let identity = MockIdentityProvider::new().with_latency(Duration::from_secs(30));
    let profiles = MockProfileRepository::new();
    let auth = AuthStore::new(SessionEnvironment::new(
        identity.clone(),
        profiles.clone(),
        config().with_request_timeout(Some(Duration::from_millis(50))),
    ));

    assert_ok!(auth.initialize().await);

    assert_eq!(auth.snapshot().last_error, Some(ErrorKind::SessionRetrievalFailed));
    assert_eq!(auth.phase(), AuthPhase::LoggedOut);
}

#[tokio::test]
async fn initializing_twice_keeps_one_subscription() {
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);

    assert_ok!(auth.initialize().await);
    assert_ok!(auth.initialize().await);

    assert_eq!(identity.active_subscriptions(), 1);
    assert_eq!(identity.current_session_calls(), 2);
    assert_eq!(auth.phase(), AuthPhase::LoggedOut);
}

#[tokio::test]
async fn sign_in_event_loads_profile() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id).onboarded());
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);

    identity.sign_in_as(session_for(id));

    let state = until(&auth, |s| s.phase() == AuthPhase::Ready).await;
    assert_eq!(state.identity(), Some(id));
    assert_eq!(profiles.calls(), vec![id]);
}

#[tokio::test]
async fn slow_lookup_for_previous_identity_is_discarded() {
    gatehouse_testing::init_test_tracing();

    let first = IdentityId::new();
    let second = IdentityId::new();
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new()
        .with_profile(Profile::new(first).onboarded())
        .with_profile(Profile::new(second));
    profiles.delay_for(first, Duration::from_millis(150));
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);

    identity.sign_in_as(session_for(first));
    identity.sign_in_as(session_for(second));

    let state = until(&auth, |s| {
        s.identity() == Some(second) && !s.is_profile_loading
    })
    .await;
    assert_eq!(state.profile.as_ref().map(|p| p.id), Some(second));

    // Let the first lookup land.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.identity(), Some(second));
    assert_eq!(snapshot.profile.as_ref().map(|p| p.id), Some(second));
    assert_eq!(auth.phase(), AuthPhase::OnboardingIncomplete);
    assert_eq!(profiles.calls(), vec![first, second]);
}

#[tokio::test]
async fn changes_during_initialization_are_applied_afterwards() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_latency(Duration::from_millis(100));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id).onboarded());
    let auth = auth(&identity, &profiles);

    let (initialized, ()) = tokio::join!(auth.initialize(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        identity.sign_in_as(session_for(id));
    });
    assert_ok!(initialized);

    let state = until(&auth, |s| s.phase() == AuthPhase::Ready).await;
    assert_eq!(state.identity(), Some(id));
}

#[tokio::test]
async fn session_retrieved_before_sign_out_does_not_come_back() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new()
        .with_session(session_for(id))
        .with_session_reply_delay(Duration::from_millis(150));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id).onboarded());
    let auth = auth(&identity, &profiles);

    let (initialized, signed_out) = tokio::join!(auth.initialize(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        auth.sign_out().await
    });
    assert_ok!(initialized);
    assert_ok!(signed_out);

    // Let the retrieval that started before sign-out answer.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = auth.snapshot();
    assert_eq!(identity.session(), None);
    assert_eq!(snapshot.session, None);
    assert_eq!(snapshot.profile, None);
    assert_eq!(auth.phase(), AuthPhase::LoggedOut);
    assert_eq!(auth.guard(RouteGuard::public_only()), GuardDecision::Render);
    assert_eq!(profiles.call_count(), 0);
}

#[tokio::test]
async fn sign_out_clears_state_immediately() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id).onboarded());
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);
    assert_eq!(auth.phase(), AuthPhase::Ready);

    assert_ok!(auth.sign_out().await);

    let snapshot = auth.snapshot();
    assert_eq!(snapshot.session, None);
    assert_eq!(snapshot.profile, None);
    assert_eq!(auth.phase(), AuthPhase::LoggedOut);
    assert_eq!(
        auth.guard(RouteGuard::protected()),
        GuardDecision::Redirect { to: "/login".into() }
    );
}

#[tokio::test]
async fn failed_sign_out_leaves_state_untouched() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id).onboarded());
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);
    let before = auth.snapshot();

    identity.fail_sign_out(ProviderError::Network("offline".into()));
    let error = assert_err!(auth.sign_out().await);

    assert_eq!(error.kind(), Some(ErrorKind::SignOutFailed));
    assert_eq!(auth.snapshot(), before);
    assert_eq!(auth.phase(), AuthPhase::Ready);
}

#[tokio::test]
async fn failed_sign_in_is_reported_to_caller() {
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);
    let before = auth.snapshot();

    identity.fail_sign_in(ProviderError::Rejected {
        status: 400,
        message: "Unsupported provider: provider is not enabled".into(),
    });
    let error = assert_err!(auth.sign_in_with_google().await);

    assert!(matches!(error, SessionError::SignInInitiationFailed(_)));
    assert!(error.to_string().starts_with("Sign in failed:"));
    assert!(error.to_string().contains("provider is not enabled"));
    assert_eq!(auth.snapshot(), before);
}

#[tokio::test]
async fn sign_in_targets_configured_redirect() {
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);

    let redirect = assert_ok!(auth.sign_in_with_google().await);

    assert_eq!(redirect.provider, OAuthProvider::Google);
    assert_eq!(
        identity.oauth_requests(),
        vec![(OAuthProvider::Google, "http://localhost:5173".to_string())]
    );
    assert_eq!(auth.phase(), AuthPhase::Unresolved);
}

#[tokio::test]
async fn refresh_profile_picks_up_completed_onboarding() {
    let id = IdentityId::new();
    let identity = MockIdentityProvider::new().with_session(session_for(id));
    let profiles = MockProfileRepository::new().with_profile(Profile::new(id));
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);
    assert_eq!(auth.phase(), AuthPhase::OnboardingIncomplete);

    profiles.insert(Profile::new(id).onboarded().with_full_name("Ada Lovelace"));
    assert_ok!(auth.refresh_profile().await);

    assert_eq!(auth.phase(), AuthPhase::Ready);
    assert_eq!(profiles.call_count(), 2);
}

#[tokio::test]
async fn shutdown_releases_subscription_and_rejects_actions() {
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();
    let auth = auth(&identity, &profiles);
    assert_ok!(auth.initialize().await);
    assert_eq!(identity.active_subscriptions(), 1);

    assert_ok!(auth.shutdown().await);

    assert_eq!(identity.active_subscriptions(), 0);
    assert_eq!(
        auth.refresh_profile().await,
        Err(SessionError::Store(StoreError::ShutdownInProgress))
    );
}

#[tokio::test]
async fn dropping_store_releases_subscription() {
    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();

    {
        let auth = auth(&identity, &profiles);
        assert_ok!(auth.initialize().await);
        assert_eq!(identity.active_subscriptions(), 1);
    }

    assert_eq!(identity.active_subscriptions(), 0);
}
