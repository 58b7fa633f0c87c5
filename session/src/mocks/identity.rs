//! Mock identity provider for testing.

use crate::error::ProviderError;
use crate::providers::{
    IdentityProvider, OAuthProvider, OAuthRedirect, SessionBroadcaster, SessionEvent,
    SessionEventKind, SessionSubscription,
};
use crate::state::Session;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct ProviderState {
    session: Option<Session>,
    current_session_failure: Option<ProviderError>,
    current_session_failures_left: Option<usize>,
    sign_in_failure: Option<ProviderError>,
    sign_out_failure: Option<ProviderError>,
    latency: Option<Duration>,
    reply_delay: Option<Duration>,
    current_session_calls: usize,
    oauth_requests: Vec<(OAuthProvider, String)>,
}

/// Mock identity provider.
///
/// Holds the session in memory. Events are only delivered when a test calls
/// [`sign_in_as`](Self::sign_in_as), [`emit`](Self::emit) or `sign_out`.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    state: Arc<Mutex<ProviderState>>,
    broadcaster: SessionBroadcaster,
}

impl MockIdentityProvider {
    /// Signed-out provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start with `session` already established.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        self.lock().session = Some(session);
        self
    }

    /// Delay every provider call by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Answer `current_session` with the session as it was when the call
    /// arrived, `delay` later.
    #[must_use]
    pub fn with_session_reply_delay(self, delay: Duration) -> Self {
        self.lock().reply_delay = Some(delay);
        self
    }

    /// Replace the stored session without notifying listeners.
    pub fn set_session(&self, session: Option<Session>) {
        self.lock().session = session;
    }

    /// Establish `session` and notify listeners with `SignedIn`.
    pub fn sign_in_as(&self, session: Session) {
        self.lock().session = Some(session.clone());
        self.emit(SessionEventKind::SignedIn, Some(session));
    }

    /// Deliver an arbitrary event without touching the stored session.
    pub fn emit(&self, kind: SessionEventKind, session: Option<Session>) -> usize {
        self.broadcaster.notify(&SessionEvent::new(kind, session))
    }

    /// Fail every `current_session` call with `error`.
    pub fn fail_current_session(&self, error: ProviderError) {
        let mut state = self.lock();
        state.current_session_failure = Some(error);
        state.current_session_failures_left = None;
    }

    /// Fail the next `times` `current_session` calls with `error`.
    pub fn fail_current_session_times(&self, times: usize, error: ProviderError) {
        let mut state = self.lock();
        state.current_session_failure = Some(error);
        state.current_session_failures_left = Some(times);
    }

    /// Fail every OAuth sign-in with `error`.
    pub fn fail_sign_in(&self, error: ProviderError) {
        self.lock().sign_in_failure = Some(error);
    }

    /// Fail every sign-out with `error`.
    pub fn fail_sign_out(&self, error: ProviderError) {
        self.lock().sign_out_failure = Some(error);
    }

    /// Clear all failure switches.
    pub fn recover(&self) {
        let mut state = self.lock();
        state.current_session_failure = None;
        state.current_session_failures_left = None;
        state.sign_in_failure = None;
        state.sign_out_failure = None;
    }

    /// Currently registered listeners.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.broadcaster.active_count()
    }

    /// Number of `current_session` calls so far.
    #[must_use]
    pub fn current_session_calls(&self) -> usize {
        self.lock().current_session_calls
    }

    /// OAuth sign-ins requested so far, with their redirect targets.
    #[must_use]
    pub fn oauth_requests(&self) -> Vec<(OAuthProvider, String)> {
        self.lock().oauth_requests.clone()
    }

    /// The stored session.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    fn latency(&self) -> Option<Duration> {
        self.lock().latency
    }
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

fn read_session(state: &mut ProviderState) -> Result<Option<Session>, ProviderError> {
    if let Some(error) = state.current_session_failure.clone() {
        match state.current_session_failures_left {
            None => return Err(error),
            Some(0) => state.current_session_failure = None,
            Some(left) => {
                state.current_session_failures_left = Some(left - 1);
                return Err(error);
            },
        }
    }

    Ok(state.session.clone())
}

impl IdentityProvider for MockIdentityProvider {
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, ProviderError>> + Send {
        let provider = self.clone();

        async move {
            simulate_latency(provider.latency()).await;

            let (reply, delay) = {
                let mut state = provider.lock();
                state.current_session_calls += 1;
                (read_session(&mut state), state.reply_delay)
            };

            simulate_latency(delay).await;
            reply
        }
    }

    fn subscribe(&self) -> SessionSubscription {
        self.broadcaster.subscribe()
    }

    fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> impl Future<Output = Result<OAuthRedirect, ProviderError>> + Send {
        let mock = self.clone();
        let redirect_to = redirect_to.to_string();

        async move {
            simulate_latency(mock.latency()).await;

            let mut state = mock.lock();
            if let Some(error) = state.sign_in_failure.clone() {
                return Err(error);
            }
            state.oauth_requests.push((provider, redirect_to.clone()));

            Ok(OAuthRedirect {
                provider,
                url: format!("https://auth.mock/authorize?provider={provider}&redirect_to={redirect_to}"),
            })
        }
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send {
        let provider = self.clone();

        async move {
            simulate_latency(provider.latency()).await;

            {
                let mut state = provider.lock();
                if let Some(error) = state.sign_out_failure.clone() {
                    return Err(error);
                }
                state.session = None;
            }

            provider.emit(SessionEventKind::SignedOut, None);
            Ok(())
        }
    }
}
