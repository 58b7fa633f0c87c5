//! Session store facade.
//!
//! [`AuthStore`] is the process-wide owner of authentication state. It runs
//! [`SessionReducer`] on a [`gatehouse_runtime::Store`], forwards provider
//! session changes into it, and hands snapshots to route guards.

use crate::actions::SessionAction;
use crate::config::AuthConfig;
use crate::environment::SessionEnvironment;
use crate::error::{Result, SessionError};
use crate::guard::{GuardDecision, RouteGuard};
use crate::providers::{
    IdentityProvider, OAuthProvider, OAuthRedirect, ProfileRepository, SessionSubscription,
    SubscriptionHandle, bounded,
};
use crate::reducers::SessionReducer;
use crate::state::{AuthPhase, SessionState};
use gatehouse_runtime::Store;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

type SessionStore<P, R> =
    Store<SessionState, SessionAction, SessionEnvironment<P, R>, SessionReducer<P, R>>;

/// The registration with the identity provider and the task feeding its
/// events into the store.
struct ActiveSubscription {
    handle: SubscriptionHandle,
    forwarder: JoinHandle<()>,
}

impl ActiveSubscription {
    fn stop(self) {
        self.forwarder.abort();
        self.handle.release();
    }
}

/// Session/profile store.
///
/// # Example
///
/// ```rust,ignore
/// let auth = AuthStore::new(SessionEnvironment::new(identity, profiles, AuthConfig::default()));
/// auth.initialize().await?;
///
/// if auth.guard(RouteGuard::protected()) == GuardDecision::Render {
///     render_dashboard(&auth.snapshot());
/// }
/// ```
pub struct AuthStore<P, R>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    store: SessionStore<P, R>,
    subscription: Mutex<Option<ActiveSubscription>>,
}

impl<P, R> AuthStore<P, R>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    /// Create a store in the unresolved state.
    ///
    /// Nothing talks to the provider until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(environment: SessionEnvironment<P, R>) -> Self {
        Self {
            store: Store::new(SessionState::default(), SessionReducer::new(), environment),
            subscription: Mutex::new(None),
        }
    }

    /// Resolve the current session and start following provider changes.
    ///
    /// Returns once the session (and, if signed in, its profile) has been
    /// resolved. Retrieval failures degrade to the logged-out state and are
    /// recorded in [`SessionState::last_error`]; they are not returned.
    ///
    /// Calling this again replaces the previous subscription, so at most one
    /// is ever active. Changes the provider reports while the session is
    /// being resolved are buffered and applied afterwards, in order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store is shutting down.
    #[tracing::instrument(skip(self), name = "auth_initialize")]
    pub async fn initialize(&self) -> Result<()> {
        let mut active = self.subscription.lock().await;
        if let Some(previous) = active.take() {
            tracing::debug!("Replacing existing provider subscription");
            previous.stop();
        }

        let SessionSubscription { mut events, handle } = self.environment().identity.subscribe();

        self.store.send(SessionAction::Initialize).await?;
        self.settle(|state| !state.is_session_loading).await;

        let store = self.store.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracing::debug!(kind = ?event.kind, "Provider reported session change");

                let action = SessionAction::SessionChanged {
                    kind: event.kind,
                    session: event.session,
                };
                if let Err(error) = store.send(action).await {
                    tracing::debug!(%error, "Stopped forwarding session changes");
                    break;
                }
            }
        });

        *active = Some(ActiveSubscription { handle, forwarder });

        let snapshot = self.snapshot();
        tracing::info!(
            phase = ?snapshot.phase(),
            last_error = ?snapshot.last_error,
            "Session initialized"
        );
        Ok(())
    }

    /// Re-fetch the profile of the current identity.
    ///
    /// Returns once the lookup has settled. A no-op without a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store is shutting down.
    #[tracing::instrument(skip(self), name = "auth_refresh_profile")]
    pub async fn refresh_profile(&self) -> Result<()> {
        self.store.send(SessionAction::RefreshProfile).await?;
        self.settle(|state| !state.is_profile_loading).await;
        Ok(())
    }

    /// Start the Google OAuth flow.
    ///
    /// The returned redirect is where the browser goes next. The resulting
    /// session arrives later as a provider change; the snapshot is untouched
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SignInInitiationFailed`] if the provider
    /// refuses or does not answer in time.
    #[tracing::instrument(skip(self), name = "auth_sign_in")]
    pub async fn sign_in_with_google(&self) -> Result<OAuthRedirect> {
        let env = self.environment();

        bounded(
            env.config.request_timeout,
            env.identity
                .sign_in_with_oauth(OAuthProvider::Google, &env.config.redirect_to),
        )
        .await
        .map_err(|error| {
            tracing::warn!(%error, "Could not start OAuth sign-in");
            SessionError::SignInInitiationFailed(error)
        })
    }

    /// End the session.
    ///
    /// On success the session and profile are cleared immediately, without
    /// waiting for the provider's change notification. On failure the
    /// snapshot is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SignOutFailed`] if the provider refuses or does
    /// not answer in time, or [`SessionError::Store`] if the store is shutting
    /// down.
    #[tracing::instrument(skip(self), name = "auth_sign_out")]
    pub async fn sign_out(&self) -> Result<()> {
        let env = self.environment();

        bounded(env.config.request_timeout, env.identity.sign_out())
            .await
            .map_err(|error| {
                tracing::warn!(%error, "Sign-out failed");
                SessionError::SignOutFailed(error)
            })?;

        self.store.send(SessionAction::SignedOut).await?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.store.snapshot()
    }

    /// Phase derived from the current snapshot.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.store.snapshot().phase()
    }

    /// Receiver notified after every state transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.store.watch()
    }

    /// Evaluate `guard` against the current snapshot.
    #[must_use]
    pub fn guard(&self, guard: RouteGuard) -> GuardDecision {
        guard.evaluate(&self.store.snapshot(), &self.config().routes)
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.environment().config
    }

    /// Injected collaborators.
    #[must_use]
    pub fn environment(&self) -> &SessionEnvironment<P, R> {
        self.store.environment()
    }

    /// Release the provider subscription and wait for in-flight lookups.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if lookups are still running after
    /// [`AuthConfig::shutdown_timeout`].
    #[tracing::instrument(skip(self), name = "auth_shutdown")]
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(active) = self.subscription.lock().await.take() {
            active.stop();
        }

        self.store.shutdown(self.config().shutdown_timeout).await?;
        tracing::info!("Session store shut down");
        Ok(())
    }

    async fn settle(&self, done: impl Fn(&SessionState) -> bool) {
        let mut snapshots = self.store.watch();
        if snapshots.wait_for(|state| done(state)).await.is_err() {
            tracing::warn!("Snapshot channel closed before state settled");
        }
    }
}

impl<P, R> Drop for AuthStore<P, R>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    fn drop(&mut self) {
        if let Some(active) = self.subscription.get_mut().take() {
            active.stop();
        }
    }
}

impl<P, R> std::fmt::Debug for AuthStore<P, R>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("snapshot", &self.store.snapshot())
            .finish_non_exhaustive()
    }
}
