//! Collaborator traits.
//!
//! The store talks to the outside world only through these traits. Production
//! code plugs in [`supabase::SupabaseClient`]; tests use the in-memory mocks.

mod broadcaster;
pub mod supabase;

pub use broadcaster::SessionBroadcaster;

use crate::error::ProviderError;
use crate::state::{IdentityId, Profile, Session};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Identity provider: session retrieval, OAuth, sign-out and change events.
pub trait IdentityProvider: Send + Sync {
    /// Current session, `None` when signed out.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or rejects the token.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, ProviderError>> + Send;

    /// Register a listener for session changes.
    ///
    /// Events are delivered in the order the provider produced them until the
    /// returned handle is released or dropped.
    fn subscribe(&self) -> SessionSubscription;

    /// Start a redirect-based OAuth sign-in.
    ///
    /// Returns once the redirect is prepared; completion arrives later as a
    /// [`SessionEventKind::SignedIn`] event.
    ///
    /// # Errors
    ///
    /// Returns error if the provider refuses to start the flow.
    fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> impl Future<Output = Result<OAuthRedirect, ProviderError>> + Send;

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns error if the provider could not terminate the session.
    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

/// Profile store keyed by identity id.
pub trait ProfileRepository: Send + Sync {
    /// Look up the profile for `id`; `Ok(None)` when no row exists.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup itself fails.
    fn get_profile_by_id(
        &self,
        id: &IdentityId,
    ) -> impl Future<Output = Result<Option<Profile>, ProviderError>> + Send;
}

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    /// Google
    Google,
}

impl OAuthProvider {
    /// Provider name as the identity provider expects it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prepared OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRedirect {
    /// Provider the redirect targets
    pub provider: OAuthProvider,
    /// URL to send the browser to
    pub url: String,
}

/// Kind of session change reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// A persisted session was restored
    InitialSession,
    /// A user signed in
    SignedIn,
    /// The session ended
    SignedOut,
    /// The access token was refreshed
    TokenRefreshed,
    /// User metadata changed
    UserUpdated,
}

/// One session change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// What happened
    pub kind: SessionEventKind,
    /// Session after the change
    pub session: Option<Session>,
}

impl SessionEvent {
    /// Create an event.
    #[must_use]
    pub const fn new(kind: SessionEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

/// An active listener registration.
#[derive(Debug)]
pub struct SessionSubscription {
    /// Events in delivery order
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    /// Releases the registration
    pub handle: SubscriptionHandle,
}

/// Releases a listener registration when released or dropped.
pub struct SubscriptionHandle {
    id: u64,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Handle running `release` exactly once.
    pub fn new(id: u64, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    /// Registration id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Release the registration now.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Bound a provider call by `limit`; a timeout becomes [`ProviderError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or `Timeout` when `limit` elapses first.
pub async fn bounded<T, F>(limit: Option<Duration>, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ProviderError::Timeout)?,
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handle_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);

        let handle = SubscriptionHandle::new(7, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handle.id(), 7);
        handle.release();

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_handle_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);

        drop(SubscriptionHandle::new(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ProviderError>(())
        };

        let result = bounded(Some(Duration::from_millis(10)), slow).await;
        assert_eq!(result, Err(ProviderError::Timeout));

        let unbounded = bounded(None, async { Ok::<_, ProviderError>(5) }).await;
        assert_eq!(unbounded, Ok(5));
    }
}
