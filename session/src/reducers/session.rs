//! Session lifecycle reducer.
//!
//! # Flow
//!
//! ```text
//! 1. Initialize → is_session_loading = true → current_session effect (retried, bounded)
//! 2. SessionResolved(Some) → profile lookup → ProfileLoaded clears both loading flags
//!    SessionResolved(None) → logged out, loading finished
//! 3. SessionChanged → same as 2, once per provider event, in delivery order
//! 4. SignedOut → logged out immediately
//! ```
//!
//! Every transition advances the generation, which invalidates any profile
//! lookup still in flight. A retrieval result is applied only while its
//! `Initialize` is the outstanding one; `SessionChanged` and `SignedOut`
//! supersede it.

use super::profile;
use crate::actions::SessionAction;
use crate::environment::SessionEnvironment;
use crate::error::{ErrorKind, ProviderError};
use crate::providers::{IdentityProvider, ProfileRepository, SessionEventKind, bounded};
use crate::state::{Session, SessionState};
use gatehouse_core::{SmallVec, async_effect, effect::Effect, smallvec};
use gatehouse_runtime::retry::retry_with_predicate;

/// Begin initial session resolution.
pub fn initialize<P, R>(
    state: &mut SessionState,
    env: &SessionEnvironment<P, R>,
) -> SmallVec<[Effect<SessionAction>; 4]>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    let generation = state.advance_generation();
    state.begin_resolution(generation);
    state.is_session_loading = true;
    state.last_error = None;

    tracing::info!(generation, "Resolving current session");

    let identity = env.identity.clone();
    let policy = env.config.session_retry.clone();
    let timeout = env.config.request_timeout;

    smallvec![async_effect! {
        let result = retry_with_predicate(
            policy,
            || bounded(timeout, identity.current_session()),
            ProviderError::is_transient,
        )
        .await;

        Some(match result {
            Ok(session) => SessionAction::SessionResolved { generation, session },
            Err(err) => {
                tracing::warn!(error = %err, "Session retrieval failed");
                SessionAction::SessionRetrievalFailed {
                    generation,
                    message: err.to_string(),
                }
            },
        })
    }]
}

/// Apply the result of initial session retrieval, or drop it if it is stale.
pub fn session_resolved<P, R>(
    state: &mut SessionState,
    generation: u64,
    session: Option<Session>,
    env: &SessionEnvironment<P, R>,
) -> SmallVec<[Effect<SessionAction>; 4]>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    if !state.settle_resolution(generation) {
        tracing::debug!(generation, "Discarding superseded session retrieval");
        return smallvec![Effect::None];
    }

    tracing::debug!(signed_in = session.is_some(), "Session resolved");
    apply_session(state, session, env)
}

/// Apply a provider session change.
///
/// Every event kind re-resolves; the kind is only logged.
pub fn session_changed<P, R>(
    state: &mut SessionState,
    kind: SessionEventKind,
    session: Option<Session>,
    env: &SessionEnvironment<P, R>,
) -> SmallVec<[Effect<SessionAction>; 4]>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    tracing::debug!(
        ?kind,
        identity = ?session.as_ref().map(Session::identity),
        "Session changed"
    );
    state.supersede_resolution();
    apply_session(state, session, env)
}

/// Record a failed initial retrieval and settle as logged out.
pub fn retrieval_failed(
    state: &mut SessionState,
    generation: u64,
    message: &str,
) -> SmallVec<[Effect<SessionAction>; 4]> {
    if !state.settle_resolution(generation) {
        tracing::debug!(generation, %message, "Discarding superseded retrieval failure");
        return smallvec![Effect::None];
    }

    tracing::warn!(%message, "Continuing without a session");

    state.advance_generation();
    clear_identity(state);
    state.last_error = Some(ErrorKind::SessionRetrievalFailed);

    smallvec![Effect::None]
}

/// Reset to the logged-out shape.
pub fn signed_out(state: &mut SessionState) -> SmallVec<[Effect<SessionAction>; 4]> {
    tracing::info!("Signed out");

    state.supersede_resolution();
    state.advance_generation();
    clear_identity(state);

    smallvec![Effect::None]
}

fn apply_session<P, R>(
    state: &mut SessionState,
    session: Option<Session>,
    env: &SessionEnvironment<P, R>,
) -> SmallVec<[Effect<SessionAction>; 4]>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    let generation = state.advance_generation();

    let Some(session) = session else {
        clear_identity(state);
        return smallvec![Effect::None];
    };

    let identity = session.identity();
    if state.profile.as_ref().is_some_and(|p| p.id != identity) {
        state.profile = None;
    }
    state.session = Some(session);

    smallvec![profile::start_lookup(state, generation, identity, env)]
}

fn clear_identity(state: &mut SessionState) {
    state.session = None;
    state.profile = None;
    state.is_session_loading = false;
}
