//! Session reducers.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
//! Provider calls only happen inside the returned effects.

pub mod profile;
pub mod session;

use crate::actions::SessionAction;
use crate::environment::SessionEnvironment;
use crate::providers::{IdentityProvider, ProfileRepository};
use crate::state::SessionState;
use gatehouse_core::{SmallVec, effect::Effect, reducer::Reducer};
use std::marker::PhantomData;

/// Unified session reducer.
///
/// Routes session lifecycle actions to [`session`] and profile lookups to
/// [`profile`].
pub struct SessionReducer<P, R> {
    _providers: PhantomData<fn() -> (P, R)>,
}

impl<P, R> SessionReducer<P, R> {
    /// Create a new session reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _providers: PhantomData,
        }
    }
}

impl<P, R> Default for SessionReducer<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, R> Clone for SessionReducer<P, R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P, R> std::fmt::Debug for SessionReducer<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionReducer")
    }
}

impl<P, R> Reducer for SessionReducer<P, R>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    type State = SessionState;
    type Action = SessionAction;
    type Environment = SessionEnvironment<P, R>;

    fn reduce(
        &self,
        state: &mut SessionState,
        action: SessionAction,
        env: &SessionEnvironment<P, R>,
    ) -> SmallVec<[Effect<SessionAction>; 4]> {
        match action {
            SessionAction::Initialize => session::initialize(state, env),
            SessionAction::SessionResolved {
                generation,
                session,
            } => session::session_resolved(state, generation, session, env),
            SessionAction::SessionRetrievalFailed {
                generation,
                message,
            } => session::retrieval_failed(state, generation, &message),
            SessionAction::SessionChanged { kind, session } => {
                session::session_changed(state, kind, session, env)
            },
            SessionAction::SignedOut => session::signed_out(state),
            SessionAction::RefreshProfile => profile::refresh(state, env),
            SessionAction::ProfileLoaded {
                generation,
                identity,
                lookup,
            } => profile::loaded(state, generation, identity, lookup),
        }
    }
}
