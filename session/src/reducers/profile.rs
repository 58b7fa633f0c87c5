//! Profile lookup reducer.
//!
//! A lookup is tagged with the generation current when it started. Its result
//! is applied only if that generation is still the pending one; anything else
//! belongs to an identity transition that has since been superseded.

use crate::actions::{ProfileLookup, SessionAction};
use crate::environment::SessionEnvironment;
use crate::error::ErrorKind;
use crate::providers::{IdentityProvider, ProfileRepository, bounded};
use crate::state::{IdentityId, ProfileRequest, SessionState};
use gatehouse_core::{SmallVec, async_effect, effect::Effect, smallvec};

/// Record a lookup for `identity` under `generation` and describe it.
pub(crate) fn start_lookup<P, R>(
    state: &mut SessionState,
    generation: u64,
    identity: IdentityId,
    env: &SessionEnvironment<P, R>,
) -> Effect<SessionAction>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    state.begin_profile_request(ProfileRequest {
        generation,
        identity,
    });

    tracing::debug!(%identity, generation, "Looking up profile");

    let profiles = env.profiles.clone();
    let timeout = env.config.request_timeout;

    async_effect! {
        let result = bounded(timeout, profiles.get_profile_by_id(&identity)).await;
        Some(SessionAction::ProfileLoaded {
            generation,
            identity,
            lookup: ProfileLookup::from(result),
        })
    }
}

/// Re-fetch the profile of the current identity.
///
/// Without a session there is nothing to fetch.
pub fn refresh<P, R>(
    state: &mut SessionState,
    env: &SessionEnvironment<P, R>,
) -> SmallVec<[Effect<SessionAction>; 4]>
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    let Some(identity) = state.identity() else {
        tracing::debug!("Profile refresh ignored: no session");
        return smallvec![Effect::None];
    };

    let generation = state.advance_generation();
    smallvec![start_lookup(state, generation, identity, env)]
}

/// Apply a settled lookup, or drop it if it is stale.
pub fn loaded(
    state: &mut SessionState,
    generation: u64,
    identity: IdentityId,
    lookup: ProfileLookup,
) -> SmallVec<[Effect<SessionAction>; 4]> {
    let current = state
        .pending_profile_request()
        .is_some_and(|request| request.generation == generation && request.identity == identity);

    if !current {
        tracing::debug!(
            %identity,
            generation,
            current_generation = state.generation(),
            "Discarding stale profile lookup"
        );
        return smallvec![Effect::None];
    }

    state.settle_profile_request(generation);
    state.is_session_loading = false;

    match lookup {
        ProfileLookup::Found(profile) if profile.id == identity => {
            tracing::debug!(
                %identity,
                onboarding_completed = profile.onboarding_completed,
                "Profile loaded"
            );
            state.profile = Some(profile);
            clear_lookup_error(state);
        },
        ProfileLookup::Found(profile) => {
            tracing::warn!(%identity, returned = %profile.id, "Profile lookup returned another identity");
            state.profile = None;
            clear_lookup_error(state);
        },
        ProfileLookup::NotFound => {
            tracing::info!(%identity, "No profile yet");
            state.profile = None;
            clear_lookup_error(state);
        },
        ProfileLookup::Failed(message) => {
            tracing::warn!(%identity, %message, "Profile lookup failed");
            state.profile = None;
            state.last_error = Some(ErrorKind::ProfileLookupFailed);
        },
    }

    smallvec![Effect::None]
}

fn clear_lookup_error(state: &mut SessionState) {
    if state.last_error == Some(ErrorKind::ProfileLookupFailed) {
        state.last_error = None;
    }
}
