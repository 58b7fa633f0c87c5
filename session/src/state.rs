//! Session snapshot and data model.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Stable identity id assigned by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    /// Create a new random identity id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for IdentityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Provider-supplied identity metadata.
///
/// Only `id` takes part in decisions. The rest is display material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Identity id
    pub id: IdentityId,
    /// Email address, if the provider shares it
    pub email: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
}

impl SessionUser {
    /// User with only an id.
    #[must_use]
    pub const fn new(id: IdentityId) -> Self {
        Self {
            id,
            email: None,
            display_name: None,
            avatar_url: None,
        }
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// An authenticated session handed out by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The signed-in identity
    pub user: SessionUser,
    /// Bearer token for provider APIs
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Session for `user` with the given access token and no expiry.
    #[must_use]
    pub fn new(user: SessionUser, access_token: impl Into<String>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Set the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Set the expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The identity this session belongs to.
    #[must_use]
    pub const fn identity(&self) -> IdentityId {
        self.user.id
    }

    /// Whether the access token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Application profile, keyed 1:1 by identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity id this profile belongs to
    pub id: IdentityId,
    /// Whether the onboarding questionnaire was completed
    #[serde(default, deserialize_with = "null_as_false")]
    pub onboarding_completed: bool,
    /// Full name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Avatar image URL
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Profile for `id` that has not finished onboarding.
    #[must_use]
    pub const fn new(id: IdentityId) -> Self {
        Self {
            id,
            onboarding_completed: false,
            full_name: None,
            avatar_url: None,
        }
    }

    /// Mark onboarding as completed.
    #[must_use]
    pub const fn onboarded(mut self) -> Self {
        self.onboarding_completed = true;
        self
    }

    /// Set the full name.
    #[must_use]
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// An outstanding profile lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileRequest {
    /// Generation the lookup was started under
    pub generation: u64,
    /// Identity being looked up
    pub identity: IdentityId,
}

/// The published snapshot.
///
/// Mutated only by [`SessionReducer`](crate::SessionReducer).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Current session, if signed in
    pub session: Option<Session>,
    /// Profile of the current identity, if loaded and present
    pub profile: Option<Profile>,
    /// True until the session (and its first profile lookup) has resolved
    pub is_session_loading: bool,
    /// True while a lookup for the *current* identity is outstanding
    pub is_profile_loading: bool,
    /// Last locally recovered failure
    pub last_error: Option<ErrorKind>,
    generation: u64,
    profile_request: Option<ProfileRequest>,
    resolution: Option<u64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session: None,
            profile: None,
            is_session_loading: true,
            is_profile_loading: false,
            last_error: None,
            generation: 0,
            profile_request: None,
            resolution: None,
        }
    }
}

impl SessionState {
    /// Identity transitions applied so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The lookup whose result will be accepted, if one is outstanding.
    #[must_use]
    pub const fn pending_profile_request(&self) -> Option<ProfileRequest> {
        self.profile_request
    }

    /// Generation of the outstanding initial session retrieval, if any.
    #[must_use]
    pub const fn pending_resolution(&self) -> Option<u64> {
        self.resolution
    }

    /// The current identity, if signed in.
    #[must_use]
    pub fn identity(&self) -> Option<IdentityId> {
        self.session.as_ref().map(Session::identity)
    }

    /// True while either loading flag is set.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.is_session_loading || self.is_profile_loading
    }

    /// Whether the loaded profile has completed onboarding.
    #[must_use]
    pub fn onboarding_completed(&self) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|profile| profile.onboarding_completed)
    }

    /// Derive the authentication phase.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        match (&self.session, self.is_profile_loading) {
            (Some(_), true) => AuthPhase::AuthenticatingProfile,
            _ if self.is_session_loading => AuthPhase::Unresolved,
            (None, _) => AuthPhase::LoggedOut,
            (Some(_), false) if self.onboarding_completed() => AuthPhase::Ready,
            (Some(_), false) => AuthPhase::OnboardingIncomplete,
        }
    }

    /// Start a new identity transition and return its generation.
    ///
    /// Any outstanding lookup becomes stale.
    pub(crate) fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.profile_request = None;
        self.is_profile_loading = false;
        self.generation
    }

    pub(crate) fn begin_profile_request(&mut self, request: ProfileRequest) {
        self.profile_request = Some(request);
        self.is_profile_loading = true;
    }

    pub(crate) fn begin_resolution(&mut self, generation: u64) {
        self.resolution = Some(generation);
    }

    /// Settle the retrieval started under `generation`, if it is still awaited.
    pub(crate) fn settle_resolution(&mut self, generation: u64) -> bool {
        let current = self.resolution == Some(generation);
        if current {
            self.resolution = None;
        }
        current
    }

    /// A newer session source wins over an outstanding retrieval.
    pub(crate) fn supersede_resolution(&mut self) {
        self.resolution = None;
    }

    /// Take the outstanding request if it was started under `generation`.
    pub(crate) fn settle_profile_request(&mut self, generation: u64) -> Option<ProfileRequest> {
        match self.profile_request {
            Some(request) if request.generation == generation => {
                self.profile_request = None;
                self.is_profile_loading = false;
                Some(request)
            },
            _ => None,
        }
    }
}

/// Authentication phase derived from a [`SessionState`].
///
/// ```text
/// Unresolved ─► LoggedOut
/// Unresolved ─► AuthenticatingProfile ─► Ready | OnboardingIncomplete
/// Ready | OnboardingIncomplete ─► LoggedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPhase {
    /// Initial session resolution has not finished
    Unresolved,
    /// No session
    LoggedOut,
    /// Signed in, profile lookup outstanding
    AuthenticatingProfile,
    /// Signed in and onboarded
    Ready,
    /// Signed in, profile absent or onboarding not completed
    OnboardingIncomplete,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signed_in() -> Session {
        Session::new(SessionUser::new(IdentityId::new()), "token")
    }

    #[test]
    fn default_snapshot_is_unresolved() {
        let state = SessionState::default();
        assert!(state.is_session_loading);
        assert_eq!(state.phase(), AuthPhase::Unresolved);
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn phase_follows_flags() {
        let mut state = SessionState {
            is_session_loading: false,
            ..SessionState::default()
        };
        assert_eq!(state.phase(), AuthPhase::LoggedOut);

        let session = signed_in();
        let id = session.identity();
        state.session = Some(session);
        state.is_profile_loading = true;
        assert_eq!(state.phase(), AuthPhase::AuthenticatingProfile);

        state.is_profile_loading = false;
        assert_eq!(state.phase(), AuthPhase::OnboardingIncomplete);

        state.profile = Some(Profile::new(id));
        assert_eq!(state.phase(), AuthPhase::OnboardingIncomplete);

        state.profile = Some(Profile::new(id).onboarded());
        assert_eq!(state.phase(), AuthPhase::Ready);
    }

    #[test]
    fn only_the_latest_resolution_settles() {
        let mut state = SessionState::default();

        let first = state.advance_generation();
        state.begin_resolution(first);
        let second = state.advance_generation();
        state.begin_resolution(second);

        assert!(!state.settle_resolution(first));
        assert!(state.settle_resolution(second));
        assert_eq!(state.pending_resolution(), None);

        let third = state.advance_generation();
        state.begin_resolution(third);
        state.supersede_resolution();
        assert!(!state.settle_resolution(third));
    }

    #[test]
    fn settle_only_accepts_current_generation() {
        let mut state = SessionState::default();
        let identity = IdentityId::new();

        let first = state.advance_generation();
        state.begin_profile_request(ProfileRequest {
            generation: first,
            identity,
        });
        let second = state.advance_generation();
        state.begin_profile_request(ProfileRequest {
            generation: second,
            identity,
        });

        assert_eq!(state.settle_profile_request(first), None);
        assert!(state.is_profile_loading);
        assert_eq!(state.settle_profile_request(second).unwrap().generation, second);
        assert!(!state.is_profile_loading);
    }

    #[test]
    fn profile_row_tolerates_null_onboarding_and_extra_columns() {
        let id = IdentityId::new();
        let row = serde_json::json!({
            "id": id,
            "onboarding_completed": null,
            "full_name": "Ada Lovelace",
            "industry": "engineering"
        });

        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.id, id);
        assert!(!profile.onboarding_completed);
        assert_eq!(profile.full_name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let session = Session::new(SessionUser::new(IdentityId::new()), "access-secret")
            .with_refresh_token("refresh-secret");
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
