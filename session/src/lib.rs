//! # Gatehouse Session
//!
//! Keeps one consistent answer to "who is signed in, and have they finished
//! onboarding" while an identity provider pushes session changes and profile
//! lookups complete in arbitrary order.
//!
//! ## Architecture
//!
//! Every transition is an action reduced by [`SessionReducer`]:
//!
//! ```text
//! Initialize ──► SessionResolved ──► ProfileLoaded
//!                      ▲                  ▲
//! provider events ─► SessionChanged ──────┘
//! sign-out ──────► SignedOut
//! ```
//!
//! Each identity transition bumps a generation counter. A profile lookup
//! carries the generation it was started under and its result is dropped
//! unless that generation is still current, so a slow lookup for a previous
//! identity can never overwrite the profile of the current one. The initial
//! session retrieval is tagged the same way, and a sign-out or provider event
//! that lands first wins over it.
//!
//! [`AuthStore`] wires the reducer to a [`gatehouse_runtime::Store`], owns the
//! provider subscription and exposes the snapshot to [`RouteGuard`]s.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatehouse_session::{AuthConfig, AuthStore, RouteGuard, SessionEnvironment};
//!
//! let env = SessionEnvironment::new(identity_provider, profile_repository, AuthConfig::from_env());
//! let auth = AuthStore::new(env);
//! auth.initialize().await?;
//!
//! match auth.guard(RouteGuard::protected()) {
//!     GuardDecision::Loading => show_spinner(),
//!     GuardDecision::Redirect { to } => navigate(&to),
//!     GuardDecision::Render => render_page(),
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod actions;
pub mod config;
pub mod environment;
pub mod error;
pub mod guard;
pub mod providers;
pub mod reducers;
pub mod state;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use actions::{ProfileLookup, SessionAction};
pub use config::{AuthConfig, RouteConfig, SupabaseConfig};
pub use environment::SessionEnvironment;
pub use error::{ErrorKind, ProviderError, Result, SessionError};
pub use guard::{GuardDecision, RouteGuard};
pub use providers::{
    IdentityProvider, OAuthProvider, OAuthRedirect, ProfileRepository, SessionEvent,
    SessionEventKind, SessionSubscription, SubscriptionHandle,
};
pub use reducers::SessionReducer;
pub use state::{AuthPhase, IdentityId, Profile, Session, SessionState, SessionUser};
pub use store::AuthStore;
