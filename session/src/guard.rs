//! Route guards.
//!
//! Guards read a snapshot synchronously and decide whether a route renders,
//! waits, or sends the visitor elsewhere. They never touch the store.

use crate::config::RouteConfig;
use crate::state::SessionState;

/// What a route should do with the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Authentication state is still resolving; show a placeholder.
    Loading,
    /// Navigate to another route.
    Redirect {
        /// Target path
        to: String,
    },
    /// Render the requested content.
    Render,
}

impl GuardDecision {
    fn redirect(to: &str) -> Self {
        Self::Redirect { to: to.to_string() }
    }
}

/// Access rule attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGuard {
    /// Requires a session.
    Protected {
        /// Let visitors who have not finished onboarding through.
        allow_incomplete_onboarding: bool,
    },
    /// Only for visitors without a session (the login page).
    PublicOnly,
}

impl RouteGuard {
    /// Requires a session and completed onboarding.
    #[must_use]
    pub const fn protected() -> Self {
        Self::Protected {
            allow_incomplete_onboarding: false,
        }
    }

    /// Requires a session; onboarding may be incomplete.
    #[must_use]
    pub const fn onboarding() -> Self {
        Self::Protected {
            allow_incomplete_onboarding: true,
        }
    }

    /// Redirects signed-in visitors away.
    #[must_use]
    pub const fn public_only() -> Self {
        Self::PublicOnly
    }

    /// Decide what the route does for `state`.
    #[must_use]
    pub fn evaluate(self, state: &SessionState, routes: &RouteConfig) -> GuardDecision {
        if state.is_loading() {
            return GuardDecision::Loading;
        }

        match self {
            Self::Protected {
                allow_incomplete_onboarding,
            } => {
                if state.session.is_none() {
                    GuardDecision::redirect(&routes.login)
                } else if !allow_incomplete_onboarding && !state.onboarding_completed() {
                    GuardDecision::redirect(&routes.onboarding)
                } else {
                    GuardDecision::Render
                }
            },
            Self::PublicOnly => {
                if state.session.is_some() {
                    GuardDecision::redirect(&routes.home)
                } else {
                    GuardDecision::Render
                }
            },
        }
    }
}
