//! Session environment.
//!
//! Dependencies injected into [`SessionReducer`](crate::SessionReducer).

use crate::config::AuthConfig;
use crate::providers::{IdentityProvider, ProfileRepository};

/// Session environment.
///
/// # Type Parameters
///
/// - `P`: identity provider
/// - `R`: profile repository
#[derive(Debug, Clone)]
pub struct SessionEnvironment<P, R>
where
    P: IdentityProvider + Clone,
    R: ProfileRepository + Clone,
{
    /// Identity provider.
    pub identity: P,

    /// Profile repository.
    pub profiles: R,

    /// Store configuration.
    pub config: AuthConfig,
}

impl<P, R> SessionEnvironment<P, R>
where
    P: IdentityProvider + Clone,
    R: ProfileRepository + Clone,
{
    /// Create a new environment.
    #[must_use]
    pub const fn new(identity: P, profiles: R, config: AuthConfig) -> Self {
        Self {
            identity,
            profiles,
            config,
        }
    }
}
