//! Error types for session and profile synchronization.

use gatehouse_runtime::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for [`AuthStore`](crate::AuthStore) operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure reported by an external collaborator (identity provider or
/// profile store).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with an error status.
    #[error("provider rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP-style status code
        status: u16,
        /// Provider supplied message
        message: String,
    },

    /// The request did not finish within the configured timeout.
    #[error("provider request timed out")]
    Timeout,

    /// The response could not be decoded.
    #[error("malformed provider response: {0}")]
    Decode(String),

    /// The provider is not reachable or not configured.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Returns `true` if repeating the request may succeed.
    ///
    /// ```
    /// # use gatehouse_session::ProviderError;
    /// assert!(ProviderError::Timeout.is_transient());
    /// assert!(!ProviderError::Rejected { status: 401, message: "bad jwt".into() }.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

/// Recorded in the snapshot's `last_error` for failures the store recovers
/// from locally. Also classifies [`SessionError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The current session could not be retrieved.
    SessionRetrievalFailed,
    /// The profile lookup for the current identity failed.
    ProfileLookupFailed,
    /// The OAuth redirect could not be initiated.
    SignInInitiationFailed,
    /// The provider refused to end the session.
    SignOutFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SessionRetrievalFailed => "session retrieval failed",
            Self::ProfileLookupFailed => "profile lookup failed",
            Self::SignInInitiationFailed => "sign-in initiation failed",
            Self::SignOutFailed => "sign-out failed",
        };
        f.write_str(name)
    }
}

/// Errors surfaced to callers of [`AuthStore`](crate::AuthStore).
///
/// The `Display` text of the sign-in and sign-out variants is suitable for
/// showing next to the button that triggered them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    // ═══════════════════════════════════════════════════════════
    // Collaborator failures
    // ═══════════════════════════════════════════════════════════

    /// The current session could not be retrieved.
    #[error("Could not check your session: {0}")]
    SessionRetrievalFailed(#[source] ProviderError),

    /// The profile for the current identity could not be loaded.
    #[error("Could not load your profile: {0}")]
    ProfileLookupFailed(#[source] ProviderError),

    /// The OAuth sign-in could not be started.
    #[error("Sign in failed: {0}")]
    SignInInitiationFailed(#[source] ProviderError),

    /// The provider refused to end the session.
    #[error("Sign out failed: {0}")]
    SignOutFailed(#[source] ProviderError),

    // ═══════════════════════════════════════════════════════════
    // Local failures
    // ═══════════════════════════════════════════════════════════

    /// The underlying store rejected the action.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Required configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// The [`ErrorKind`] of collaborator failures.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::SessionRetrievalFailed(_) => Some(ErrorKind::SessionRetrievalFailed),
            Self::ProfileLookupFailed(_) => Some(ErrorKind::ProfileLookupFailed),
            Self::SignInInitiationFailed(_) => Some(ErrorKind::SignInInitiationFailed),
            Self::SignOutFailed(_) => Some(ErrorKind::SignOutFailed),
            Self::Store(_) | Self::Configuration(_) => None,
        }
    }

    /// The collaborator error behind this failure, if any.
    #[must_use]
    pub const fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::SessionRetrievalFailed(err)
            | Self::ProfileLookupFailed(err)
            | Self::SignInInitiationFailed(err)
            | Self::SignOutFailed(err) => Some(err),
            Self::Store(_) | Self::Configuration(_) => None,
        }
    }
}
