//! Actions processed by the session reducer.

use crate::error::ProviderError;
use crate::providers::SessionEventKind;
use crate::state::{IdentityId, Profile, Session};

/// Every input the session reducer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Start (or restart) initial session resolution.
    Initialize,

    /// Initial session retrieval finished.
    SessionResolved {
        /// Generation the retrieval was started under
        generation: u64,
        /// Retrieved session, `None` when signed out
        session: Option<Session>,
    },

    /// Initial session retrieval failed after retries.
    SessionRetrievalFailed {
        /// Generation the retrieval was started under
        generation: u64,
        /// Provider error text
        message: String,
    },

    /// The identity provider pushed a session change.
    SessionChanged {
        /// What happened on the provider side
        kind: SessionEventKind,
        /// Session after the change
        session: Option<Session>,
    },

    /// Re-fetch the profile of the current identity.
    RefreshProfile,

    /// A profile lookup settled.
    ProfileLoaded {
        /// Generation the lookup was started under
        generation: u64,
        /// Identity that was looked up
        identity: IdentityId,
        /// Lookup outcome
        lookup: ProfileLookup,
    },

    /// The provider confirmed sign-out.
    SignedOut,
}

/// Outcome of a profile lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    /// A profile row exists
    Found(Profile),
    /// No row yet (not provisioned)
    NotFound,
    /// The lookup itself failed
    Failed(String),
}

impl From<Result<Option<Profile>, ProviderError>> for ProfileLookup {
    fn from(result: Result<Option<Profile>, ProviderError>) -> Self {
        match result {
            Ok(Some(profile)) => Self::Found(profile),
            Ok(None) => Self::NotFound,
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}
