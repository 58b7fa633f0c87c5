//! Mock implementations for testing.
//!
//! In-memory collaborators with failure switches and artificial latency, so
//! reducers and the store can be exercised at memory speed.

pub mod identity;
pub mod profiles;

pub use identity::MockIdentityProvider;
pub use profiles::MockProfileRepository;
