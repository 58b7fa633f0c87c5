//! Mock profile repository for testing.

use crate::error::ProviderError;
use crate::providers::ProfileRepository;
use crate::state::{IdentityId, Profile};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Rows {
    profiles: HashMap<IdentityId, Profile>,
    failures: HashMap<IdentityId, ProviderError>,
    delays: HashMap<IdentityId, Duration>,
    calls: Vec<IdentityId>,
}

/// Mock profile repository.
///
/// Per-identity delays let tests hold one lookup in flight while another
/// identity signs in.
#[derive(Debug, Clone, Default)]
pub struct MockProfileRepository {
    rows: Arc<Mutex<Rows>>,
}

impl MockProfileRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start with `profile` stored.
    #[must_use]
    pub fn with_profile(self, profile: Profile) -> Self {
        self.insert(profile);
        self
    }

    /// Store or replace a profile.
    pub fn insert(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id, profile);
    }

    /// Delete the profile for `id`.
    pub fn remove(&self, id: &IdentityId) -> Option<Profile> {
        self.lock().profiles.remove(id)
    }

    /// Fail lookups for `id` with `error`.
    pub fn fail_for(&self, id: IdentityId, error: ProviderError) {
        self.lock().failures.insert(id, error);
    }

    /// Delay lookups for `id` by `delay`.
    pub fn delay_for(&self, id: IdentityId, delay: Duration) {
        self.lock().delays.insert(id, delay);
    }

    /// Identities looked up so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<IdentityId> {
        self.lock().calls.clone()
    }

    /// Number of lookups so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

impl ProfileRepository for MockProfileRepository {
    fn get_profile_by_id(
        &self,
        id: &IdentityId,
    ) -> impl Future<Output = Result<Option<Profile>, ProviderError>> + Send {
        let repository = self.clone();
        let id = *id;

        async move {
            let delay = {
                let mut rows = repository.lock();
                rows.calls.push(id);
                rows.delays.get(&id).copied()
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let rows = repository.lock();
            match rows.failures.get(&id) {
                Some(error) => Err(error.clone()),
                None => Ok(rows.profiles.get(&id).cloned()),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_row_is_none() {
        let repository = MockProfileRepository::new();
        let id = IdentityId::new();

        assert_eq!(repository.get_profile_by_id(&id).await, Ok(None));
        assert_eq!(repository.call_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_per_identity() {
        let healthy = IdentityId::new();
        let broken = IdentityId::new();
        let repository = MockProfileRepository::new().with_profile(Profile::new(healthy));
        repository.fail_for(broken, ProviderError::Network("reset".into()));

        assert!(repository.get_profile_by_id(&healthy).await.unwrap().is_some());
        assert_eq!(
            repository.get_profile_by_id(&broken).await,
            Err(ProviderError::Network("reset".into()))
        );
        assert_eq!(repository.calls(), vec![healthy, broken]);
    }
}
