//! Listener registry shared by provider implementations.

use super::{SessionEvent, SessionSubscription, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
}

/// Fans session events out to every registered listener.
///
/// Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct SessionBroadcaster {
    listeners: Arc<Mutex<Listeners>>,
}

impl SessionBroadcaster {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        let (tx, events) = mpsc::unbounded_channel();

        let id = {
            let mut listeners = self.lock();
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners.senders.insert(id, tx);
            id
        };

        let registry = Arc::downgrade(&self.listeners);
        let handle = SubscriptionHandle::new(id, move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .senders
                    .remove(&id);
                tracing::debug!(subscription = id, "Session listener released");
            }
        });

        tracing::debug!(subscription = id, "Session listener registered");
        SessionSubscription { events, handle }
    }

    /// Deliver `event` to every listener; returns how many received it.
    ///
    /// Listeners whose receiver is gone are dropped from the registry.
    pub fn notify(&self, event: &SessionEvent) -> usize {
        let mut listeners = self.lock();
        listeners
            .senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
        listeners.senders.len()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().senders.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::providers::SessionEventKind;

    #[tokio::test]
    async fn events_reach_every_listener_in_order() {
        let broadcaster = SessionBroadcaster::new();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.notify(&SessionEvent::new(SessionEventKind::SignedOut, None));
        broadcaster.notify(&SessionEvent::new(SessionEventKind::TokenRefreshed, None));

        for subscription in [&mut first, &mut second] {
            assert_eq!(
                subscription.events.recv().await.unwrap().kind,
                SessionEventKind::SignedOut
            );
            assert_eq!(
                subscription.events.recv().await.unwrap().kind,
                SessionEventKind::TokenRefreshed
            );
        }
    }

    #[test]
    fn releasing_handle_unregisters() {
        let broadcaster = SessionBroadcaster::new();
        let subscription = broadcaster.subscribe();
        assert_eq!(broadcaster.active_count(), 1);

        subscription.handle.release();
        assert_eq!(broadcaster.active_count(), 0);
    }

    #[test]
    fn closed_receivers_are_pruned_on_notify() {
        let broadcaster = SessionBroadcaster::new();
        let SessionSubscription { events, handle } = broadcaster.subscribe();
        drop(events);

        let delivered = broadcaster.notify(&SessionEvent::new(SessionEventKind::SignedIn, None));
        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.active_count(), 0);
        drop(handle);
    }
}
