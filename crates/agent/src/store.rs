use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use roomservice_core::domain::conversation::{ConversationKey, GuestConversation};

/// Live conversations keyed by tenant and guest. Each entry carries its own
/// lock so one guest's turn never waits on another's.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: RwLock<HashMap<ConversationKey, Arc<Mutex<GuestConversation>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the conversation for `key`, starting a fresh one if needed.
    pub async fn entry(
        &self,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> Arc<Mutex<GuestConversation>> {
        if let Some(existing) = self.entries.read().await.get(key) {
            return Arc::clone(existing);
        }

        let mut entries = self.entries.write().await;
        Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(GuestConversation::new(key.clone(), now)))),
        )
    }

    pub async fn get(&self, key: &ConversationKey) -> Option<Arc<Mutex<GuestConversation>>> {
        self.entries.read().await.get(key).map(Arc::clone)
    }

    pub async fn snapshot(&self, key: &ConversationKey) -> Option<GuestConversation> {
        let entry = self.get(key).await?;
        let conversation = entry.lock().await;
        Some(conversation.clone())
    }

    /// Drops conversations idle for at least `ttl`. Entries in use right now
    /// are skipped and looked at again on the next sweep. An entry is in use
    /// while it is locked or while a caller still holds the handle returned by
    /// [`ConversationStore::entry`].
    pub async fn evict_idle(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            match entry.try_lock() {
                Ok(conversation) => !conversation.is_idle(now, ttl),
                Err(_) => true,
            }
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use roomservice_core::domain::conversation::{ConversationKey, ConversationState, GuestId};
    use roomservice_core::domain::tenant::TenantId;

    use super::ConversationStore;

    fn key(tenant: &str, guest: &str) -> ConversationKey {
        ConversationKey::new(TenantId(tenant.to_owned()), GuestId(guest.to_owned()))
    }

    #[tokio::test]
    async fn same_guest_number_is_isolated_per_tenant() {
        let store = ConversationStore::new();
        let now = Utc::now();

        let at_a = store.entry(&key("hotel-a", "919800000001"), now).await;
        at_a.lock().await.state = ConversationState::Ordering;
        let at_b = store.entry(&key("hotel-b", "919800000001"), now).await;

        assert!(!Arc::ptr_eq(&at_a, &at_b));
        assert_eq!(at_b.lock().await.state, ConversationState::Initial);
        assert_eq!(
            store.snapshot(&key("hotel-a", "919800000001")).await.map(|c| c.state),
            Some(ConversationState::Ordering)
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn eviction_keeps_recent_and_busy_conversations() {
        let store = ConversationStore::new();
        let start = Utc::now();
        let later = start + Duration::hours(25);

        store.entry(&key("hotel-a", "stale"), start).await;
        let busy = store.entry(&key("hotel-a", "busy"), start).await;
        let fresh = store.entry(&key("hotel-a", "fresh"), start).await;
        fresh.lock().await.last_activity = later;
        drop(fresh);

        let guard = busy.lock().await;
        let evicted = store.evict_idle(later, Duration::hours(24)).await;
        drop(guard);

        assert_eq!(evicted, 1);
        assert!(store.get(&key("hotel-a", "stale")).await.is_none());
        assert!(store.get(&key("hotel-a", "busy")).await.is_some());
        assert!(store.get(&key("hotel-a", "fresh")).await.is_some());
    }

    #[tokio::test]
    async fn handle_taken_before_locking_survives_a_sweep() {
        let store = ConversationStore::new();
        let start = Utc::now();
        let later = start + Duration::hours(25);
        let guest = key("hotel-a", "919800000001");

        let handle = store.entry(&guest, start).await;
        assert_eq!(store.evict_idle(later, Duration::hours(24)).await, 0);

        {
            let mut conversation = handle.lock().await;
            conversation.state = ConversationState::Ordering;
            conversation.last_activity = later;
        }
        drop(handle);

        let current = store.entry(&guest, later).await;
        assert_eq!(current.lock().await.state, ConversationState::Ordering);
        drop(current);
        assert_eq!(store.evict_idle(later + Duration::hours(25), Duration::hours(24)).await, 1);
    }
}
