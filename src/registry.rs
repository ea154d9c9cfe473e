//! Subscriber records and the storage seam.
//!
//! The binary uses the in-memory store; anything that can satisfy
//! `SubscriberStore` (a database-backed store, a fake in tests) plugs in
//! behind the same trait.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::timezone::TimeZoneIdentity;

/// A registered recipient of the daily delivery
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Chat id, the delivery address
    pub id: i64,
    pub display_name: Option<String>,
    /// Canonical city name as confirmed by the weather provider
    pub city: String,
    pub time_zone: TimeZoneIdentity,
    /// False means no recurring trigger should exist for this subscriber
    pub subscription_active: bool,
}

pub trait SubscriberStore: Send + Sync {
    /// Create or update a subscriber and mark the subscription active.
    /// An existing display name is kept when the new one is `None`.
    fn upsert(
        &self,
        id: i64,
        display_name: Option<String>,
        city: String,
        time_zone: TimeZoneIdentity,
    ) -> Subscriber;

    fn get(&self, id: i64) -> Option<Subscriber>;

    /// Mark the subscription inactive. Idempotent; unknown ids are a no-op.
    fn deactivate(&self, id: i64);

    /// All subscribers with an active subscription (startup rescheduling)
    fn active(&self) -> Vec<Subscriber>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    subscribers: RwLock<HashMap<i64, Subscriber>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubscriberStore for InMemoryStore {
    fn upsert(
        &self,
        id: i64,
        display_name: Option<String>,
        city: String,
        time_zone: TimeZoneIdentity,
    ) -> Subscriber {
        let mut subscribers = self.subscribers.write().unwrap();
        let previous_name = subscribers.get(&id).and_then(|s| s.display_name.clone());
        let subscriber = Subscriber {
            id,
            display_name: display_name.or(previous_name),
            city,
            time_zone,
            subscription_active: true,
        };
        subscribers.insert(id, subscriber.clone());
        subscriber
    }

    fn get(&self, id: i64) -> Option<Subscriber> {
        self.subscribers.read().unwrap().get(&id).cloned()
    }

    fn deactivate(&self, id: i64) {
        if let Some(subscriber) = self.subscribers.write().unwrap().get_mut(&id) {
            subscriber.subscription_active = false;
        }
    }

    fn active(&self) -> Vec<Subscriber> {
        self.subscribers
            .read()
            .unwrap()
            .values()
            .filter(|s| s.subscription_active)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone;

    fn utc_plus_two() -> TimeZoneIdentity {
        timezone::resolve(7200).unwrap()
    }

    #[test]
    fn test_upsert_creates_active_subscriber() {
        let store = InMemoryStore::new();
        let sub = store.upsert(1, Some("Vitya".to_string()), "Warsaw".to_string(), utc_plus_two());
        assert!(sub.subscription_active);
        assert_eq!(sub.city, "Warsaw");
        assert_eq!(store.get(1).unwrap().city, "Warsaw");
    }

    #[test]
    fn test_upsert_replaces_city() {
        let store = InMemoryStore::new();
        store.upsert(1, None, "Warsaw".to_string(), utc_plus_two());
        store.upsert(1, None, "Rivne".to_string(), utc_plus_two());
        assert_eq!(store.get(1).unwrap().city, "Rivne");
        assert_eq!(store.active().len(), 1);
    }

    #[test]
    fn test_upsert_keeps_display_name() {
        let store = InMemoryStore::new();
        store.upsert(1, Some("Roma".to_string()), "Rivne".to_string(), utc_plus_two());
        let sub = store.upsert(1, None, "Warsaw".to_string(), utc_plus_two());
        assert_eq!(sub.display_name.as_deref(), Some("Roma"));
    }

    #[test]
    fn test_upsert_reactivates() {
        let store = InMemoryStore::new();
        store.upsert(1, None, "Warsaw".to_string(), utc_plus_two());
        store.deactivate(1);
        assert!(!store.get(1).unwrap().subscription_active);
        store.upsert(1, None, "Warsaw".to_string(), utc_plus_two());
        assert!(store.get(1).unwrap().subscription_active);
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.get(42).is_none());
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let store = InMemoryStore::new();
        store.upsert(1, None, "Warsaw".to_string(), utc_plus_two());
        store.deactivate(1);
        store.deactivate(1);
        store.deactivate(99); // unknown id is a no-op
        assert!(!store.get(1).unwrap().subscription_active);
    }

    #[test]
    fn test_active_excludes_deactivated() {
        let store = InMemoryStore::new();
        store.upsert(1, None, "Warsaw".to_string(), utc_plus_two());
        store.upsert(2, None, "Kelowna".to_string(), timezone::resolve(-8 * 3600).unwrap());
        store.deactivate(1);
        let active = store.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 2);
    }
}
