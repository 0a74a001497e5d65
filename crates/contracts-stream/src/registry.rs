//! The subscription registry (spec §4.4, §5 "Ordering"/"Cancellation"):
//! lock-free insert/remove across concurrently-notified subscriptions.

use dashmap::DashMap;

use crate::subscription::{Subscription, SubscriptionId};

/// A concurrent map of live subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<SubscriptionId, Subscription>,
}

impl SubscriptionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscription`, returning its fresh id.
    pub fn insert(&self, subscription: Subscription) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscriptions.insert(id, subscription);
        id
    }

    /// Remove a subscription (spec §4.4 "Cancellation").
    pub fn remove(&self, id: SubscriptionId) -> Option<Subscription> {
        self.subscriptions.remove(&id).map(|(_, sub)| sub)
    }

    /// Current number of open subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// `true` if there are no open subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Run `f` against every registered subscription, keyed by id.
    pub fn for_each(&self, mut f: impl FnMut(SubscriptionId, &Subscription)) {
        for entry in self.subscriptions.iter() {
            f(*entry.key(), entry.value());
        }
    }

    /// Run `f` against one subscription by id, if it still exists.
    pub fn with<R>(&self, id: SubscriptionId, f: impl FnOnce(&mut Subscription) -> R) -> Option<R> {
        self.subscriptions.get_mut(&id).map(|mut entry| f(entry.value_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn insert_and_remove_round_trips() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = Subscription::new("contracts", json!({}), json!({}), tx).unwrap();
        let id = registry.insert(sub);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
    }
}
