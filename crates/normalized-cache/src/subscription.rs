//! Inverted index from field slots to the observers whose last read visited them.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use indexmap::IndexSet;

use crate::key::{FieldSlot, SlotSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    index: HashMap<FieldSlot, BTreeSet<ObserverId>>,
    observers: HashMap<ObserverId, SlotSet>,
    next: u64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ObserverId {
        let id = ObserverId(self.next);
        self.next += 1;
        id
    }

    /// Tracks `visited` for `observer`, replacing whatever it tracked before.
    pub fn subscribe(&mut self, observer: ObserverId, visited: SlotSet) {
        self.remove_from_index(observer);

        for slot in &visited {
            self.index.entry(slot.clone()).or_default().insert(observer);
        }

        tracing::trace!(%observer, slots = visited.len(), "subscribed");
        self.observers.insert(observer, visited);
    }

    /// Stops tracking an observer. Unknown observers are ignored.
    pub fn unsubscribe(&mut self, observer: ObserverId) -> bool {
        let known = self.remove_from_index(observer);
        if known {
            tracing::trace!(%observer, "unsubscribed");
        }
        known
    }

    /// The observers depending on any of the touched slots, each listed once.
    ///
    /// Observers come in the order of the first touched slot they depend on, ties broken by id.
    pub fn interested(&self, touched: &SlotSet) -> IndexSet<ObserverId> {
        touched
            .iter()
            .filter_map(|slot| self.index.get(slot))
            .flatten()
            .copied()
            .collect()
    }

    /// Invokes `callback` once per observer interested in `touched`.
    pub fn notify(&self, touched: &SlotSet, mut callback: impl FnMut(ObserverId)) -> usize {
        let interested = self.interested(touched);

        for observer in &interested {
            callback(*observer);
        }

        interested.len()
    }

    pub fn visited(&self, observer: ObserverId) -> Option<&SlotSet> {
        self.observers.get(&observer)
    }

    pub fn is_tracked(&self, slot: &FieldSlot) -> bool {
        self.index.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn remove_from_index(&mut self, observer: ObserverId) -> bool {
        let Some(previous) = self.observers.remove(&observer) else {
            return false;
        };

        for slot in previous {
            if let Some(observers) = self.index.get_mut(&slot) {
                observers.remove(&observer);
                if observers.is_empty() {
                    self.index.remove(&slot);
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(slots: &[(&str, &str)]) -> SlotSet {
        slots.iter().map(|(record, key)| FieldSlot::new(*record, *key)).collect()
    }

    #[test]
    fn each_observer_is_notified_once() {
        let mut manager = SubscriptionManager::new();
        let first = manager.next_id();
        let second = manager.next_id();
        let third = manager.next_id();

        manager.subscribe(first, slots(&[("User:1", "name"), ("User:1", "age")]));
        manager.subscribe(second, slots(&[("User:1", "age")]));
        manager.subscribe(third, slots(&[("User:2", "name")]));

        let mut notified = Vec::new();
        let count = manager.notify(&slots(&[("User:1", "name"), ("User:1", "age")]), |observer| {
            notified.push(observer)
        });

        assert_eq!(count, 2);
        assert_eq!(notified, vec![first, second]);
    }

    #[test]
    fn resubscribe_replaces_visited_slots() {
        let mut manager = SubscriptionManager::new();
        let observer = manager.next_id();

        manager.subscribe(observer, slots(&[("Node:1", "__typename"), ("Node:1", "name")]));
        manager.subscribe(observer, slots(&[("Node:1", "__typename"), ("Node:1", "title")]));

        assert!(!manager.is_tracked(&FieldSlot::new("Node:1", "name")));
        assert!(manager.interested(&slots(&[("Node:1", "name")])).is_empty());
        assert_eq!(
            manager.interested(&slots(&[("Node:1", "title")])),
            IndexSet::<ObserverId>::from_iter([observer])
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut manager = SubscriptionManager::new();
        let observer = manager.next_id();

        manager.subscribe(observer, slots(&[("User:1", "name")]));

        assert!(manager.unsubscribe(observer));
        assert!(!manager.unsubscribe(observer));
        assert!(manager.is_empty());
        assert!(!manager.is_tracked(&FieldSlot::new("User:1", "name")));
        assert_eq!(manager.notify(&slots(&[("User:1", "name")]), |_| unreachable!()), 0);
    }
}
