use std::collections::HashSet;

use crate::{
    identity::RecordId,
    key::{FieldKey, FieldSlot, SlotSet},
};

/// Slots marked stale, so that policies refetch them even though the cache holds a value.
///
/// A record marked as a whole is stale for every field it holds at marking time.
#[derive(Debug, Default)]
pub struct StaleTracker {
    slots: HashSet<FieldSlot>,
}

impl StaleTracker {
    /// Marks `fields` of `record` stale, or only the fields named `field` when given.
    ///
    /// Returns the slots that were not stale yet.
    pub fn mark(&mut self, record: &RecordId, fields: impl IntoIterator<Item = FieldKey>, field: Option<&str>) -> SlotSet {
        let mut marked = SlotSet::new();

        for key in fields {
            if field.is_some_and(|field| key.field_name() != field) {
                continue;
            }

            let slot = FieldSlot::new(record.clone(), key);
            if self.slots.insert(slot.clone()) {
                marked.insert(slot);
            }
        }

        marked
    }

    /// Freshly written slots are no longer stale.
    pub fn clear(&mut self, written: &SlotSet) {
        if self.slots.is_empty() {
            return;
        }

        for slot in written {
            self.slots.remove(slot);
        }
    }

    pub fn forget_record(&mut self, record: &RecordId) {
        self.slots.retain(|slot| &slot.record != record);
    }

    pub fn forget(&mut self, slot: &FieldSlot) {
        self.slots.remove(slot);
    }

    pub fn is_stale(&self, slot: &FieldSlot) -> bool {
        self.slots.contains(slot)
    }

    pub fn any_stale(&self, visited: &SlotSet) -> bool {
        !self.slots.is_empty() && visited.iter().any(|slot| self.slots.contains(slot))
    }
}
