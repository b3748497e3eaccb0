use std::collections::HashMap;

use crate::key::{FieldSlot, SlotSet};

/// Counts the collections each base slot went through without being used.
#[derive(Debug)]
pub struct GarbageCollector {
    lifetime: u32,
    ages: HashMap<FieldSlot, u32>,
}

impl GarbageCollector {
    pub fn new(lifetime: u32) -> Self {
        GarbageCollector {
            lifetime,
            ages: HashMap::new(),
        }
    }

    /// Written or subscribed slots start over.
    pub fn reset(&mut self, slots: &SlotSet) {
        for slot in slots {
            self.ages.remove(slot);
        }
    }

    /// Ages every candidate that is not in use and returns the ones past their lifetime.
    ///
    /// Slots missing from `candidates` are no longer stored and are forgotten.
    pub fn tick(&mut self, candidates: Vec<FieldSlot>, in_use: impl Fn(&FieldSlot) -> bool) -> Vec<FieldSlot> {
        let mut ages = HashMap::with_capacity(candidates.len());
        let mut expired = Vec::new();

        for slot in candidates {
            if in_use(&slot) {
                continue;
            }

            let age = self.ages.get(&slot).copied().unwrap_or_default() + 1;
            if age > self.lifetime {
                expired.push(slot);
            } else {
                ages.insert(slot, age);
            }
        }

        self.ages = ages;
        expired
    }
}
