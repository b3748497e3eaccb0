//! Flat storage of records, with optimistic overlays stacked on top of a base layer.
//!
//! Every mutating entry point reports the slots whose visible value changed. Writing the value a
//! slot already holds is not a change.

mod layer;
mod snapshot;
mod transaction;
mod value;

use std::fmt;

use indexmap::IndexSet;
use serde_json::Value;

pub use self::{
    snapshot::Snapshot,
    transaction::{StagedWrite, Transaction},
    value::{FieldValue, ValueShape},
};

use self::{
    layer::{Layer, Lookup},
    value::check_shape,
};
use crate::{
    error::CacheError,
    identity::RecordId,
    key::{FieldKey, FieldSlot, SlotSet},
};

/// Identifies the optimistic overlay of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl MutationId {
    pub fn new(id: u64) -> Self {
        MutationId(id)
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mutation#{}", self.0)
    }
}

/// The layer a write lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerTarget {
    Base,
    Optimistic(MutationId),
}

#[derive(Debug, Default)]
pub struct RecordStore {
    base: Layer,
    /// Bottom to top.
    overlays: Vec<Overlay>,
}

#[derive(Debug)]
struct Overlay {
    id: MutationId,
    layer: Layer,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The visible value of a slot, resolved from the topmost overlay down to the base.
    pub fn get(&self, record: &RecordId, key: &FieldKey) -> Option<&FieldValue> {
        self.resolve(record, key, self.overlays.len())
    }

    pub fn record_exists(&self, record: &RecordId) -> bool {
        self.exists_below(record, self.overlays.len())
    }

    /// The keys of every visible field of a record.
    pub fn fields_of(&self, record: &RecordId) -> IndexSet<FieldKey> {
        self.fields_below(record, self.overlays.len())
    }

    /// Every record visible through the layers.
    pub fn record_ids(&self) -> IndexSet<RecordId> {
        let mut candidates = self.base.records.keys().cloned().collect::<IndexSet<_>>();
        for overlay in &self.overlays {
            candidates.extend(overlay.layer.records.keys().cloned());
        }

        candidates.retain(|record| self.record_exists(record));
        candidates
    }

    pub fn has_layer(&self, mutation: MutationId) -> bool {
        self.overlays.iter().any(|overlay| overlay.id == mutation)
    }

    pub fn set(&mut self, record: &RecordId, key: &FieldKey, value: Value) -> Result<SlotSet, CacheError> {
        self.write_field(LayerTarget::Base, record, key, FieldValue::Scalar(value))
    }

    pub fn link(&mut self, record: &RecordId, key: &FieldKey, target: Option<RecordId>) -> Result<SlotSet, CacheError> {
        self.write_field(LayerTarget::Base, record, key, FieldValue::Link(target))
    }

    pub fn link_list(
        &mut self,
        record: &RecordId,
        key: &FieldKey,
        targets: Vec<Option<RecordId>>,
    ) -> Result<SlotSet, CacheError> {
        self.write_field(LayerTarget::Base, record, key, FieldValue::LinkList(targets))
    }

    /// Removes a record. Links pointing at it elsewhere are left dangling.
    pub fn delete(&mut self, record: &RecordId) -> SlotSet {
        self.delete_in(LayerTarget::Base, record)
    }

    pub fn write_field(
        &mut self,
        target: LayerTarget,
        record: &RecordId,
        key: &FieldKey,
        value: FieldValue,
    ) -> Result<SlotSet, CacheError> {
        let mut scratch = Layer::default();
        check_shape(record, key, self.resolve_at(target, record, key), &value)?;
        scratch.set(record.clone(), key.clone(), value);

        Ok(self.apply_layer(target, scratch))
    }

    pub fn delete_in(&mut self, target: LayerTarget, record: &RecordId) -> SlotSet {
        let mut scratch = Layer::default();
        scratch.mask(record.clone());

        self.apply_layer(target, scratch)
    }

    /// Starts a write whose changes stay invisible until [`RecordStore::apply`].
    pub fn transaction(&self, target: LayerTarget) -> Transaction<'_> {
        Transaction::new(self, target)
    }

    pub fn apply(&mut self, staged: StagedWrite) -> SlotSet {
        let (target, scratch) = staged.into_parts();
        self.apply_layer(target, scratch)
    }

    /// Merges the overlay of a mutation into the base.
    ///
    /// Unknown ids are ignored, so committing or rolling back twice is harmless.
    pub fn commit(&mut self, mutation: MutationId) -> SlotSet {
        let Some(position) = self.overlay_position(mutation) else {
            tracing::debug!(%mutation, "commit of an unknown optimistic layer");
            return SlotSet::new();
        };

        let affected = self.affected_slots(&self.overlays[position].layer);
        self.observe(affected, |store| {
            let overlay = store.overlays.remove(position);
            store.base.absorb(overlay.layer, true);
        })
    }

    /// Discards the overlay of a mutation.
    pub fn rollback(&mut self, mutation: MutationId) -> SlotSet {
        let Some(position) = self.overlay_position(mutation) else {
            tracing::debug!(%mutation, "rollback of an unknown optimistic layer");
            return SlotSet::new();
        };

        let affected = self.affected_slots(&self.overlays[position].layer);
        self.observe(affected, |store| {
            store.overlays.remove(position);
        })
    }

    /// Every `(record, key)` stored in the base layer.
    pub(crate) fn base_slots(&self) -> Vec<FieldSlot> {
        self.base
            .slots()
            .map(|(record, key)| FieldSlot::new(record.clone(), key.clone()))
            .collect()
    }

    /// Drops one base slot without reporting it. Returns true when its record went away.
    pub(crate) fn evict(&mut self, slot: &FieldSlot) -> bool {
        self.base.remove_field(&slot.record, &slot.key)
    }

    pub(crate) fn resolve_at(&self, target: LayerTarget, record: &RecordId, key: &FieldKey) -> Option<&FieldValue> {
        self.resolve(record, key, self.depth_of(target))
    }

    pub(crate) fn exists_at(&self, target: LayerTarget, record: &RecordId) -> bool {
        self.exists_below(record, self.depth_of(target))
    }

    pub(crate) fn fields_at(&self, target: LayerTarget, record: &RecordId) -> IndexSet<FieldKey> {
        self.fields_below(record, self.depth_of(target))
    }

    /// Number of overlays visible from a target. An overlay that does not exist yet will be
    /// pushed on top, so it sees everything.
    fn depth_of(&self, target: LayerTarget) -> usize {
        match target {
            LayerTarget::Base => 0,
            LayerTarget::Optimistic(mutation) => self
                .overlay_position(mutation)
                .map_or(self.overlays.len(), |position| position + 1),
        }
    }

    fn resolve(&self, record: &RecordId, key: &FieldKey, depth: usize) -> Option<&FieldValue> {
        for overlay in self.overlays[..depth].iter().rev() {
            match overlay.layer.lookup(record, key) {
                Lookup::Found(value) => return Some(value),
                Lookup::Masked => return None,
                Lookup::NotHere => {}
            }
        }

        match self.base.lookup(record, key) {
            Lookup::Found(value) => Some(value),
            Lookup::Masked | Lookup::NotHere => None,
        }
    }

    fn exists_below(&self, record: &RecordId, depth: usize) -> bool {
        self.overlays[..depth]
            .iter()
            .rev()
            .find_map(|overlay| overlay.layer.existence(record))
            .or_else(|| self.base.existence(record))
            .unwrap_or(false)
    }

    fn fields_below(&self, record: &RecordId, depth: usize) -> IndexSet<FieldKey> {
        let mut keys = IndexSet::new();
        let layers = std::iter::once(&self.base).chain(self.overlays[..depth].iter().map(|overlay| &overlay.layer));

        for layer in layers {
            let Some(entry) = layer.records.get(record) else {
                continue;
            };

            if entry.masks_below {
                keys.clear();
            }
            keys.extend(entry.fields.keys().cloned());
        }

        keys
    }

    fn overlay_position(&self, mutation: MutationId) -> Option<usize> {
        self.overlays.iter().position(|overlay| overlay.id == mutation)
    }

    fn apply_layer(&mut self, target: LayerTarget, scratch: Layer) -> SlotSet {
        if scratch.is_empty() {
            return SlotSet::new();
        }

        let affected = self.affected_slots(&scratch);

        self.observe(affected, |store| match target {
            LayerTarget::Base => store.base.absorb(scratch, true),
            LayerTarget::Optimistic(mutation) => {
                let position = match store.overlay_position(mutation) {
                    Some(position) => position,
                    None => {
                        store.overlays.push(Overlay {
                            id: mutation,
                            layer: Layer::default(),
                        });
                        store.overlays.len() - 1
                    }
                };

                store.overlays[position].layer.absorb(scratch, false);
            }
        })
    }

    /// The slots a layer may change once merged: its own fields and every visible field of the
    /// records it deletes.
    fn affected_slots(&self, layer: &Layer) -> Vec<FieldSlot> {
        let mut slots = layer
            .slots()
            .map(|(record, key)| FieldSlot::new(record.clone(), key.clone()))
            .collect::<IndexSet<_>>();

        for record in layer.masked_records() {
            slots.extend(
                self.fields_of(record)
                    .into_iter()
                    .map(|key| FieldSlot::new(record.clone(), key)),
            );
        }

        slots.into_iter().collect()
    }

    /// Runs `change` and reports which of `slots` now resolve to a different value.
    fn observe(&mut self, slots: Vec<FieldSlot>, change: impl FnOnce(&mut Self)) -> SlotSet {
        let before = slots
            .iter()
            .map(|slot| self.get(&slot.record, &slot.key).cloned())
            .collect::<Vec<_>>();

        change(self);

        slots
            .into_iter()
            .zip(before)
            .filter(|(slot, before)| self.get(&slot.record, &slot.key) != before.as_ref())
            .map(|(slot, _)| slot)
            .collect()
    }
}
