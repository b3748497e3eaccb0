use indexmap::IndexMap;

use super::FieldValue;
use crate::{identity::RecordId, key::FieldKey};

/// One level of the store: the base, an optimistic overlay or the scratch space of a write.
#[derive(Debug, Default, Clone)]
pub(crate) struct Layer {
    pub(super) records: IndexMap<RecordId, LayerRecord>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct LayerRecord {
    /// The record was deleted at this level, nothing below is visible anymore.
    pub(super) masks_below: bool,
    pub(super) fields: IndexMap<FieldKey, FieldValue>,
}

pub(super) enum Lookup<'a> {
    Found(&'a FieldValue),
    Masked,
    NotHere,
}

impl Layer {
    pub(super) fn lookup(&self, record: &RecordId, key: &FieldKey) -> Lookup<'_> {
        let Some(entry) = self.records.get(record) else {
            return Lookup::NotHere;
        };

        match entry.fields.get(key) {
            Some(value) => Lookup::Found(value),
            None if entry.masks_below => Lookup::Masked,
            None => Lookup::NotHere,
        }
    }

    /// `Some(exists)` when this layer decides whether the record exists.
    pub(super) fn existence(&self, record: &RecordId) -> Option<bool> {
        let entry = self.records.get(record)?;

        if !entry.fields.is_empty() {
            Some(true)
        } else if entry.masks_below {
            Some(false)
        } else {
            None
        }
    }

    pub(super) fn set(&mut self, record: RecordId, key: FieldKey, value: FieldValue) {
        self.records.entry(record).or_default().fields.insert(key, value);
    }

    pub(super) fn mask(&mut self, record: RecordId) {
        let entry = self.records.entry(record).or_default();
        entry.masks_below = true;
        entry.fields.clear();
    }

    pub(super) fn slots(&self) -> impl Iterator<Item = (&RecordId, &FieldKey)> + '_ {
        self.records
            .iter()
            .flat_map(|(record, entry)| entry.fields.keys().map(move |key| (record, key)))
    }

    pub(super) fn masked_records(&self) -> impl Iterator<Item = &RecordId> + '_ {
        self.records
            .iter()
            .filter(|(_, entry)| entry.masks_below)
            .map(|(record, _)| record)
    }

    pub(super) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Folds `upper` into this layer. The base has nothing below it, so masks are resolved
    /// there instead of being kept.
    pub(super) fn absorb(&mut self, upper: Layer, is_base: bool) {
        for (record, entry) in upper.records {
            if !entry.masks_below {
                self.records.entry(record).or_default().fields.extend(entry.fields);
            } else if !is_base {
                self.records.insert(record, entry);
            } else if entry.fields.is_empty() {
                self.records.shift_remove(&record);
            } else {
                self.records.insert(
                    record,
                    LayerRecord {
                        masks_below: false,
                        fields: entry.fields,
                    },
                );
            }
        }
    }

    /// Removes one field, dropping the record when it has no field left.
    /// Returns true when the record went away.
    pub(super) fn remove_field(&mut self, record: &RecordId, key: &FieldKey) -> bool {
        let Some(entry) = self.records.get_mut(record) else {
            return false;
        };

        entry.fields.shift_remove(key);

        if entry.fields.is_empty() && !entry.masks_below {
            self.records.shift_remove(record);
            return true;
        }

        false
    }
}
