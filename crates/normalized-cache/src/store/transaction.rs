use indexmap::IndexSet;

use super::{
    layer::{Layer, Lookup},
    value::check_shape,
    FieldValue, LayerTarget, RecordStore,
};
use crate::{
    error::CacheError,
    identity::RecordId,
    key::{FieldKey, FieldSlot, SlotSet},
};

/// A write in progress.
///
/// Changes accumulate in a scratch layer sitting right above the target layer and only reach the
/// store through [`RecordStore::apply`], so a failed write leaves no trace.
pub struct Transaction<'a> {
    store: &'a RecordStore,
    target: LayerTarget,
    scratch: Layer,
    written: SlotSet,
}

/// The outcome of a finished transaction, ready to be applied.
#[derive(Debug)]
pub struct StagedWrite {
    target: LayerTarget,
    scratch: Layer,
    written: SlotSet,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(store: &'a RecordStore, target: LayerTarget) -> Self {
        Transaction {
            store,
            target,
            scratch: Layer::default(),
            written: SlotSet::new(),
        }
    }

    pub fn target(&self) -> LayerTarget {
        self.target
    }

    pub fn get(&self, record: &RecordId, key: &FieldKey) -> Option<&FieldValue> {
        match self.scratch.lookup(record, key) {
            Lookup::Found(value) => Some(value),
            Lookup::Masked => None,
            Lookup::NotHere => self.store.resolve_at(self.target, record, key),
        }
    }

    pub fn record_exists(&self, record: &RecordId) -> bool {
        self.scratch
            .existence(record)
            .unwrap_or_else(|| self.store.exists_at(self.target, record))
    }

    pub fn fields_of(&self, record: &RecordId) -> IndexSet<FieldKey> {
        let mut keys = match self.scratch.records.get(record) {
            Some(entry) if entry.masks_below => IndexSet::new(),
            _ => self.store.fields_at(self.target, record),
        };

        if let Some(entry) = self.scratch.records.get(record) {
            keys.extend(entry.fields.keys().cloned());
        }

        keys
    }

    pub fn set(&mut self, record: &RecordId, key: &FieldKey, value: FieldValue) -> Result<(), CacheError> {
        check_shape(record, key, self.get(record, key), &value)?;

        self.written.insert(FieldSlot::new(record.clone(), key.clone()));
        self.scratch.set(record.clone(), key.clone(), value);

        Ok(())
    }

    pub fn delete(&mut self, record: &RecordId) {
        self.scratch.mask(record.clone());
    }

    pub fn finish(self) -> StagedWrite {
        StagedWrite {
            target: self.target,
            scratch: self.scratch,
            written: self.written,
        }
    }
}

impl StagedWrite {
    /// Every slot the write assigned, changed or not.
    pub fn written(&self) -> &SlotSet {
        &self.written
    }

    pub(super) fn into_parts(self) -> (LayerTarget, Layer) {
        (self.target, self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn changes_are_invisible_until_applied() {
        let mut store = RecordStore::new();
        let user = RecordId::from("User:1");
        let name = FieldKey::new("name");

        store.set(&user, &name, json!("Alice")).unwrap();

        let mut transaction = store.transaction(LayerTarget::Base);
        transaction.set(&user, &name, FieldValue::Scalar(json!("Alicia"))).unwrap();
        transaction
            .set(&user, &FieldKey::new("age"), FieldValue::Scalar(json!(30)))
            .unwrap();
        assert_eq!(transaction.get(&user, &name), Some(&FieldValue::Scalar(json!("Alicia"))));
        assert_eq!(transaction.fields_of(&user).len(), 2);

        let staged = transaction.finish();
        assert_eq!(staged.written().len(), 2);
        assert_eq!(store.get(&user, &name), Some(&FieldValue::Scalar(json!("Alice"))));

        let touched = store.apply(staged);
        assert_eq!(touched.len(), 2);
        assert_eq!(store.get(&user, &name), Some(&FieldValue::Scalar(json!("Alicia"))));
    }

    #[test]
    fn deleted_then_recreated() {
        let mut store = RecordStore::new();
        let user = RecordId::from("User:1");

        store.set(&user, &FieldKey::new("name"), json!("Alice")).unwrap();

        let mut transaction = store.transaction(LayerTarget::Base);
        transaction.delete(&user);
        assert!(!transaction.record_exists(&user));

        transaction
            .set(&user, &FieldKey::new("age"), FieldValue::Scalar(json!(1)))
            .unwrap();
        assert!(transaction.record_exists(&user));
        assert_eq!(transaction.get(&user, &FieldKey::new("name")), None);

        let staged = transaction.finish();
        store.apply(staged);

        assert_eq!(store.fields_of(&user), IndexSet::<FieldKey>::from_iter([FieldKey::new("age")]));
    }
}
