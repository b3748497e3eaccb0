use std::collections::BTreeMap;

use super::{FieldValue, RecordStore};
use crate::{
    identity::RecordId,
    key::{FieldKey, SlotSet},
};

/// A JSON serializable dump of the base layer, used to hand state from a server render to a client.
pub type Snapshot = BTreeMap<RecordId, BTreeMap<FieldKey, FieldValue>>;

impl RecordStore {
    /// Dumps the base layer. Optimistic overlays are not part of the snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.base
            .records
            .iter()
            .filter(|(_, entry)| !entry.fields.is_empty())
            .map(|(record, entry)| {
                let fields = entry
                    .fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();

                (record.clone(), fields)
            })
            .collect()
    }

    /// Merges a snapshot into the base layer.
    ///
    /// Slots the store already knows keep their value: the snapshot only fills the gaps, so state
    /// produced locally survives a late hydration.
    pub fn hydrate(&mut self, snapshot: Snapshot) -> SlotSet {
        let mut scratch = super::Layer::default();

        for (record, fields) in snapshot {
            for (key, value) in fields {
                if matches!(self.base.lookup(&record, &key), super::Lookup::Found(_)) {
                    continue;
                }

                scratch.set(record.clone(), key, value);
            }
        }

        self.apply_layer(super::LayerTarget::Base, scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::store::{LayerTarget, MutationId};

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut store = RecordStore::new();
        let root = RecordId::root();
        let user = RecordId::from("User:1");

        store.link(&root, &FieldKey::new("viewer"), Some(user.clone())).unwrap();
        store.set(&user, &FieldKey::new("name"), json!("Alice")).unwrap();

        let json = serde_json::to_value(store.snapshot()).unwrap();

        insta::assert_json_snapshot!(json, @r###"
        {
          "User:1": {
            "name": {
              "scalar": "Alice"
            }
          },
          "_ROOT_": {
            "viewer": {
              "link": "User:1"
            }
          }
        }
        "###);

        let mut hydrated = RecordStore::new();
        let touched = hydrated.hydrate(serde_json::from_value(json).unwrap());

        assert_eq!(touched.len(), 2);
        assert_eq!(hydrated.snapshot(), store.snapshot());
    }

    #[test]
    fn hydrate_does_not_clobber() {
        let mut store = RecordStore::new();
        let user = RecordId::from("User:1");
        let mutation = MutationId::new(1);

        store.set(&user, &FieldKey::new("name"), json!("Local")).unwrap();
        store
            .write_field(
                LayerTarget::Optimistic(mutation),
                &user,
                &FieldKey::new("status"),
                FieldValue::Scalar(json!("optimistic")),
            )
            .unwrap();

        let snapshot: Snapshot = serde_json::from_value(json!({
            "User:1": {
                "name": {"scalar": "Server"},
                "status": {"scalar": "server"},
                "age": {"scalar": 40}
            }
        }))
        .unwrap();

        let touched = store.hydrate(snapshot);

        // status lands in the base but stays hidden by the overlay
        assert_eq!(touched.len(), 1);
        assert_eq!(store.get(&user, &FieldKey::new("name")), Some(&FieldValue::Scalar(json!("Local"))));
        assert_eq!(
            store.get(&user, &FieldKey::new("status")),
            Some(&FieldValue::Scalar(json!("optimistic")))
        );
        assert_eq!(store.get(&user, &FieldKey::new("age")), Some(&FieldValue::Scalar(json!(40))));
    }
}
