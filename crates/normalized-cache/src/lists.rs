//! Registry of the named lists (`@list(name:)`) mutations can target.

use std::{collections::HashMap, sync::Arc};

use indexmap::{IndexMap, IndexSet};

use crate::{
    artifact::SelectionSet,
    identity::RecordId,
    key::{FieldKey, FieldSlot, Variables},
};

/// One instance of a named list: the field it lives in and where its items are linked.
#[derive(Debug, Clone)]
pub struct ListHandle {
    pub name: String,
    /// The record holding the annotated field.
    pub parent: RecordId,
    /// The annotated field.
    pub key: FieldKey,
    /// The link list holding the items, `edges` of the connection record for connections.
    pub items: FieldSlot,
    pub connection: bool,
    /// The type of the list entries.
    pub type_name: String,
    pub selection: Option<Arc<SelectionSet>>,
    /// The arguments the list was fetched with, pagination aside.
    pub filters: Variables,
}

impl ListHandle {
    fn location(&self) -> FieldSlot {
        FieldSlot::new(self.parent.clone(), self.key.clone())
    }
}

/// List handles keyed by the field they were registered for.
///
/// Handles are evicted when the record they hang off is deleted or collected.
#[derive(Debug, Default)]
pub struct ListRegistry {
    handles: IndexMap<FieldSlot, ListHandle>,
    by_name: HashMap<String, IndexSet<FieldSlot>>,
}

impl ListRegistry {
    /// Registers a handle, replacing the one previously registered for the same field.
    pub fn register(&mut self, handle: ListHandle) {
        let location = handle.location();

        let renamed = self
            .handles
            .get(&location)
            .map(|previous| previous.name.clone())
            .filter(|previous| previous != &handle.name);

        if let Some(previous) = renamed {
            self.unindex(&previous, &location);
        }

        self.by_name
            .entry(handle.name.clone())
            .or_default()
            .insert(location.clone());
        self.handles.insert(location, handle);
    }

    pub fn get(&self, location: &FieldSlot) -> Option<&ListHandle> {
        self.handles.get(location)
    }

    pub fn by_name<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ListHandle> + 'a {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|location| self.handles.get(location))
    }

    /// Drops every handle attached to `record`, either as the holder of the list field or as
    /// the connection record holding the items.
    pub fn evict_record(&mut self, record: &RecordId) -> usize {
        let evicted = self
            .handles
            .iter()
            .filter(|(_, handle)| &handle.parent == record || &handle.items.record == record)
            .map(|(location, handle)| (location.clone(), handle.name.clone()))
            .collect::<Vec<_>>();

        for (location, name) in &evicted {
            self.handles.shift_remove(location);
            self.unindex(name, location);
        }

        if !evicted.is_empty() {
            tracing::debug!(%record, count = evicted.len(), "evicted list handles");
        }

        evicted.len()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn unindex(&mut self, name: &str, location: &FieldSlot) {
        if let Some(locations) = self.by_name.get_mut(name) {
            locations.shift_remove(location);
            if locations.is_empty() {
                self.by_name.remove(name);
            }
        }
    }
}
