//! Mutation side effects on named lists: insert, remove, toggle, and record deletion.

use serde_json::Value;

use cache_config::{ListPosition, ListTarget};

use super::Writer;
use crate::{
    artifact::{Argument, FieldSelection, ListCondition, ListOperation, OperationAction, ParentId},
    error::CacheError,
    identity::RecordId,
    key::{resolve_argument, selection_key, FieldKey, KeyMode, Resolved, TYPENAME},
    lists::ListHandle,
    store::FieldValue,
};

const NODE: &str = "node";
const CURSOR: &str = "cursor";

impl Writer<'_, '_> {
    pub(super) fn apply_operation(
        &mut self,
        operation: &ListOperation,
        field: &FieldSelection,
        value: &Value,
    ) -> Result<(), CacheError> {
        if operation.action == OperationAction::Delete {
            let type_name = operation.type_name.as_deref().unwrap_or(&field.type_name);

            for value in entries(value) {
                match self.context.identifier.identify_key_value(type_name, value) {
                    Some(record) => {
                        tracing::debug!(%record, "deleting record");
                        self.transaction.delete(&record);
                        self.effects.deleted.push(record);
                    }
                    None => tracing::debug!(type_name, "cannot identify the record to delete"),
                }
            }

            return Ok(());
        }

        let Some(name) = operation.list.as_deref() else {
            tracing::debug!(action = %operation.action, "list operation without a list name");
            return Ok(());
        };

        let records = entries(value)
            .filter_map(|value| {
                let object = value.as_object()?;
                let type_name = object
                    .get(TYPENAME)
                    .and_then(Value::as_str)
                    .or(operation.type_name.as_deref())
                    .unwrap_or(&field.type_name);

                self.context.identifier.identify(type_name, object)
            })
            .collect::<Vec<_>>();

        if records.is_empty() {
            return Ok(());
        }

        let lists = self.matching_lists(name, operation);
        if lists.is_empty() {
            tracing::debug!(list = name, "no registered list matches the operation");
        }

        let position = operation
            .position
            .unwrap_or(self.context.identifier.config().default_list_position);

        for list in &lists {
            for record in &records {
                match operation.action {
                    OperationAction::Insert => self.insert(list, record, position)?,
                    OperationAction::Remove => self.remove(list, record)?,
                    OperationAction::Toggle => {
                        if self.position_in(list, record).is_some() {
                            self.remove(list, record)?;
                        } else {
                            self.insert(list, record, position)?;
                        }
                    }
                    OperationAction::Delete => {}
                }
            }
        }

        Ok(())
    }

    /// The instances of the named list an operation applies to.
    ///
    /// Without an explicit parent, lists rooted at the root record are preferred and every
    /// instance is used when none is.
    fn matching_lists(&self, name: &str, operation: &ListOperation) -> Vec<ListHandle> {
        let mut candidates = self
            .context
            .lists
            .by_name(name)
            .filter(|handle| {
                !self
                    .effects
                    .lists
                    .iter()
                    .any(|staged| staged.parent == handle.parent && staged.key == handle.key)
            })
            .chain(self.effects.lists.iter().filter(|handle| handle.name == name))
            .filter(|handle| self.transaction.record_exists(&handle.parent))
            .filter(|handle| self.when_matches(operation.when.as_ref(), handle))
            .cloned()
            .collect::<Vec<_>>();

        let target = operation
            .target
            .unwrap_or(self.context.identifier.config().default_list_target);

        match (&operation.parent_id, target) {
            (Some(parent), _) => {
                let Some(parent) = self.parent_id(parent) else {
                    tracing::debug!(list = name, "the parent of the list operation could not be resolved");
                    return Vec::new();
                };
                candidates.retain(|handle| handle.parent == parent);
            }
            (None, ListTarget::All) => {}
            (None, ListTarget::Root) => {
                if candidates.iter().any(|handle| handle.parent.is_root()) {
                    candidates.retain(|handle| handle.parent.is_root());
                }
            }
        }

        candidates
    }

    fn parent_id(&self, parent: &ParentId) -> Option<RecordId> {
        match parent {
            ParentId::String(id) => Some(RecordId::new(id.as_str())),
            ParentId::Variable(name) => match self.variables.get(name)? {
                Value::String(id) => Some(RecordId::new(id.as_str())),
                Value::Null => None,
                other => Some(RecordId::new(other.to_string())),
            },
        }
    }

    /// Every `must` argument equals the one the list was fetched with and no `must_not` does.
    fn when_matches(&self, condition: Option<&ListCondition>, handle: &ListHandle) -> bool {
        let Some(condition) = condition else {
            return true;
        };

        let matches = |name: &String, argument: &Argument| match resolve_argument(argument, self.variables) {
            Resolved::Value(value) => handle.filters.get(name) == Some(&value),
            Resolved::Unset | Resolved::MissingRequired(_) => false,
        };

        condition.must.iter().all(|(name, argument)| matches(name, argument))
            && !condition.must_not.iter().any(|(name, argument)| matches(name, argument))
    }

    fn insert(&mut self, list: &ListHandle, record: &RecordId, position: ListPosition) -> Result<(), CacheError> {
        if self.position_in(list, record).is_some() {
            return Ok(());
        }

        let mut items = self.items(list);

        let entry = match list.connection {
            false => record.clone(),
            true => {
                let next = items
                    .iter()
                    .flatten()
                    .filter_map(|edge| edge.embedded_index(&list.items.record, &list.items.key))
                    .max()
                    .map_or(0, |index| index + 1);
                let edge = RecordId::embedded_item(&list.items.record, &list.items.key, next);

                self.transaction.set(
                    &edge,
                    &FieldKey::typename(),
                    FieldValue::Scalar(Value::String(format!("{}Edge", list.type_name))),
                )?;
                self.transaction
                    .set(&edge, &edge_key(list, NODE), FieldValue::Link(Some(record.clone())))?;
                self.transaction.set(&edge, &edge_key(list, CURSOR), FieldValue::null())?;

                edge
            }
        };

        match position {
            ListPosition::First => items.insert(0, Some(entry)),
            ListPosition::Last => items.push(Some(entry)),
        }

        tracing::trace!(list = %list.name, parent = %list.parent, %record, %position, "inserted into list");
        self.transaction
            .set(&list.items.record, &list.items.key, FieldValue::LinkList(items))
    }

    fn remove(&mut self, list: &ListHandle, record: &RecordId) -> Result<(), CacheError> {
        let Some(index) = self.position_in(list, record) else {
            return Ok(());
        };

        let mut items = self.items(list);
        items.remove(index);

        tracing::trace!(list = %list.name, parent = %list.parent, %record, "removed from list");
        self.transaction
            .set(&list.items.record, &list.items.key, FieldValue::LinkList(items))
    }

    /// Index of the entry holding `record`, the edge pointing at it for connections.
    fn position_in(&self, list: &ListHandle, record: &RecordId) -> Option<usize> {
        let node = edge_key(list, NODE);

        self.items(list).iter().position(|entry| match (entry, list.connection) {
            (Some(entry), false) => entry == record,
            (Some(edge), true) => self
                .transaction
                .get(edge, &node)
                .and_then(FieldValue::as_link)
                .flatten()
                .is_some_and(|target| target == record),
            (None, _) => false,
        })
    }

    fn items(&self, list: &ListHandle) -> Vec<Option<RecordId>> {
        self.transaction
            .get(&list.items.record, &list.items.key)
            .and_then(FieldValue::as_link_list)
            .map(<[_]>::to_vec)
            .unwrap_or_default()
    }
}

/// The key of a field of the edges of a connection, as selected by the list.
fn edge_key(list: &ListHandle, name: &str) -> FieldKey {
    list.selection
        .as_ref()
        .and_then(|selection| selection.fields.values().find(|field| field.field_name == name))
        .and_then(|field| selection_key(field, &list.filters, KeyMode::Read).ok().flatten())
        .unwrap_or_else(|| FieldKey::new(name))
}

fn entries(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Null => Box::new(std::iter::empty()),
        Value::Array(items) => Box::new(items.iter().filter(|item| !item.is_null())),
        value => Box::new(std::iter::once(value)),
    }
}
