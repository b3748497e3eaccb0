//! Normalizes a response payload into a transaction, following the selection that fetched it.

mod operations;

use serde_json::{Map, Value};

use crate::{
    artifact::{FieldSelection, SelectionSet, UpdateMode},
    error::CacheError,
    identity::{Identifier, RecordId},
    key::{resolve_filters, selection_key, FieldKey, FieldSlot, KeyMode, SlotSet, Variables, TYPENAME},
    lists::{ListHandle, ListRegistry},
    read::MAX_SELECTION_DEPTH,
    scalars::ScalarRegistry,
    store::{FieldValue, Transaction},
};

const PAGE_INFO: &str = "pageInfo";
const EDGES: &str = "edges";

#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub selection: &'a SelectionSet,
    /// The `data` of a GraphQL response, or the object to write under `parent`.
    pub data: &'a Value,
    pub parent: &'a RecordId,
    pub variables: &'a Variables,
    /// Update modes honored by this write. List fields declaring another mode are replaced.
    pub apply_updates: &'a [UpdateMode],
}

impl<'a> WriteRequest<'a> {
    pub fn new(selection: &'a SelectionSet, data: &'a Value, parent: &'a RecordId, variables: &'a Variables) -> Self {
        WriteRequest {
            selection,
            data,
            parent,
            variables,
            apply_updates: &[],
        }
    }

    #[must_use]
    pub fn apply_updates(mut self, modes: &'a [UpdateMode]) -> Self {
        self.apply_updates = modes;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutput {
    /// Slots whose visible value changed.
    pub touched: SlotSet,
}

pub(crate) struct WriteContext<'a> {
    pub identifier: &'a Identifier,
    pub scalars: &'a ScalarRegistry,
    pub lists: &'a ListRegistry,
}

/// Side effects of a write that live outside of the store, published once the write is applied.
#[derive(Debug, Default)]
pub(crate) struct WriteEffects {
    pub lists: Vec<ListHandle>,
    pub deleted: Vec<RecordId>,
}

pub(crate) fn write(
    transaction: &mut Transaction<'_>,
    context: &WriteContext<'_>,
    request: WriteRequest<'_>,
) -> Result<WriteEffects, CacheError> {
    let Value::Object(data) = request.data else {
        return Err(CacheError::MalformedPayload {
            path: String::new(),
            reason: "expected an object",
        });
    };

    let mut writer = Writer {
        transaction,
        context,
        variables: request.variables,
        apply_updates: request.apply_updates,
        effects: WriteEffects::default(),
        path: Vec::new(),
    };

    writer.write_object(request.parent, request.selection, data, 0)?;

    Ok(writer.effects)
}

struct Writer<'w, 's> {
    transaction: &'w mut Transaction<'s>,
    context: &'w WriteContext<'w>,
    variables: &'w Variables,
    apply_updates: &'w [UpdateMode],
    effects: WriteEffects,
    path: Vec<String>,
}

impl Writer<'_, '_> {
    fn write_object(
        &mut self,
        record: &RecordId,
        selection: &SelectionSet,
        data: &Map<String, Value>,
        depth: usize,
    ) -> Result<(), CacheError> {
        if depth > MAX_SELECTION_DEPTH {
            return Err(CacheError::SelectionTooDeep {
                depth: MAX_SELECTION_DEPTH,
            });
        }

        let typename = data.get(TYPENAME).and_then(Value::as_str);
        if let Some(typename) = typename {
            self.transaction
                .set(record, &FieldKey::typename(), FieldValue::Scalar(Value::from(typename)))?;
        }

        let (fields, matched) = selection.fields_for(typename);
        if !matched {
            tracing::debug!(%record, typename, "no selection branch for payload type, writing shared fields only");
        }

        for (response_key, field) in fields {
            let Some(value) = data.get(response_key) else {
                continue;
            };

            let Some(key) = selection_key(field, self.variables, KeyMode::Write)? else {
                continue;
            };

            self.path.push(response_key.to_owned());
            self.write_field(record, key, field, value, depth)?;

            for operation in &field.operations {
                self.apply_operation(operation, field, value)?;
            }
            self.path.pop();
        }

        Ok(())
    }

    fn write_field(
        &mut self,
        record: &RecordId,
        key: FieldKey,
        field: &FieldSelection,
        value: &Value,
        depth: usize,
    ) -> Result<(), CacheError> {
        match (&field.selection, value) {
            (Some(selection), Value::Array(items)) => {
                self.write_list(record, &key, field, selection, items, depth)?;
                self.register_list(record, &key, field, None);
            }
            (Some(selection), Value::Object(object)) => {
                let child = self.child_id(field, object, || RecordId::embedded(record, &key));

                match self.applied_mode(field) {
                    mode @ (UpdateMode::Append | UpdateMode::Prepend) if field.field_name == PAGE_INFO => {
                        let object = self.merge_page_info(&child, object, mode);
                        self.write_object(&child, selection, &object, depth + 1)?;
                    }
                    _ => self.write_object(&child, selection, object, depth + 1)?,
                }

                self.transaction.set(record, &key, FieldValue::Link(Some(child.clone())))?;
                self.register_list(record, &key, field, Some(&child));
            }
            (Some(_), Value::Null) => {
                // only a known single link becomes an empty link, anything else stays shapeless
                let null = match self.transaction.get(record, &key) {
                    Some(FieldValue::Link(_)) => FieldValue::Link(None),
                    _ => FieldValue::null(),
                };
                self.transaction.set(record, &key, null)?;
            }
            _ => {
                let value = self.context.scalars.unmarshal(&field.type_name, value.clone());
                self.transaction.set(record, &key, FieldValue::Scalar(value))?;
            }
        }

        Ok(())
    }

    fn write_list(
        &mut self,
        record: &RecordId,
        key: &FieldKey,
        field: &FieldSelection,
        selection: &SelectionSet,
        items: &[Value],
        depth: usize,
    ) -> Result<(), CacheError> {
        let mode = self.applied_mode(field);

        let existing = match mode {
            UpdateMode::Replace => Vec::new(),
            UpdateMode::Append | UpdateMode::Prepend => self
                .transaction
                .get(record, key)
                .and_then(FieldValue::as_link_list)
                .map(<[_]>::to_vec)
                .unwrap_or_default(),
        };

        // embedded items of a new page must not overwrite the ones of earlier pages
        let first_index = existing
            .iter()
            .flatten()
            .filter_map(|id| id.embedded_index(record, key))
            .max()
            .map_or(0, |index| index + 1);

        let mut page = Vec::with_capacity(items.len());

        for (position, item) in items.iter().enumerate() {
            self.path.push(position.to_string());

            let id = match item {
                Value::Null => None,
                Value::Object(object) => {
                    let child = self.child_id(field, object, || {
                        RecordId::embedded_item(record, key, first_index + position)
                    });
                    self.write_object(&child, selection, object, depth + 1)?;
                    Some(child)
                }
                _ => {
                    return Err(CacheError::MalformedPayload {
                        path: self.path.join("."),
                        reason: "expected an object or null in a list of objects",
                    })
                }
            };

            self.path.pop();
            page.push(id);
        }

        let ids = match mode {
            UpdateMode::Replace => page,
            UpdateMode::Append => existing.into_iter().chain(page).collect(),
            UpdateMode::Prepend => page.into_iter().chain(existing).collect(),
        };

        tracing::trace!(%record, %key, %mode, len = ids.len(), "writing list");
        self.transaction.set(record, key, FieldValue::LinkList(ids))
    }

    /// Keeps the cursor of the end a new page does not extend.
    fn merge_page_info(&self, record: &RecordId, incoming: &Map<String, Value>, mode: UpdateMode) -> Map<String, Value> {
        let kept: &[&str] = match mode {
            UpdateMode::Append => &["startCursor", "hasPreviousPage"],
            UpdateMode::Prepend => &["endCursor", "hasNextPage"],
            UpdateMode::Replace => &[],
        };

        incoming
            .iter()
            .filter(|(name, _)| {
                !(kept.contains(&name.as_str()) && self.transaction.get(record, &FieldKey::new(name.as_str())).is_some())
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn register_list(&mut self, record: &RecordId, key: &FieldKey, field: &FieldSelection, child: Option<&RecordId>) {
        let Some(directive) = &field.list else {
            return;
        };

        let (items, selection) = match (directive.connection, child) {
            (false, _) => (
                FieldSlot::new(record.clone(), key.clone()),
                field.selection.clone(),
            ),
            (true, Some(connection)) => {
                let edges = field
                    .selection
                    .as_ref()
                    .and_then(|selection| selection.fields.values().find(|field| field.field_name == EDGES));

                let edges_key = edges
                    .and_then(|edges| selection_key(edges, self.variables, KeyMode::Read).ok().flatten())
                    .unwrap_or_else(|| FieldKey::new(EDGES));

                (
                    FieldSlot::new(connection.clone(), edges_key),
                    edges.and_then(|edges| edges.selection.clone()),
                )
            }
            (true, None) => return,
        };

        self.effects.lists.push(ListHandle {
            name: directive.name.clone(),
            parent: record.clone(),
            key: key.clone(),
            items,
            connection: directive.connection,
            type_name: directive.type_name.clone(),
            selection,
            filters: resolve_filters(&field.arguments, self.variables),
        });
    }

    fn child_id(
        &self,
        field: &FieldSelection,
        object: &Map<String, Value>,
        embedded: impl FnOnce() -> RecordId,
    ) -> RecordId {
        let type_name = object
            .get(TYPENAME)
            .and_then(Value::as_str)
            .unwrap_or(&field.type_name);

        self.context
            .identifier
            .identify(type_name, object)
            .unwrap_or_else(embedded)
    }

    fn applied_mode(&self, field: &FieldSelection) -> UpdateMode {
        self.apply_updates
            .iter()
            .copied()
            .find(|mode| field.update.contains(mode))
            .unwrap_or(UpdateMode::Replace)
    }
}
