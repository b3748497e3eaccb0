//! Resolves a selection against the store.

use serde_json::{Map, Value};

use crate::{
    artifact::{FieldSelection, LoadingKind, LoadingSpec, SelectionSet},
    error::CacheError,
    identity::RecordId,
    key::{selection_key, FieldKey, FieldSlot, KeyMode, SlotSet, Variables},
    store::{FieldValue, RecordStore},
};

/// Selections nested deeper than this are rejected.
pub const MAX_SELECTION_DEPTH: usize = 128;

/// Rendered for fields in loading state when their loading spec has no explicit value.
pub const PENDING_PLACEHOLDER: &str = "__pending__";

#[derive(Debug, Clone, Copy)]
pub struct ReadRequest<'a> {
    pub selection: &'a SelectionSet,
    pub parent: &'a RecordId,
    pub variables: &'a Variables,
    /// Render placeholders for missing fields that declare a loading spec.
    pub loading: bool,
}

impl<'a> ReadRequest<'a> {
    pub fn new(selection: &'a SelectionSet, parent: &'a RecordId, variables: &'a Variables) -> Self {
        ReadRequest {
            selection,
            parent,
            variables,
            loading: false,
        }
    }

    #[must_use]
    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutput {
    /// `None` when nothing at all could be resolved.
    pub data: Option<Value>,
    /// Some requested value is missing from the cache.
    pub partial: bool,
    /// Some visited value was marked stale.
    pub stale: bool,
    /// Every slot the read depended on, including the missing ones.
    pub visited: SlotSet,
}

pub fn read(store: &RecordStore, request: ReadRequest<'_>) -> Result<ReadOutput, CacheError> {
    let mut reader = Reader {
        store,
        variables: request.variables,
        loading: request.loading,
        partial: false,
        visited: SlotSet::new(),
    };

    let object = reader.read_object(request.parent, request.selection, 0)?;

    tracing::trace!(
        parent = %request.parent,
        partial = reader.partial,
        visited = reader.visited.len(),
        "read selection"
    );

    Ok(ReadOutput {
        data: (!object.is_empty()).then_some(Value::Object(object)),
        partial: reader.partial,
        stale: false,
        visited: reader.visited,
    })
}

struct Reader<'a> {
    store: &'a RecordStore,
    variables: &'a Variables,
    loading: bool,
    partial: bool,
    visited: SlotSet,
}

impl Reader<'_> {
    fn read_object(
        &mut self,
        record: &RecordId,
        selection: &SelectionSet,
        depth: usize,
    ) -> Result<Map<String, Value>, CacheError> {
        if depth > MAX_SELECTION_DEPTH {
            return Err(CacheError::SelectionTooDeep {
                depth: MAX_SELECTION_DEPTH,
            });
        }

        let typename = match selection.abstract_fields {
            Some(_) => {
                let key = FieldKey::typename();
                self.visit(record, &key);
                self.store
                    .get(record, &key)
                    .and_then(FieldValue::as_scalar)
                    .and_then(Value::as_str)
            }
            None => None,
        };

        let (fields, matched) = selection.fields_for(typename);
        if !matched {
            // either no __typename or a type outside of every branch
            self.partial = true;
        }

        let mut object = Map::with_capacity(fields.len());

        for (response_key, field) in fields {
            let Some(key) = selection_key(field, self.variables, KeyMode::Read)? else {
                self.partial = true;
                continue;
            };

            self.visit(record, &key);

            let value = match self.store.get(record, &key) {
                None => match self.missing(field, depth)? {
                    Some(placeholder) => placeholder,
                    None => continue,
                },
                Some(FieldValue::Scalar(value)) => value.clone(),
                Some(FieldValue::Link(None)) => Value::Null,
                Some(FieldValue::Link(Some(target))) => self.read_link(target, field, depth)?,
                Some(FieldValue::LinkList(targets)) => {
                    let mut items = Vec::with_capacity(targets.len());
                    for target in targets {
                        items.push(match target {
                            Some(target) => self.read_link(target, field, depth)?,
                            None => Value::Null,
                        });
                    }
                    Value::Array(items)
                }
            };

            object.insert(response_key.to_owned(), value);
        }

        Ok(object)
    }

    fn read_link(&mut self, target: &RecordId, field: &FieldSelection, depth: usize) -> Result<Value, CacheError> {
        let Some(selection) = &field.selection else {
            return Ok(Value::Null);
        };

        if !self.store.record_exists(target) {
            tracing::trace!(%target, "dangling link");
            // the slots are still visited so that restoring the record is noticed
            self.read_object(target, selection, depth + 1)?;
            self.partial = true;
            return Ok(Value::Null);
        }

        Ok(Value::Object(self.read_object(target, selection, depth + 1)?))
    }

    /// Placeholder for a missing field, or `None` (and partial data) without one.
    fn missing(&mut self, field: &FieldSelection, depth: usize) -> Result<Option<Value>, CacheError> {
        match (&field.loading, self.loading) {
            (Some(loading), true) => Ok(Some(self.placeholder(field, loading, depth)?)),
            _ => {
                self.partial = true;
                Ok(None)
            }
        }
    }

    fn placeholder(&mut self, field: &FieldSelection, loading: &LoadingSpec, depth: usize) -> Result<Value, CacheError> {
        let single = match (loading.kind, &field.selection) {
            (LoadingKind::Continue, Some(selection)) => Value::Object(self.placeholder_object(selection, depth + 1)?),
            _ => loading.value.clone().unwrap_or_else(pending_value),
        };

        let Some(list) = loading.list else {
            return Ok(single);
        };

        let mut value = single;
        for _ in 0..list.depth.max(1) {
            value = Value::Array(vec![value; list.count as usize]);
        }

        Ok(value)
    }

    fn placeholder_object(&mut self, selection: &SelectionSet, depth: usize) -> Result<Map<String, Value>, CacheError> {
        if depth > MAX_SELECTION_DEPTH {
            return Err(CacheError::SelectionTooDeep {
                depth: MAX_SELECTION_DEPTH,
            });
        }

        let mut object = Map::new();

        for (response_key, field) in &selection.fields {
            if let Some(loading) = &field.loading {
                let value = self.placeholder(field, loading, depth)?;
                object.insert(response_key.clone(), value);
            }
        }

        Ok(object)
    }

    fn visit(&mut self, record: &RecordId, key: &FieldKey) {
        self.visited.insert(FieldSlot::new(record.clone(), key.clone()));
    }
}

fn pending_value() -> Value {
    Value::String(PENDING_PLACEHOLDER.to_owned())
}
