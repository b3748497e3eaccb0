use std::{fmt, sync::Arc};

use cache_config::CacheConfig;
use serde_json::{Map, Value};

use crate::key::FieldKey;

/// Id of the record holding every top level field.
pub const ROOT_ID: &str = "_ROOT_";

const KEY_SEPARATOR: &str = "__";

/// Address of one record in the store.
///
/// Identified records look like `User:1`, objects without identity are embedded under their
/// parent (`User:1.address`, `User:1.friends[2]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn root() -> Self {
        RecordId(ROOT_ID.to_owned())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn embedded(parent: &RecordId, key: &FieldKey) -> Self {
        RecordId(format!("{parent}.{key}"))
    }

    pub(crate) fn embedded_item(parent: &RecordId, key: &FieldKey, index: usize) -> Self {
        RecordId(format!("{parent}.{key}[{index}]"))
    }

    /// The list index of an embedded item of `parent.key`, if this record is one.
    pub(crate) fn embedded_index(&self, parent: &RecordId, key: &FieldKey) -> Option<usize> {
        self.0
            .strip_prefix(parent.as_str())?
            .strip_prefix('.')?
            .strip_prefix(key.as_str())?
            .strip_prefix('[')?
            .strip_suffix(']')?
            .parse()
            .ok()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId(id.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId(id)
    }
}

/// Computes record ids from response objects according to the configured key fields.
#[derive(Debug, Clone)]
pub struct Identifier {
    config: Arc<CacheConfig>,
}

impl Identifier {
    pub fn new(config: Arc<CacheConfig>) -> Self {
        Identifier { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns `None` when one of the key fields is absent or null, the object is then embedded.
    pub fn identify(&self, type_name: &str, data: &Map<String, Value>) -> Option<RecordId> {
        let keys = self.config.keys_for(type_name);
        let mut parts = Vec::with_capacity(keys.len());

        for key in keys {
            parts.push(key_part(data.get(key)?)?);
        }

        Some(RecordId(format!("{type_name}:{}", parts.join(KEY_SEPARATOR))))
    }

    /// Identifies a record from either a full object or a bare key value, as found in
    /// payloads of delete operations.
    pub fn identify_key_value(&self, type_name: &str, value: &Value) -> Option<RecordId> {
        match value {
            Value::Object(data) => self.identify(type_name, data),
            value => {
                if self.config.keys_for(type_name).len() != 1 {
                    return None;
                }

                Some(RecordId(format!("{type_name}:{}", key_part(value)?)))
            }
        }
    }
}

fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        value => Some(value.to_string()),
    }
}
