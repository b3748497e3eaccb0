use crate::{identity::RecordId, key::FieldKey, store::ValueShape};

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Errors raised by cache reads and writes.
///
/// These are programming errors in the artifact or in the caller: surprises coming from the
/// server (unknown types, nulls, dangling references) never end up here and degrade to partial
/// data instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("missing value for the required variable ${name}")]
    MissingVariable { name: String },
    #[error("field {key} of record {record} holds a {existing} and cannot be overwritten with a {incoming}")]
    ShapeMismatch {
        record: RecordId,
        key: FieldKey,
        existing: ValueShape,
        incoming: ValueShape,
    },
    #[error("selection is nested deeper than {depth} levels")]
    SelectionTooDeep { depth: usize },
    #[error("malformed payload at {path}: {reason}")]
    MalformedPayload { path: String, reason: &'static str },
}
