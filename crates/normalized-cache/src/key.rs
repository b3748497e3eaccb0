use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::{artifact::Argument, error::CacheError, identity::RecordId, FieldSelection};

pub type Variables = Map<String, Value>;

/// Set of `(record, field key)` pairs, as visited by a read or touched by a write.
pub type SlotSet = IndexSet<FieldSlot>;

/// Arguments controlling the page being fetched. Paginated fields leave them out of their key so
/// that every page lands in the same slot.
pub const PAGINATION_ARGUMENTS: &[&str] = &["after", "before", "first", "last", "limit", "offset"];

pub const PAGINATED_MARKER: &str = "::paginated";

pub const TYPENAME: &str = "__typename";

/// Canonical address of a value inside a record: the field name and its resolved arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    pub fn new(key: impl Into<String>) -> Self {
        FieldKey(key.into())
    }

    pub fn typename() -> Self {
        FieldKey(TYPENAME.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The schema field this key was derived from.
    pub fn field_name(&self) -> &str {
        let end = self.0.find(['(', ':']).unwrap_or(self.0.len());

        &self.0[..end]
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(key: &str) -> Self {
        FieldKey(key.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldSlot {
    pub record: RecordId,
    pub key: FieldKey,
}

impl FieldSlot {
    pub fn new(record: impl Into<RecordId>, key: impl Into<FieldKey>) -> Self {
        FieldSlot {
            record: record.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for FieldSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.record, self.key)
    }
}

/// Whether a key is computed to read or to write a value.
///
/// Writes need a concrete key, reads tolerate an unresolvable one and report partial data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Read,
    Write,
}

pub(crate) enum Resolved {
    Value(Value),
    Unset,
    MissingRequired(String),
}

/// Computes the key of `name` called with `arguments`.
///
/// Returns `Ok(None)` when a required variable is missing while reading.
pub fn field_key(
    name: &str,
    arguments: &IndexMap<String, Argument>,
    variables: &Variables,
    mode: KeyMode,
) -> Result<Option<FieldKey>, CacheError> {
    encode(name, arguments, variables, mode, false)
}

pub(crate) fn selection_key(
    field: &FieldSelection,
    variables: &Variables,
    mode: KeyMode,
) -> Result<Option<FieldKey>, CacheError> {
    encode(&field.field_name, &field.arguments, variables, mode, field.paginated)
}

fn encode(
    name: &str,
    arguments: &IndexMap<String, Argument>,
    variables: &Variables,
    mode: KeyMode,
    paginated: bool,
) -> Result<Option<FieldKey>, CacheError> {
    let mut resolved = Vec::with_capacity(arguments.len());

    for (argument_name, argument) in arguments {
        if paginated && PAGINATION_ARGUMENTS.contains(&argument_name.as_str()) {
            continue;
        }

        match resolve_argument(argument, variables) {
            Resolved::Value(value) => resolved.push((argument_name.as_str(), value)),
            Resolved::Unset => {}
            Resolved::MissingRequired(variable) => {
                return match mode {
                    KeyMode::Read => Ok(None),
                    KeyMode::Write => Err(CacheError::MissingVariable { name: variable }),
                };
            }
        }
    }

    resolved.sort_unstable_by(|(left, _), (right, _)| left.cmp(right));

    let mut key = String::from(name);

    if !resolved.is_empty() {
        let arguments = resolved
            .into_iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>();

        key.push('(');
        key.push_str(&arguments.join(", "));
        key.push(')');
    }

    if paginated {
        key.push_str(PAGINATED_MARKER);
    }

    Ok(Some(FieldKey(key)))
}

/// Resolves the arguments a list was fetched with, skipping pagination arguments and anything
/// that cannot be resolved.
pub(crate) fn resolve_filters(arguments: &IndexMap<String, Argument>, variables: &Variables) -> Variables {
    arguments
        .iter()
        .filter(|(name, _)| !PAGINATION_ARGUMENTS.contains(&name.as_str()))
        .filter_map(|(name, argument)| match resolve_argument(argument, variables) {
            Resolved::Value(value) => Some((name.clone(), value)),
            Resolved::Unset | Resolved::MissingRequired(_) => None,
        })
        .collect()
}

pub(crate) fn resolve_argument(argument: &Argument, variables: &Variables) -> Resolved {
    match argument {
        Argument::Literal { value } => Resolved::Value(canonicalize(value.clone())),
        Argument::Variable { name, required } => match variables.get(name) {
            Some(value) => Resolved::Value(canonicalize(value.clone())),
            None if *required => Resolved::MissingRequired(name.clone()),
            None => Resolved::Unset,
        },
        Argument::Object { fields } => {
            let mut object = Vec::with_capacity(fields.len());

            for (name, field) in fields {
                match resolve_argument(field, variables) {
                    Resolved::Value(value) => object.push((name.clone(), value)),
                    Resolved::Unset => {}
                    missing @ Resolved::MissingRequired(_) => return missing,
                }
            }

            object.sort_unstable_by(|(left, _), (right, _)| left.cmp(right));

            Resolved::Value(Value::Object(object.into_iter().collect()))
        }
        Argument::List { items } => {
            let mut list = Vec::with_capacity(items.len());

            for item in items {
                match resolve_argument(item, variables) {
                    Resolved::Value(value) => list.push(value),
                    Resolved::Unset => {}
                    missing @ Resolved::MissingRequired(_) => return missing,
                }
            }

            Resolved::Value(Value::Array(list))
        }
    }
}

/// Sorts object keys recursively so equal values always print the same.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries = object
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<Vec<_>>();

            entries.sort_unstable_by(|(left, _), (right, _)| left.cmp(right));

            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn literal(value: Value) -> Argument {
        Argument::Literal { value }
    }

    fn variable(name: &str, required: bool) -> Argument {
        Argument::Variable {
            name: name.into(),
            required,
        }
    }

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => Variables::new(),
        }
    }

    fn key(name: &str, arguments: &[(&str, Argument)], variables: &Variables) -> Option<String> {
        let arguments = arguments
            .iter()
            .map(|(name, argument)| (name.to_string(), argument.clone()))
            .collect();

        field_key(name, &arguments, variables, KeyMode::Write)
            .unwrap()
            .map(|key| key.as_str().to_owned())
    }

    #[test]
    fn bare_field() {
        assert_eq!(key("firstName", &[], &Variables::new()).as_deref(), Some("firstName"));
    }

    #[test]
    fn stable_keys() {
        let variables = Variables::new();
        let first = key("users", &[("stringValue", literal(json!("foo")))], &variables);
        let second = key("users", &[("stringValue", literal(json!("foo")))], &variables);
        let other = key("users", &[("stringValue", literal(json!("bar")))], &variables);

        assert_eq!(first.as_deref(), Some(r#"users(stringValue: "foo")"#));
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn argument_order_does_not_matter() {
        let variables = vars(json!({"limit": 10}));

        let forward = key(
            "users",
            &[("filter", literal(json!("a"))), ("limit", variable("limit", false))],
            &variables,
        );
        let backward = key(
            "users",
            &[("limit", variable("limit", false)), ("filter", literal(json!("a")))],
            &variables,
        );

        assert_eq!(forward.as_deref(), Some(r#"users(filter: "a", limit: 10)"#));
        assert_eq!(forward, backward);
    }

    #[test]
    fn unset_optional_variables_are_omitted() {
        let with_unset = key("users", &[("filter", variable("filter", false))], &Variables::new());

        assert_eq!(with_unset.as_deref(), Some("users"));
    }

    #[test]
    fn nested_objects_are_canonical() {
        let variables = vars(json!({"where": {"z": 1, "a": {"y": true, "b": null}}}));

        let key = key("users", &[("where", variable("where", true))], &variables);

        assert_eq!(key.as_deref(), Some(r#"users(where: {"a":{"b":null,"y":true},"z":1})"#));
    }

    #[test]
    fn object_arguments_drop_unset_entries() {
        let argument = Argument::Object {
            fields: [
                ("name".to_string(), variable("name", false)),
                ("age".to_string(), literal(json!(3))),
            ]
            .into_iter()
            .collect(),
        };

        let key = key("users", &[("filter", argument)], &Variables::new());

        assert_eq!(key.as_deref(), Some(r#"users(filter: {"age":3})"#));
    }

    #[test]
    fn missing_required_variable() {
        let arguments = [("id".to_string(), variable("id", true))].into_iter().collect();

        assert_eq!(
            field_key("user", &arguments, &Variables::new(), KeyMode::Write),
            Err(CacheError::MissingVariable { name: "id".into() })
        );
        assert_eq!(
            field_key("user", &arguments, &Variables::new(), KeyMode::Read),
            Ok(None)
        );
    }

    #[test]
    fn paginated_keys_ignore_page_arguments() {
        let arguments: IndexMap<String, Argument> = [
            ("first".to_string(), variable("first", false)),
            ("after".to_string(), variable("after", false)),
            ("filter".to_string(), literal(json!("x"))),
        ]
        .into_iter()
        .collect();

        let first_page = encode(
            "friends",
            &arguments,
            &vars(json!({"first": 2})),
            KeyMode::Write,
            true,
        )
        .unwrap();
        let second_page = encode(
            "friends",
            &arguments,
            &vars(json!({"first": 2, "after": "c2"})),
            KeyMode::Write,
            true,
        )
        .unwrap();

        assert_eq!(
            first_page.as_ref().map(FieldKey::as_str),
            Some(r#"friends(filter: "x")::paginated"#)
        );
        assert_eq!(first_page, second_page);
    }

    #[test]
    fn field_name_of_key() {
        assert_eq!(FieldKey::new(r#"users(filter: "a")"#).field_name(), "users");
        assert_eq!(FieldKey::new("friends::paginated").field_name(), "friends");
        assert_eq!(FieldKey::new("name").field_name(), "name");
    }
}
