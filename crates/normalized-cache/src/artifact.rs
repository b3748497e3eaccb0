//! The compiled description of a document, as produced by the artifact generator.
//!
//! Artifacts are immutable and shared by every cache operation on their document. They are
//! deserialized from the JSON emitted at build time.

use std::sync::Arc;

use cache_config::{ListPosition, ListTarget};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{key::Variables, read::ReadOutput};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub root_type: String,
    pub selection: Arc<SelectionSet>,
    #[serde(default)]
    pub input: IndexMap<String, InputField>,
    #[serde(default)]
    pub refetch: Option<RefetchSpec>,
    #[serde(default)]
    pub policy: CachePolicy,
    /// Whether bindings may render partial data for this document.
    #[serde(default)]
    pub partial: bool,
}

impl Artifact {
    /// Fills in the declared default of every variable the caller left out.
    pub fn variables_with_defaults(&self, variables: &Variables) -> Variables {
        let mut result = variables.clone();

        for (name, input) in &self.input {
            if let Some(default) = &input.default_value {
                if !result.contains_key(name) {
                    result.insert(name.clone(), default.clone());
                }
            }
        }

        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArtifactKind {
    Query,
    Mutation,
    Subscription,
    Fragment,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefetchSpec {
    /// Response keys leading from the document root to the paginated connection or list.
    pub path: Vec<String>,
    pub method: PaginationMethod,
    pub page_size: u32,
    #[serde(default)]
    pub direction: PaginationDirection,
    /// Offset the first page was fetched with, for offset pagination.
    #[serde(default)]
    pub start: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaginationMethod {
    Cursor,
    Offset,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaginationDirection {
    #[default]
    Forward,
    Backward,
    Both,
}

impl PaginationDirection {
    pub fn allows_forward(self) -> bool {
        matches!(self, PaginationDirection::Forward | PaginationDirection::Both)
    }

    pub fn allows_backward(self) -> bool {
        matches!(self, PaginationDirection::Backward | PaginationDirection::Both)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
pub enum CachePolicy {
    #[default]
    CacheOrNetwork,
    CacheOnly,
    NetworkOnly,
    CacheAndNetwork,
    NoCache,
}

/// What a binding should do with the current cache state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Render the cached data right away.
    pub use_cache: bool,
    /// Send the document over the network.
    pub fetch: bool,
}

impl CachePolicy {
    pub fn resolve(self, read: &ReadOutput, allow_partial: bool) -> PolicyDecision {
        let usable = read.data.is_some() && (!read.partial || allow_partial);
        let fresh = usable && !read.partial && !read.stale;

        let (use_cache, fetch) = match self {
            CachePolicy::CacheOnly => (true, false),
            CachePolicy::NetworkOnly | CachePolicy::NoCache => (false, true),
            CachePolicy::CacheOrNetwork => (usable, !fresh),
            CachePolicy::CacheAndNetwork => (usable, true),
        };

        PolicyDecision { use_cache, fetch }
    }
}

/// A selection over one object, keyed by response key (alias or field name).
#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSet {
    #[serde(default)]
    pub fields: IndexMap<String, FieldSelection>,
    #[serde(default)]
    pub abstract_fields: Option<AbstractFields>,
}

/// Fields that only apply to some concrete types of an interface or union.
#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractFields {
    /// Fields per type condition, which may be concrete or abstract.
    #[serde(default)]
    pub fields: IndexMap<String, IndexMap<String, FieldSelection>>,
    /// Abstract type conditions each concrete type satisfies, in precedence order.
    #[serde(default)]
    pub type_map: IndexMap<String, Vec<String>>,
}

impl SelectionSet {
    /// The fields that apply to an object of type `typename`.
    ///
    /// The exact concrete branch wins over abstract branches, abstract branches are applied in
    /// the order of the type map, and shared fields come last. Within that order the first
    /// definition of a response key is kept. The boolean is false when abstract branches exist
    /// and none of them applies.
    pub fn fields_for(&self, typename: Option<&str>) -> (IndexMap<&str, &FieldSelection>, bool) {
        let Some(abstract_fields) = &self.abstract_fields else {
            return (self.shared_fields(), true);
        };

        let mut branch = IndexMap::new();
        let mut matched = false;

        if let Some(typename) = typename {
            let conditions = std::iter::once(typename).chain(
                abstract_fields
                    .type_map
                    .get(typename)
                    .into_iter()
                    .flatten()
                    .map(String::as_str),
            );

            for condition in conditions {
                let Some(fields) = abstract_fields.fields.get(condition) else {
                    continue;
                };

                matched = true;
                for (response_key, field) in fields {
                    branch.entry(response_key.as_str()).or_insert(field);
                }
            }
        }

        let mut result = IndexMap::with_capacity(self.fields.len() + branch.len());
        for (response_key, field) in &self.fields {
            let field = branch.shift_remove(response_key.as_str()).unwrap_or(field);
            result.insert(response_key.as_str(), field);
        }
        result.extend(branch);

        (result, matched)
    }

    fn shared_fields(&self) -> IndexMap<&str, &FieldSelection> {
        self.fields
            .iter()
            .map(|(response_key, field)| (response_key.as_str(), field))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelection {
    #[serde(rename = "type")]
    pub type_name: String,
    pub field_name: String,
    #[serde(default)]
    pub arguments: IndexMap<String, Argument>,
    #[serde(default)]
    pub selection: Option<Arc<SelectionSet>>,
    /// The field is typed with an interface or a union.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Update modes the field accepts, given as one mode or a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub update: Vec<UpdateMode>,
    #[serde(default)]
    pub list: Option<ListDirective>,
    #[serde(default)]
    pub operations: Vec<ListOperation>,
    #[serde(default)]
    pub loading: Option<LoadingSpec>,
    /// The field accumulates pages, its key ignores pagination arguments.
    #[serde(default)]
    pub paginated: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Argument {
    Literal {
        value: Value,
    },
    Variable {
        name: String,
        #[serde(default)]
        required: bool,
    },
    Object {
        fields: IndexMap<String, Argument>,
    },
    List {
        items: Vec<Argument>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UpdateMode {
    Append,
    Prepend,
    Replace,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<UpdateMode>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(UpdateMode),
        Many(Vec<UpdateMode>),
    }

    Ok(match <OneOrMany as serde::Deserialize>::deserialize(deserializer)? {
        OneOrMany::One(mode) => vec![mode],
        OneOrMany::Many(modes) => modes,
    })
}

/// A `@list(name:)` annotation on a field.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirective {
    pub name: String,
    /// The field is a connection whose items live under `edges`.
    #[serde(default)]
    pub connection: bool,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOperation {
    pub action: OperationAction,
    #[serde(default)]
    pub list: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub position: Option<ListPosition>,
    #[serde(default, rename = "parentID")]
    pub parent_id: Option<ParentId>,
    #[serde(default)]
    pub target: Option<ListTarget>,
    #[serde(default)]
    pub when: Option<ListCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OperationAction {
    Insert,
    Remove,
    Toggle,
    Delete,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParentId {
    String(String),
    Variable(String),
}

/// Restricts an operation to the lists fetched with (or without) some argument values.
#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListCondition {
    pub must: IndexMap<String, Argument>,
    pub must_not: IndexMap<String, Argument>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingSpec {
    pub kind: LoadingKind,
    /// Placeholder to render, defaults to the pending marker.
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub list: Option<LoadingList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingKind {
    /// Render a placeholder value for the field.
    Value,
    /// Render the field's own sub-selection in loading state.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct LoadingList {
    pub depth: u32,
    pub count: u32,
}
