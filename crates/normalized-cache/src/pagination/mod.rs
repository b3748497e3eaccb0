//! Loading further pages of a paginated document and merging them into the cache.

mod cursor;
mod offset;

pub use cursor::CursorPaginator;
pub use offset::OffsetPaginator;

use std::sync::Arc;

use serde_json::Value;

use crate::{
    artifact::{Artifact, PaginationMethod, RefetchSpec, UpdateMode},
    cache::Cache,
    error::CacheError,
    identity::RecordId,
    key::Variables,
    write::{WriteOutput, WriteRequest},
};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    AnyError(String),
}

impl FetchError {
    pub fn any(error: impl ToString) -> Self {
        FetchError::AnyError(error.to_string())
    }
}

pub struct FetchRequest<'a> {
    pub artifact: &'a Artifact,
    pub variables: &'a Variables,
}

/// Sends a document to the server. Transport is up to the implementor.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<GraphqlResponse, FetchError>;
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct GraphqlError {
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error("document {name} does not declare {method} pagination")]
    NotPaginated { name: String, method: PaginationMethod },
    #[error("document {name} cannot be paginated {direction}")]
    Direction { name: String, direction: &'static str },
    #[error("no cursor to continue from")]
    NoCursor,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("the server answered without data: {}", .0.join(", "))]
    Graphql(Vec<String>),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// A paginated document and the variables it was first fetched with.
#[derive(Debug, Clone)]
struct Paginated {
    artifact: Arc<Artifact>,
    refetch: RefetchSpec,
    variables: Variables,
}

impl Paginated {
    fn new(artifact: Arc<Artifact>, variables: &Variables, method: PaginationMethod) -> Result<Self, PaginationError> {
        let refetch = match &artifact.refetch {
            Some(refetch) if refetch.method == method => refetch.clone(),
            _ => {
                return Err(PaginationError::NotPaginated {
                    name: artifact.name.clone(),
                    method,
                })
            }
        };

        let variables = artifact.variables_with_defaults(variables);

        Ok(Paginated {
            artifact,
            refetch,
            variables,
        })
    }

    fn page_variables(&self, page: impl IntoIterator<Item = (&'static str, Value)>, cleared: &[&str]) -> Variables {
        let mut variables = self.variables.clone();

        for name in cleared {
            variables.remove(*name);
        }
        variables.extend(page.into_iter().map(|(name, value)| (name.to_owned(), value)));

        variables
    }

    /// Fetches one page and merges it. The cache is left alone when the fetch fails.
    async fn load(
        &self,
        cache: &mut Cache,
        fetch: &dyn Fetch,
        variables: Variables,
        mode: UpdateMode,
    ) -> Result<WriteOutput, PaginationError> {
        tracing::debug!(document = %self.artifact.name, %mode, "loading page");

        let response = fetch
            .fetch(FetchRequest {
                artifact: &self.artifact,
                variables: &variables,
            })
            .await?;

        let data = match response.data {
            Some(data) if !data.is_null() => data,
            _ => {
                return Err(PaginationError::Graphql(
                    response.errors.into_iter().map(|error| error.message).collect(),
                ))
            }
        };

        if !response.errors.is_empty() {
            tracing::debug!(document = %self.artifact.name, errors = response.errors.len(), "page loaded with errors");
        }

        let root = RecordId::root();
        let output = cache.write(
            WriteRequest::new(&self.artifact.selection, &data, &root, &variables).apply_updates(&[mode]),
        )?;

        Ok(output)
    }
}

/// Follows response keys down a read result.
fn follow<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(data, |value, key| value.get(key))
}
