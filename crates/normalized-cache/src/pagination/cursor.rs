use std::sync::Arc;

use serde_json::Value;

use super::{follow, Fetch, PageInfo, Paginated, PaginationError};
use crate::{
    artifact::{Artifact, PaginationMethod, UpdateMode},
    cache::Cache,
    identity::RecordId,
    key::Variables,
    read::ReadRequest,
    write::WriteOutput,
};

const PAGE_INFO: &str = "pageInfo";

/// Relay style pagination: pages are requested relative to the cursors of the loaded edges.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    paginated: Paginated,
}

impl CursorPaginator {
    pub fn new(artifact: Arc<Artifact>, variables: &Variables) -> Result<Self, PaginationError> {
        Ok(CursorPaginator {
            paginated: Paginated::new(artifact, variables, PaginationMethod::Cursor)?,
        })
    }

    /// The page info of the connection as currently cached.
    pub fn page_info(&self, cache: &Cache) -> Result<PageInfo, PaginationError> {
        let Paginated {
            artifact,
            refetch,
            variables,
        } = &self.paginated;

        let root = RecordId::root();
        let output = cache.read(ReadRequest::new(&artifact.selection, &root, variables))?;

        let page_info = output
            .data
            .as_ref()
            .and_then(|data| follow(data, &refetch.path))
            .and_then(|connection| connection.get(PAGE_INFO))
            .cloned()
            .and_then(|page_info| serde_json::from_value(page_info).ok())
            .unwrap_or_default();

        Ok(page_info)
    }

    /// Loads the page after the last cached edge and appends it.
    ///
    /// Does nothing when the connection reports no next page.
    pub async fn load_next_page(
        &self,
        cache: &mut Cache,
        fetch: &dyn Fetch,
        page_size: Option<u32>,
    ) -> Result<WriteOutput, PaginationError> {
        if !self.paginated.refetch.direction.allows_forward() {
            return Err(self.direction_error("forward"));
        }

        let page_info = self.page_info(cache)?;
        if !page_info.has_next_page {
            tracing::debug!(document = %self.paginated.artifact.name, "no next page");
            return Ok(WriteOutput::default());
        }

        let cursor = page_info.end_cursor.ok_or(PaginationError::NoCursor)?;
        let variables = self.paginated.page_variables(
            [
                ("first", Value::from(self.page_size(page_size))),
                ("after", Value::String(cursor)),
            ],
            &["last", "before"],
        );

        self.paginated.load(cache, fetch, variables, UpdateMode::Append).await
    }

    /// Loads the page before the first cached edge and prepends it.
    pub async fn load_previous_page(
        &self,
        cache: &mut Cache,
        fetch: &dyn Fetch,
        page_size: Option<u32>,
    ) -> Result<WriteOutput, PaginationError> {
        if !self.paginated.refetch.direction.allows_backward() {
            return Err(self.direction_error("backward"));
        }

        let page_info = self.page_info(cache)?;
        if !page_info.has_previous_page {
            tracing::debug!(document = %self.paginated.artifact.name, "no previous page");
            return Ok(WriteOutput::default());
        }

        let cursor = page_info.start_cursor.ok_or(PaginationError::NoCursor)?;
        let variables = self.paginated.page_variables(
            [
                ("last", Value::from(self.page_size(page_size))),
                ("before", Value::String(cursor)),
            ],
            &["first", "after"],
        );

        self.paginated.load(cache, fetch, variables, UpdateMode::Prepend).await
    }

    fn page_size(&self, page_size: Option<u32>) -> u32 {
        page_size.unwrap_or(self.paginated.refetch.page_size)
    }

    fn direction_error(&self, direction: &'static str) -> PaginationError {
        PaginationError::Direction {
            name: self.paginated.artifact.name.clone(),
            direction,
        }
    }
}
