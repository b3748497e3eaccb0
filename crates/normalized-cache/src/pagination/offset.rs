use std::sync::Arc;

use serde_json::Value;

use super::{Fetch, Paginated, PaginationError};
use crate::{
    artifact::{Artifact, PaginationMethod, UpdateMode},
    cache::Cache,
    key::Variables,
    write::WriteOutput,
};

/// Forward only pagination over `offset`/`limit` arguments.
///
/// The offset is tracked here, the server does not report it.
#[derive(Debug, Clone)]
pub struct OffsetPaginator {
    paginated: Paginated,
    offset: u64,
    /// Size of the last loaded page.
    limit: u32,
}

impl OffsetPaginator {
    pub fn new(artifact: Arc<Artifact>, variables: &Variables) -> Result<Self, PaginationError> {
        let paginated = Paginated::new(artifact, variables, PaginationMethod::Offset)?;

        let offset = paginated
            .variables
            .get("offset")
            .or(paginated.refetch.start.as_ref())
            .and_then(Value::as_u64)
            .unwrap_or_default();

        let limit = paginated
            .variables
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|limit| u32::try_from(limit).ok())
            .unwrap_or(paginated.refetch.page_size);

        Ok(OffsetPaginator {
            paginated,
            offset,
            limit,
        })
    }

    /// Offset of the last loaded page.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Loads the page following the last loaded one and appends it.
    ///
    /// The offset only advances when the page was merged.
    pub async fn load_next_page(
        &mut self,
        cache: &mut Cache,
        fetch: &dyn Fetch,
        limit: Option<u32>,
    ) -> Result<WriteOutput, PaginationError> {
        let offset = self.offset + u64::from(self.limit);
        let limit = limit.unwrap_or(self.paginated.refetch.page_size);

        let variables = self
            .paginated
            .page_variables([("offset", Value::from(offset)), ("limit", Value::from(limit))], &[]);

        let output = self
            .paginated
            .load(cache, fetch, variables, UpdateMode::Append)
            .await?;

        self.offset = offset;
        self.limit = limit;

        Ok(output)
    }
}
