//! Dual-mode pagination shared by post listing and post search.
//!
//! Without a cursor, pages are addressed by `offset`/`limit` and the count is
//! the total of the query that produced the page. With a cursor (`start_id`),
//! `offset` is ignored, rows are restricted to `id > start_id`, and the count
//! is taken from a separate unscoped count (see [`CountPolicy`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Largest page size; MongoDB takes limits as signed 64-bit integers.
pub const MAX_LIMIT: u64 = i64::MAX as u64;

/// Pagination parameters as supplied by a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// Lower-bound cursor: only ids strictly greater are returned.
    #[serde(default)]
    pub start_id: Option<i64>,
}

impl PaginationParams {
    pub fn offset(offset: u64, limit: u64) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            start_id: None,
        }
    }

    pub fn after(start_id: i64, limit: Option<u64>) -> Self {
        Self {
            offset: None,
            limit,
            start_id: Some(start_id),
        }
    }

    /// Validate the parameters and pick the pagination mode.
    ///
    /// A `start_id` of zero is the same as no cursor.
    pub fn window(&self) -> Result<PageWindow, AppError> {
        match self.limit {
            Some(0) => return Err(AppError::BadRequest("limit must be at least 1".into())),
            Some(limit) if limit > MAX_LIMIT => {
                return Err(AppError::BadRequest(format!("limit must be at most {MAX_LIMIT}")))
            }
            _ => {}
        }
        match self.start_id {
            Some(start_id) if start_id != 0 => Ok(PageWindow::After {
                start_id,
                limit: self.limit,
            }),
            _ => Ok(PageWindow::Offset {
                offset: self.offset,
                limit: self.limit,
            }),
        }
    }
}

/// The validated slice of a result set to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageWindow {
    Offset {
        offset: Option<u64>,
        limit: Option<u64>,
    },
    After {
        start_id: i64,
        limit: Option<u64>,
    },
}

impl PageWindow {
    pub fn limit(&self) -> Option<u64> {
        match self {
            PageWindow::Offset { limit, .. } | PageWindow::After { limit, .. } => *limit,
        }
    }

    /// Rows to skip. Always `None` in cursor mode.
    pub fn offset(&self) -> Option<u64> {
        match self {
            PageWindow::Offset { offset, .. } => *offset,
            PageWindow::After { .. } => None,
        }
    }

    pub fn lower_bound(&self) -> Option<i64> {
        match self {
            PageWindow::Offset { .. } => None,
            PageWindow::After { start_id, .. } => Some(*start_id),
        }
    }
}

/// Which count a cursor-mode page reports.
///
/// `Unscoped` reports the population before the cursor filter (the whole
/// collection for listings, every text match for searches). `Scoped` reports
/// the rows remaining after the cursor. Offset-mode pages are unaffected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    #[default]
    Unscoped,
    Scoped,
}

/// One page of results plus the count chosen for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, count: u64) -> Self {
        Self { items, count }
    }

    pub fn empty(count: u64) -> Self {
        Self {
            items: Vec::new(),
            count,
        }
    }
}

/// Anything that can serve a window of rows together with its own total,
/// plus a total that ignores the cursor.
#[async_trait]
pub trait PagedSource: Send + Sync {
    type Item: Send;

    /// Fetch the rows for `window`; `count` is the total matching the active
    /// filter, including the cursor filter when there is one.
    async fn fetch_page(&self, window: &PageWindow) -> Result<Page<Self::Item>, AppError>;

    /// Total matching the source's base filter, ignoring any cursor.
    async fn count_unscoped(&self) -> Result<u64, AppError>;
}

/// Serve `params` from `source`, choosing the count according to `policy`.
pub async fn paginate<S: PagedSource>(
    source: &S,
    params: &PaginationParams,
    policy: CountPolicy,
) -> Result<Page<S::Item>, AppError> {
    let window = params.window()?;

    if window.lower_bound().is_none() || policy == CountPolicy::Scoped {
        return source.fetch_page(&window).await;
    }

    let count = source.count_unscoped().await?;
    let page = source.fetch_page(&window).await?;
    Ok(Page::new(page.items, count))
}
