use std::fmt;

use thiserror::Error;

/// The index-side step that failed after a primary-store commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Application-wide error types.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Post with id {0} not found")]
    PostNotFound(i64),

    #[error("User with id {0} not found")]
    UserNotFound(i64),

    /// The author relation was not loaded when the post reached the indexer.
    #[error("Post {0} has no loaded author and cannot be indexed")]
    MissingAuthor(i64),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The search index could not be reached, or a task did not finish in time.
    #[error("Search index unavailable: {0}")]
    SearchUnavailable(String),

    /// The search index answered but rejected the request or failed the task.
    #[error("Search index operation failed: {0}")]
    SearchOperation(String),

    #[error("Failed to create index mapping: {0}")]
    IndexMapping(String),

    /// The primary store committed, the index did not follow.
    #[error("Post {post_id} was saved but the index {operation} failed: {source}")]
    IndexSync {
        post_id: i64,
        operation: SyncOperation,
        #[source]
        source: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Wrap a failure of the index step that followed a committed primary
    /// write. The cause, including a post that could not be indexed at all,
    /// stays available as the source.
    pub fn into_sync_error(self, post_id: i64, operation: SyncOperation) -> Self {
        match self {
            AppError::IndexSync { .. } => self,
            other => AppError::IndexSync {
                post_id,
                operation,
                source: Box::new(other),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::PostNotFound(_) | AppError::UserNotFound(_))
    }

    /// True when the primary store holds the write even though the call failed.
    pub fn primary_committed(&self) -> bool {
        matches!(self, AppError::IndexSync { .. })
    }
}
