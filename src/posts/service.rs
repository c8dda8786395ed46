use std::sync::Arc;

use async_trait::async_trait;

use crate::db::models::{NewPost, Post, UpdatePost, User};
use crate::db::repository::{PostRepository, UserRepository};
use crate::error::{AppError, SyncOperation};
use crate::pagination::{paginate, CountPolicy, Page, PageWindow, PagedSource, PaginationParams};
use crate::search::indexer::PostIndexer;

/// Post CRUD against the primary store, mirrored into the search index.
///
/// Each mutation commits to the primary store first and then awaits the
/// matching index write. If the index write fails the call returns
/// [`AppError::IndexSync`]; the primary change stays in place and the index
/// step can be retried on its own.
#[derive(Clone)]
pub struct PostsService {
    posts: Arc<dyn PostRepository>,
    users: Arc<dyn UserRepository>,
    indexer: PostIndexer,
    count_policy: CountPolicy,
}

impl PostsService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        users: Arc<dyn UserRepository>,
        indexer: PostIndexer,
        count_policy: CountPolicy,
    ) -> Self {
        Self {
            posts,
            users,
            indexer,
            count_policy,
        }
    }

    pub fn indexer(&self) -> &PostIndexer {
        &self.indexer
    }

    pub async fn create(&self, post: NewPost, author: &User) -> Result<Post, AppError> {
        let created = self.posts.insert(post, author).await?;

        self.indexer
            .index_new(&created)
            .await
            .map_err(|e| self.sync_failed(e, created.id, SyncOperation::Create))?;

        tracing::info!(post_id = created.id, author_id = author.id, "Created post");
        Ok(created)
    }

    /// Resolve the author first, then [`create`](Self::create).
    pub async fn create_as(&self, post: NewPost, author_id: i64) -> Result<Post, AppError> {
        let author = self
            .users
            .find_by_id(author_id)
            .await?
            .ok_or(AppError::UserNotFound(author_id))?;

        self.create(post, &author).await
    }

    pub async fn update(&self, id: i64, patch: UpdatePost) -> Result<Post, AppError> {
        self.posts.update(id, &patch).await?;

        let updated = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or(AppError::PostNotFound(id))?;

        self.indexer
            .apply_partial_update(&updated)
            .await
            .map_err(|e| self.sync_failed(e, id, SyncOperation::Update))?;

        tracing::info!(post_id = id, "Updated post");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if !self.posts.delete(id).await? {
            return Err(AppError::PostNotFound(id));
        }

        self.indexer
            .remove_by_post_id(id)
            .await
            .map_err(|e| self.sync_failed(e, id, SyncOperation::Delete))?;

        tracing::info!(post_id = id, "Deleted post");
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Post, AppError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or(AppError::PostNotFound(id))
    }

    pub async fn list_all(&self, params: &PaginationParams) -> Result<Page<Post>, AppError> {
        let source = PostListing {
            posts: self.posts.as_ref(),
        };
        paginate(&source, params, self.count_policy).await
    }

    /// Search the index, then load the matching posts from the primary store
    /// in ascending id order.
    pub async fn search_posts(
        &self,
        text: &str,
        params: &PaginationParams,
    ) -> Result<Page<Post>, AppError> {
        let results = self.indexer.search(text, params, self.count_policy).await?;
        if results.items.is_empty() {
            return Ok(Page::empty(results.count));
        }

        let ids: Vec<i64> = results.items.iter().map(|hit| hit.id).collect();
        let mut items = self.posts.find_by_ids(&ids).await?;
        items.sort_by_key(|post| post.id);

        if items.len() < ids.len() {
            tracing::warn!(
                hits = ids.len(),
                hydrated = items.len(),
                "Search index returned posts missing from the database"
            );
        }

        Ok(Page::new(items, results.count))
    }

    fn sync_failed(&self, err: AppError, post_id: i64, operation: SyncOperation) -> AppError {
        let err = err.into_sync_error(post_id, operation);
        tracing::warn!(post_id, %operation, error = %err, "Search index out of sync");
        err
    }
}

struct PostListing<'a> {
    posts: &'a dyn PostRepository,
}

#[async_trait]
impl PagedSource for PostListing<'_> {
    type Item = Post;

    async fn fetch_page(&self, window: &PageWindow) -> Result<Page<Post>, AppError> {
        self.posts.find_and_count(window).await
    }

    async fn count_unscoped(&self) -> Result<u64, AppError> {
        self.posts.count().await
    }
}
