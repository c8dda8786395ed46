use std::sync::Arc;

use async_trait::async_trait;

use crate::db::models::Post;
use crate::error::AppError;
use crate::pagination::{paginate, CountPolicy, Page, PageWindow, PagedSource, PaginationParams};
use crate::search::client::PostSearchService;
use crate::search::document::{IndexDocument, SearchHit, UpdateScript};

/// Mirrors post mutations into the search index and runs paginated searches.
#[derive(Clone)]
pub struct PostIndexer {
    search: Arc<dyn PostSearchService>,
}

impl PostIndexer {
    pub fn new(search: Arc<dyn PostSearchService>) -> Self {
        Self { search }
    }

    pub async fn ensure_index(&self) -> Result<(), AppError> {
        self.search.ensure_index().await
    }

    /// Index a freshly created post. The author must be loaded.
    pub async fn index_new(&self, post: &Post) -> Result<(), AppError> {
        let doc = IndexDocument::try_from(post)?;
        self.search.index_post(&doc).await
    }

    /// Rewrite the indexed fields of `post` in place.
    pub async fn apply_partial_update(&self, post: &Post) -> Result<(), AppError> {
        let doc = IndexDocument::try_from(post)?;
        let script = UpdateScript::for_document(&doc);
        self.search.update_post(doc.id, &script).await
    }

    pub async fn remove_by_post_id(&self, id: i64) -> Result<(), AppError> {
        self.search.remove_post(id).await
    }

    /// Phrase search, paginated and counted like the post listing.
    pub async fn search(
        &self,
        text: &str,
        params: &PaginationParams,
        policy: CountPolicy,
    ) -> Result<Page<SearchHit>, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("search text cannot be empty".into()));
        }

        let source = TextSearch {
            search: self.search.as_ref(),
            text,
        };
        paginate(&source, params, policy).await
    }
}

struct TextSearch<'a> {
    search: &'a dyn PostSearchService,
    text: &'a str,
}

#[async_trait]
impl PagedSource for TextSearch<'_> {
    type Item = SearchHit;

    async fn fetch_page(&self, window: &PageWindow) -> Result<Page<SearchHit>, AppError> {
        self.search.search(self.text, window).await
    }

    async fn count_unscoped(&self) -> Result<u64, AppError> {
        self.search.count(self.text).await
    }
}
