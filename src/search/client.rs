use async_trait::async_trait;

use crate::error::AppError;
use crate::pagination::{Page, PageWindow};
use crate::search::document::{IndexDocument, SearchHit, UpdateScript};

/// Trait for search index operations, enabling mock testing.
///
/// Every write resolves only once the index has finished applying it, so a
/// returned `Ok` means the change is visible to subsequent searches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostSearchService: Send + Sync {
    /// Create the index if it does not exist yet and apply its mapping.
    /// Should be called on startup; repeating it is harmless.
    async fn ensure_index(&self) -> Result<(), AppError>;

    /// Add a document, keyed by its id.
    async fn index_post(&self, doc: &IndexDocument) -> Result<(), AppError>;

    /// Run `script` against the document whose id is `id`.
    /// Finding no such document is not an error.
    async fn update_post(&self, id: i64, script: &UpdateScript) -> Result<(), AppError>;

    /// Delete the document whose id is `id`. Finding none is not an error.
    async fn remove_post(&self, id: i64) -> Result<(), AppError>;

    /// Phrase search over title and paragraphs, ascending by id, restricted
    /// to `id > start_id` in cursor mode. `count` is the engine's total for
    /// that same filtered query.
    async fn search(&self, text: &str, window: &PageWindow) -> Result<Page<SearchHit>, AppError>;

    /// Number of documents matching `text` as a plain (non-phrase) query,
    /// with no id filter.
    async fn count(&self, text: &str) -> Result<u64, AppError>;
}

/// Wrap `text` as a phrase query. Embedded quotes would end the phrase early.
pub fn phrase_query(text: &str) -> String {
    format!("\"{}\"", text.replace('"', " ").trim())
}

/// Filter expression for the cursor, if any.
pub fn window_filter(window: &PageWindow) -> Option<String> {
    window.lower_bound().map(|start_id| format!("id > {start_id}"))
}

/// Filter expression selecting one document by id.
pub fn id_filter(id: i64) -> String {
    format!("id = {id}")
}

#[cfg(feature = "backends")]
pub use meili::MeilisearchService;

#[cfg(feature = "backends")]
mod meili {
    use std::time::Duration;

    use async_trait::async_trait;
    use meilisearch_sdk::client::Client;
    use meilisearch_sdk::errors::{Error as MeiliError, ErrorCode};
    use meilisearch_sdk::indexes::Index;
    use meilisearch_sdk::search::SearchResults;
    use meilisearch_sdk::task_info::TaskInfo;
    use meilisearch_sdk::tasks::Task;
    use serde::Deserialize;

    use super::{id_filter, phrase_query, window_filter, PostSearchService};
    use crate::config::SearchConfig;
    use crate::error::AppError;
    use crate::pagination::{Page, PageWindow};
    use crate::search::document::{IndexDocument, SearchHit, UpdateScript};
    use crate::search::mapping::IndexMapping;

    const SORT_BY_ID: [&str; 1] = ["id:asc"];
    const TASK_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Meilisearch implementation of the PostSearchService.
    ///
    /// Key-based operations go through the SDK. Filter-scoped writes (edit by
    /// function, delete by filter) use the REST API directly.
    pub struct MeilisearchService {
        client: Client,
        http: reqwest::Client,
        url: String,
        api_key: Option<String>,
        index_name: String,
        mapping: IndexMapping,
        task_timeout: Duration,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct EnqueuedTask {
        task_uid: u32,
    }

    #[derive(Deserialize)]
    struct TaskState {
        status: String,
        #[serde(default)]
        error: Option<TaskFailure>,
    }

    #[derive(Deserialize)]
    struct TaskFailure {
        message: String,
        code: String,
    }

    fn map_meili_error(e: MeiliError) -> AppError {
        match e {
            MeiliError::Meilisearch(err) => AppError::SearchOperation(err.to_string()),
            MeiliError::Timeout => AppError::SearchUnavailable("timed out waiting for task".into()),
            other => AppError::SearchUnavailable(other.to_string()),
        }
    }

    fn map_http_error(e: reqwest::Error) -> AppError {
        AppError::SearchUnavailable(e.to_string())
    }

    impl MeilisearchService {
        /// Create with explicit configuration.
        pub fn new(config: &SearchConfig) -> Result<Self, AppError> {
            let client = Client::new(&config.url, config.api_key.clone()).map_err(|e| {
                AppError::SearchUnavailable(format!("Failed to create Meilisearch client: {e}"))
            })?;

            Ok(Self {
                client,
                http: reqwest::Client::new(),
                url: config.url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                index_name: config.index.clone(),
                mapping: IndexMapping::posts(),
                task_timeout: config.task_timeout(),
            })
        }

        fn index(&self) -> Index {
            self.client.index(&self.index_name)
        }

        /// Create `name` if missing, then apply `mapping` and the experimental
        /// features it relies on. Settings are reapplied on an existing index.
        pub async fn ensure_index_with(
            &self,
            name: &str,
            mapping: &IndexMapping,
        ) -> Result<(), AppError> {
            let created = match self.client.get_index(name).await {
                Ok(_) => false,
                Err(MeiliError::Meilisearch(err))
                    if matches!(err.error_code, ErrorCode::IndexNotFound) =>
                {
                    self.create(name, mapping)
                        .await
                        .map_err(|e| AppError::IndexMapping(e.to_string()))?;
                    true
                }
                Err(e) => return Err(AppError::IndexMapping(e.to_string())),
            };

            self.apply_mapping(name, mapping)
                .await
                .map_err(|e| AppError::IndexMapping(e.to_string()))?;

            if created {
                tracing::info!("Created index [{name}] with mappings.");
            } else {
                tracing::debug!("Index [{name}] already exists, mappings reapplied");
            }
            Ok(())
        }

        async fn create(&self, name: &str, mapping: &IndexMapping) -> Result<(), AppError> {
            let task = self
                .client
                .create_index(name, Some(mapping.primary_key))
                .await
                .map_err(map_meili_error)?;
            self.wait(task).await
        }

        async fn apply_mapping(&self, name: &str, mapping: &IndexMapping) -> Result<(), AppError> {
            let index = self.client.index(name);

            let task = index
                .set_searchable_attributes(mapping.searchable_attributes())
                .await
                .map_err(map_meili_error)?;
            self.wait(task).await?;

            let task = index
                .set_filterable_attributes(mapping.filterable_attributes())
                .await
                .map_err(map_meili_error)?;
            self.wait(task).await?;

            let task = index
                .set_sortable_attributes(mapping.sortable_attributes())
                .await
                .map_err(map_meili_error)?;
            self.wait(task).await?;

            self.enable_document_edition().await
        }

        /// Scripted updates are an experimental Meilisearch feature.
        async fn enable_document_edition(&self) -> Result<(), AppError> {
            let response = self
                .authorized(self.http.patch(format!("{}/experimental-features", self.url)))
                .json(&serde_json::json!({ "editDocumentsByFunction": true }))
                .send()
                .await
                .map_err(map_http_error)?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::SearchOperation(format!(
                    "enabling document edition failed ({status}): {body}"
                )));
            }
            Ok(())
        }

        fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        }

        async fn wait(&self, task: TaskInfo) -> Result<(), AppError> {
            let task = task
                .wait_for_completion(&self.client, Some(TASK_POLL_INTERVAL), Some(self.task_timeout))
                .await
                .map_err(map_meili_error)?;

            match task {
                Task::Failed { content } => Err(AppError::SearchOperation(content.error.to_string())),
                _ => Ok(()),
            }
        }

        /// POST a filter-scoped write and wait for the resulting task.
        async fn submit_filtered(&self, path: &str, body: serde_json::Value) -> Result<(), AppError> {
            let url = format!("{}/indexes/{}/{}", self.url, self.index_name, path);
            let response = self
                .authorized(self.http.post(&url))
                .json(&body)
                .send()
                .await
                .map_err(map_http_error)?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::SearchOperation(format!("{path} rejected ({status}): {body}")));
            }

            let task: EnqueuedTask = response.json().await.map_err(map_http_error)?;
            self.wait_for_task_uid(task.task_uid).await
        }

        async fn wait_for_task_uid(&self, task_uid: u32) -> Result<(), AppError> {
            let url = format!("{}/tasks/{task_uid}", self.url);
            let poll = async {
                loop {
                    let state: TaskState = self
                        .authorized(self.http.get(&url))
                        .send()
                        .await
                        .map_err(map_http_error)?
                        .error_for_status()
                        .map_err(map_http_error)?
                        .json()
                        .await
                        .map_err(map_http_error)?;

                    match state.status.as_str() {
                        "succeeded" => return Ok(()),
                        "failed" | "canceled" => {
                            let reason = state
                                .error
                                .map(|e| format!("{} ({})", e.message, e.code))
                                .unwrap_or_else(|| state.status.clone());
                            return Err(AppError::SearchOperation(format!(
                                "task {task_uid} {}: {reason}",
                                state.status
                            )));
                        }
                        _ => tokio::time::sleep(TASK_POLL_INTERVAL).await,
                    }
                }
            };

            tokio::time::timeout(self.task_timeout, poll)
                .await
                .map_err(|_| {
                    AppError::SearchUnavailable(format!("timed out waiting for task {task_uid}"))
                })?
        }
    }

    #[async_trait]
    impl PostSearchService for MeilisearchService {
        async fn ensure_index(&self) -> Result<(), AppError> {
            self.ensure_index_with(&self.index_name, &self.mapping).await
        }

        async fn index_post(&self, doc: &IndexDocument) -> Result<(), AppError> {
            let task = self
                .index()
                .add_documents(&[doc], Some(self.mapping.primary_key))
                .await
                .map_err(map_meili_error)?;
            self.wait(task).await?;

            tracing::debug!(post_id = doc.id, "Indexed post");
            Ok(())
        }

        async fn update_post(&self, id: i64, script: &UpdateScript) -> Result<(), AppError> {
            let body = serde_json::json!({
                "filter": id_filter(id),
                "function": script.source(),
                "context": script.context(),
            });
            self.submit_filtered("documents/edit", body).await?;

            tracing::debug!(post_id = id, "Applied scripted update");
            Ok(())
        }

        async fn remove_post(&self, id: i64) -> Result<(), AppError> {
            let body = serde_json::json!({ "filter": id_filter(id) });
            self.submit_filtered("documents/delete", body).await?;

            tracing::debug!(post_id = id, "Removed post from index");
            Ok(())
        }

        async fn search(&self, text: &str, window: &PageWindow) -> Result<Page<SearchHit>, AppError> {
            let phrase = phrase_query(text);
            let filter = window_filter(window);

            let index = self.index();
            let mut query = index.search();
            query.with_query(&phrase).with_sort(&SORT_BY_ID);
            if let Some(filter) = filter.as_deref() {
                query.with_filter(filter);
            }
            if let Some(offset) = window.offset() {
                query.with_offset(offset as usize);
            }
            if let Some(limit) = window.limit() {
                query.with_limit(limit as usize);
            }

            let results: SearchResults<IndexDocument> =
                query.execute().await.map_err(map_meili_error)?;

            let count = results
                .estimated_total_hits
                .or(results.total_hits)
                .unwrap_or(results.hits.len()) as u64;
            let hits = results
                .hits
                .into_iter()
                .map(|hit| SearchHit::from(hit.result))
                .collect();

            Ok(Page::new(hits, count))
        }

        async fn count(&self, text: &str) -> Result<u64, AppError> {
            let index = self.index();
            let mut query = index.search();
            query.with_query(text).with_limit(0);

            let results: SearchResults<IndexDocument> =
                query.execute().await.map_err(map_meili_error)?;

            Ok(results.estimated_total_hits.or(results.total_hits).unwrap_or(0) as u64)
        }
    }
}
