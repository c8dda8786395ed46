//! In-memory collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::db::models::{NewPost, NewUser, Post, UpdatePost, User};
use crate::db::repository::{PostRepository, UserRepository};
use crate::error::AppError;
use crate::pagination::{CountPolicy, Page, PageWindow};
use crate::posts::service::PostsService;
use crate::search::client::PostSearchService;
use crate::search::document::{IndexDocument, SearchHit, UpdateScript};
use crate::search::indexer::PostIndexer;

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<BTreeMap<i64, User>>,
}

impl InMemoryUserRepository {
    pub fn add(&self, name: &str) -> User {
        let mut users = self.users.lock().unwrap();
        let user = User {
            id: users.len() as i64 + 1,
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        user
    }

    pub fn remove(&self, id: i64) {
        self.users.lock().unwrap().remove(&id);
    }

    fn get(&self, id: i64) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let mut created = self.add(&user.name);
        created.email = user.email;
        self.users.lock().unwrap().insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.get(id))
    }
}

/// Posts keyed by id. Reads attach authors from the paired user repository.
#[derive(Default)]
pub struct InMemoryPostRepository {
    posts: Mutex<BTreeMap<i64, Post>>,
    next_id: Mutex<i64>,
    users: Arc<InMemoryUserRepository>,
}

impl InMemoryPostRepository {
    pub fn users(&self) -> Arc<InMemoryUserRepository> {
        self.users.clone()
    }

    fn with_author(&self, mut post: Post) -> Post {
        post.author = self.users.get(post.author_id);
        post
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn insert(&self, post: NewPost, author: &User) -> Result<Post, AppError> {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            *next_id
        };
        let stored = Post {
            id,
            title: post.title,
            paragraphs: post.paragraphs,
            author_id: author.id,
            created_at: Utc::now(),
            author: None,
        };
        self.posts.lock().unwrap().insert(id, stored.clone());
        Ok(Post {
            author: Some(author.clone()),
            ..stored
        })
    }

    async fn update(&self, id: i64, patch: &UpdatePost) -> Result<(), AppError> {
        if let Some(post) = self.posts.lock().unwrap().get_mut(&id) {
            patch.apply_to(post);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, AppError> {
        let post = self.posts.lock().unwrap().get(&id).cloned();
        Ok(post.map(|p| self.with_author(p)))
    }

    /// Returned in the order the ids were asked for, like an unsorted `$in`.
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>, AppError> {
        let posts = self.posts.lock().unwrap().clone();
        Ok(ids
            .iter()
            .filter_map(|id| posts.get(id).cloned())
            .map(|p| self.with_author(p))
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.posts.lock().unwrap().remove(&id).is_some())
    }

    async fn find_and_count(&self, window: &PageWindow) -> Result<Page<Post>, AppError> {
        let lower = window.lower_bound().unwrap_or(i64::MIN);
        let matching: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.id > lower)
            .cloned()
            .collect();
        let count = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(window.offset().unwrap_or(0) as usize)
            .take(window.limit().map(|l| l as usize).unwrap_or(usize::MAX))
            .map(|p| self.with_author(p))
            .collect();
        Ok(Page::new(items, count))
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.posts.lock().unwrap().len() as u64)
    }
}

/// Handles for an index write parked by [`InMemorySearch::hold_index_writes_for`].
#[derive(Clone, Default)]
pub struct IndexHold {
    /// Notified once the write has started and is waiting.
    pub reached: Arc<Notify>,
    /// Notify to let the write finish.
    pub release: Arc<Notify>,
}

/// A search index that matches case-insensitive substrings of title and
/// paragraphs.
#[derive(Default)]
pub struct InMemorySearch {
    documents: Mutex<BTreeMap<i64, IndexDocument>>,
    held: Mutex<Option<(String, IndexHold)>>,
}

impl InMemorySearch {
    pub fn document(&self, id: i64) -> Option<IndexDocument> {
        self.documents.lock().unwrap().get(&id).cloned()
    }

    /// Make `index_post` for `title` park until `release` is notified.
    pub fn hold_index_writes_for(&self, title: &str) -> IndexHold {
        let hold = IndexHold::default();
        *self.held.lock().unwrap() = Some((title.to_string(), hold.clone()));
        hold
    }

    fn matching(&self, text: &str) -> Vec<IndexDocument> {
        let needle = text.to_lowercase();
        self.documents
            .lock()
            .unwrap()
            .values()
            .filter(|doc| {
                doc.title.to_lowercase().contains(&needle)
                    || doc.paragraphs.iter().any(|p| p.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PostSearchService for InMemorySearch {
    async fn ensure_index(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn index_post(&self, doc: &IndexDocument) -> Result<(), AppError> {
        let gate = self
            .held
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(title, _)| *title == doc.title)
            .map(|(_, hold)| hold.clone());
        if let Some(hold) = gate {
            hold.reached.notify_one();
            hold.release.notified().await;
        }

        self.documents.lock().unwrap().insert(doc.id, doc.clone());
        Ok(())
    }

    async fn update_post(&self, id: i64, script: &UpdateScript) -> Result<(), AppError> {
        if let Some(doc) = self.documents.lock().unwrap().get_mut(&id) {
            script.apply_to(doc);
        }
        Ok(())
    }

    async fn remove_post(&self, id: i64) -> Result<(), AppError> {
        self.documents.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn search(&self, text: &str, window: &PageWindow) -> Result<Page<SearchHit>, AppError> {
        let lower = window.lower_bound().unwrap_or(i64::MIN);
        let matching: Vec<IndexDocument> = self
            .matching(text)
            .into_iter()
            .filter(|doc| doc.id > lower)
            .collect();
        let count = matching.len() as u64;
        let hits = matching
            .into_iter()
            .skip(window.offset().unwrap_or(0) as usize)
            .take(window.limit().map(|l| l as usize).unwrap_or(usize::MAX))
            .map(SearchHit::from)
            .collect();
        Ok(Page::new(hits, count))
    }

    async fn count(&self, text: &str) -> Result<u64, AppError> {
        Ok(self.matching(text).len() as u64)
    }
}

/// A service wired to in-memory collaborators, with one registered author.
pub struct Fixture {
    pub service: PostsService,
    pub posts: Arc<InMemoryPostRepository>,
    pub search: Arc<InMemorySearch>,
    pub author: User,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_policy(CountPolicy::Unscoped).await
    }

    pub async fn with_policy(policy: CountPolicy) -> Self {
        let posts = Arc::new(InMemoryPostRepository::default());
        let search = Arc::new(InMemorySearch::default());
        let author = posts.users().add("Ann");

        let indexer = PostIndexer::new(search.clone());
        indexer.ensure_index().await.unwrap();

        let service = PostsService::new(posts.clone(), posts.users(), indexer, policy);
        Self {
            service,
            posts,
            search,
            author,
        }
    }
}
