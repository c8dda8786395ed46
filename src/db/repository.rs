use async_trait::async_trait;

use crate::db::models::{NewPost, NewUser, Post, UpdatePost, User};
use crate::error::AppError;
use crate::pagination::{Page, PageWindow};

/// Repository trait for post operations.
///
/// This trait allows mocking the database layer in tests. Every read that
/// returns posts loads the author relation.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Persist a new post for `author`, assigning the next id.
    async fn insert(&self, post: NewPost, author: &User) -> Result<Post, AppError>;

    /// Apply `patch` to the post with `id`. A missing post is not an error here;
    /// callers reload to find out.
    async fn update(&self, id: i64, patch: &UpdatePost) -> Result<(), AppError>;

    /// Find a post by its id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, AppError>;

    /// Find the posts with the given ids, in no particular order.
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>, AppError>;

    /// Delete a post. Returns whether a post was actually removed.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;

    /// Posts in ascending id order for `window`, with the number of posts
    /// matching the window's filter.
    async fn find_and_count(&self, window: &PageWindow) -> Result<Page<Post>, AppError>;

    /// Number of posts in the collection.
    async fn count(&self) -> Result<u64, AppError>;
}

/// Repository trait for users, used to resolve post authors.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
}

#[cfg(feature = "backends")]
pub use mongo::{MongoPostRepository, MongoUserRepository};

/// MongoDB implementations.
///
/// Only available when the `backends` feature is enabled.
#[cfg(feature = "backends")]
mod mongo {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::TryStreamExt;
    use mongodb::bson::{doc, Document};
    use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
    use mongodb::{Collection, Database};
    use serde::{Deserialize, Serialize};

    use super::{PostRepository, UserRepository};
    use crate::db::models::{NewPost, NewUser, Post, UpdatePost, User};
    use crate::error::AppError;
    use crate::pagination::{Page, PageWindow};

    /// A named sequence in the `counters` collection.
    #[derive(Debug, Serialize, Deserialize)]
    struct Counter {
        #[serde(rename = "_id")]
        name: String,
        seq: i64,
    }

    fn db_error(e: mongodb::error::Error) -> AppError {
        AppError::Database(e.to_string())
    }

    /// Atomically increment and return the sequence `name`, starting at 1.
    async fn next_id(counters: &Collection<Counter>, name: &str) -> Result<i64, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = counters
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { "seq": 1_i64 } })
            .with_options(options)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::Database(format!("sequence '{name}' was not created")))?;

        Ok(counter.seq)
    }

    pub struct MongoPostRepository {
        posts: Collection<Post>,
        users: Collection<User>,
        counters: Collection<Counter>,
    }

    impl MongoPostRepository {
        pub fn new(db: &Database) -> Self {
            Self {
                posts: db.collection("posts"),
                users: db.collection("users"),
                counters: db.collection("counters"),
            }
        }

        async fn collect(&self, filter: Document, options: FindOptions) -> Result<Vec<Post>, AppError> {
            let mut cursor = self
                .posts
                .find(filter)
                .with_options(options)
                .await
                .map_err(db_error)?;

            let mut posts = Vec::new();
            while let Some(post) = cursor.try_next().await.map_err(db_error)? {
                posts.push(post);
            }

            self.attach_authors(&mut posts).await?;
            Ok(posts)
        }

        /// Load the author relation for each post with one query.
        async fn attach_authors(&self, posts: &mut [Post]) -> Result<(), AppError> {
            if posts.is_empty() {
                return Ok(());
            }

            let mut author_ids: Vec<i64> = posts.iter().map(|p| p.author_id).collect();
            author_ids.sort_unstable();
            author_ids.dedup();

            let mut cursor = self
                .users
                .find(doc! { "_id": { "$in": author_ids } })
                .await
                .map_err(db_error)?;

            let mut authors = HashMap::new();
            while let Some(user) = cursor.try_next().await.map_err(db_error)? {
                authors.insert(user.id, user);
            }

            for post in posts.iter_mut() {
                post.author = authors.get(&post.author_id).cloned();
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepository for MongoPostRepository {
        async fn insert(&self, post: NewPost, author: &User) -> Result<Post, AppError> {
            let id = next_id(&self.counters, "posts").await?;
            let mut stored = Post {
                id,
                title: post.title,
                paragraphs: post.paragraphs,
                author_id: author.id,
                created_at: Utc::now(),
                author: None,
            };

            self.posts.insert_one(&stored).await.map_err(db_error)?;

            stored.author = Some(author.clone());
            Ok(stored)
        }

        async fn update(&self, id: i64, patch: &UpdatePost) -> Result<(), AppError> {
            let Some(update) = patch.to_update_document() else {
                return Ok(());
            };

            self.posts
                .update_one(doc! { "_id": id }, update)
                .await
                .map_err(db_error)?;

            Ok(())
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<Post>, AppError> {
            let post = self
                .posts
                .find_one(doc! { "_id": id })
                .await
                .map_err(db_error)?;

            let Some(mut post) = post else {
                return Ok(None);
            };
            self.attach_authors(std::slice::from_mut(&mut post)).await?;
            Ok(Some(post))
        }

        async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>, AppError> {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            self.collect(doc! { "_id": { "$in": ids.to_vec() } }, FindOptions::default())
                .await
        }

        async fn delete(&self, id: i64) -> Result<bool, AppError> {
            let result = self
                .posts
                .delete_one(doc! { "_id": id })
                .await
                .map_err(db_error)?;

            Ok(result.deleted_count > 0)
        }

        async fn find_and_count(&self, window: &PageWindow) -> Result<Page<Post>, AppError> {
            let filter = match window.lower_bound() {
                Some(start_id) => doc! { "_id": { "$gt": start_id } },
                None => doc! {},
            };

            let limit = window
                .limit()
                .map(i64::try_from)
                .transpose()
                .map_err(|_| AppError::BadRequest("limit is out of range".into()))?;
            let options = FindOptions::builder()
                .sort(doc! { "_id": 1 })
                .skip(window.offset())
                .limit(limit)
                .build();

            let count = self
                .posts
                .count_documents(filter.clone())
                .await
                .map_err(db_error)?;
            let items = self.collect(filter, options).await?;

            Ok(Page::new(items, count))
        }

        async fn count(&self) -> Result<u64, AppError> {
            self.posts.count_documents(doc! {}).await.map_err(db_error)
        }
    }

    pub struct MongoUserRepository {
        users: Collection<User>,
        counters: Collection<Counter>,
    }

    impl MongoUserRepository {
        pub fn new(db: &Database) -> Self {
            Self {
                users: db.collection("users"),
                counters: db.collection("counters"),
            }
        }
    }

    #[async_trait]
    impl UserRepository for MongoUserRepository {
        async fn create(&self, user: NewUser) -> Result<User, AppError> {
            let stored = User {
                id: next_id(&self.counters, "users").await?,
                email: user.email,
                name: user.name,
                created_at: Utc::now(),
            };

            self.users.insert_one(&stored).await.map_err(db_error)?;
            Ok(stored)
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
            self.users
                .find_one(doc! { "_id": id })
                .await
                .map_err(db_error)
        }
    }
}
