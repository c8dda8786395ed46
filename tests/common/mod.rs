use std::sync::Arc;

use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::meilisearch::Meilisearch;
use testcontainers_modules::mongo::Mongo;

use postsync::config::SearchConfig;
use postsync::db::models::{NewPost, NewUser, Post, User};
use postsync::db::repository::{MongoPostRepository, MongoUserRepository, UserRepository};
use postsync::pagination::CountPolicy;
use postsync::posts::service::PostsService;
use postsync::search::client::{MeilisearchService, PostSearchService};
use postsync::search::indexer::PostIndexer;

/// Holds running containers and a service wired to them.
///
/// Containers are kept alive for as long as this struct lives. When dropped,
/// containers are stopped and cleaned up automatically.
pub struct TestEnv {
    _mongo: ContainerAsync<Mongo>,
    _meili: ContainerAsync<Meilisearch>,
    pub service: PostsService,
    pub users: Arc<dyn UserRepository>,
    pub search: Arc<dyn PostSearchService>,
    pub search_url: String,
    pub author: User,
}

impl TestEnv {
    /// Spin up MongoDB and Meilisearch and build the service against them.
    pub async fn start() -> Self {
        Self::start_with_policy(CountPolicy::Unscoped).await
    }

    pub async fn start_with_policy(policy: CountPolicy) -> Self {
        // Start containers concurrently. Scripted edits need Meilisearch >= 1.10.
        let mongo_fut = Mongo::default().start();
        let meili_fut = Meilisearch::default().with_tag("v1.12").start();
        let (mongo_container, meili_container) = tokio::join!(mongo_fut, meili_fut);
        let mongo_container = mongo_container.expect("Failed to start MongoDB container");
        let meili_container = meili_container.expect("Failed to start Meilisearch container");

        // --- MongoDB ---
        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let mongo_uri = format!("mongodb://127.0.0.1:{}", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let mongo_db = mongo_client.database("postsync_test");
        let users = Arc::new(MongoUserRepository::new(&mongo_db));
        let posts = Arc::new(MongoPostRepository::new(&mongo_db));

        // --- Meilisearch ---
        let meili_port = meili_container
            .get_host_port_ipv4(7700)
            .await
            .expect("Failed to get Meilisearch port");
        let search_config = SearchConfig {
            url: format!("http://127.0.0.1:{}", meili_port),
            ..SearchConfig::default()
        };
        let search: Arc<dyn PostSearchService> = Arc::new(
            MeilisearchService::new(&search_config).expect("Failed to create MeilisearchService"),
        );
        search
            .ensure_index()
            .await
            .expect("Failed to create the posts index");

        let author = users
            .create(NewUser {
                email: "author@example.com".to_string(),
                name: "Author".to_string(),
            })
            .await
            .expect("Failed to create author");

        let service = PostsService::new(
            posts,
            users.clone(),
            PostIndexer::new(search.clone()),
            policy,
        );

        Self {
            _mongo: mongo_container,
            _meili: meili_container,
            service,
            users,
            search,
            search_url: search_config.url,
            author,
        }
    }

    /// Helper: create a post by the test author.
    pub async fn create(&self, title: &str, paragraphs: &[&str]) -> Post {
        self.service
            .create(
                NewPost {
                    title: title.to_string(),
                    paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
                },
                &self.author,
            )
            .await
            .expect("Failed to create post")
    }
}

/// A word that no other test document contains.
pub fn unique_keyword(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}
