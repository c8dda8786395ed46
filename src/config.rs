use std::time::Duration;

use serde::Deserialize;

use crate::pagination::CountPolicy;

/// Application configuration.
///
/// Built once at startup and handed to each client explicitly; nothing is
/// written back into the process environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mongodb: MongoConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_mongodb_uri")]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_mongodb_uri(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    /// How long to wait for an index task before giving up.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

impl SearchConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            api_key: None,
            index: default_index(),
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationConfig {
    #[serde(default)]
    pub count_policy: CountPolicy,
}

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "postsync".to_string()
}

fn default_search_url() -> String {
    "http://localhost:7700".to_string()
}

fn default_index() -> String {
    "posts".to_string()
}

fn default_task_timeout_secs() -> u64 {
    10
}

#[cfg(feature = "backends")]
impl AppConfig {
    /// Load from an optional TOML file, then `POSTSYNC__*` environment variables.
    ///
    /// e.g. `POSTSYNC__SEARCH__URL=http://meili:7700`.
    pub fn load(path: &str) -> Result<Self, crate::error::AppError> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("POSTSYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::error::AppError::Config(e.to_string()))
    }
}
