pub mod config;
pub mod error;
pub mod pagination;
pub mod db {
    pub mod models;
    pub mod repository;
}
pub mod search {
    pub mod client;
    pub mod document;
    pub mod indexer;
    pub mod mapping;
}
pub mod posts {
    pub mod service;
}

#[cfg(test)]
mod test_support;
