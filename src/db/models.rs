use bson::{doc, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user that can author posts, stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Sequence-assigned identifier.
    #[serde(rename = "_id")]
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A post stored in the `posts` collection.
///
/// This is the authoritative copy; the search index only holds a derived
/// projection of it (see `crate::search::document::IndexDocument`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Monotonically increasing identifier assigned from the `posts` counter.
    #[serde(rename = "_id")]
    pub id: i64,
    pub title: String,
    /// Ordered text blocks making up the body.
    pub paragraphs: Vec<String>,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    /// The author relation. Only populated when loaded; never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
}

/// Payload for creating a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub paragraphs: Vec<String>,
}

/// Partial update of a post. Only the fields that are set get written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePost {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub paragraphs: Option<Vec<String>>,
}

impl UpdatePost {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.paragraphs.is_none()
    }

    /// The `$set` body for this patch.
    pub fn to_set_document(&self) -> Document {
        let mut set = Document::new();
        if let Some(title) = &self.title {
            set.insert("title", title.as_str());
        }
        if let Some(paragraphs) = &self.paragraphs {
            set.insert("paragraphs", paragraphs.clone());
        }
        set
    }

    /// The full update document, `None` when there is nothing to write.
    pub fn to_update_document(&self) -> Option<Document> {
        if self.is_empty() {
            return None;
        }
        Some(doc! { "$set": self.to_set_document() })
    }

    /// Apply this patch to an in-memory post.
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(paragraphs) = &self.paragraphs {
            post.paragraphs = paragraphs.clone();
        }
    }
}

/// Payload for registering a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
}
