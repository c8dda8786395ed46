use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::models::Post;
use crate::error::AppError;

/// A post representation optimized for the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Primary key, mirrors `Post::id`.
    pub id: i64,
    pub title: String,
    pub paragraphs: Vec<String>,
    #[serde(rename = "authorId")]
    pub author_id: i64,
}

impl TryFrom<&Post> for IndexDocument {
    type Error = AppError;

    /// Fails when the author relation is not loaded.
    fn try_from(post: &Post) -> Result<Self, Self::Error> {
        let author = post.author.as_ref().ok_or(AppError::MissingAuthor(post.id))?;
        Ok(Self {
            id: post.id,
            title: post.title.clone(),
            paragraphs: post.paragraphs.clone(),
            author_id: author.id,
        })
    }
}

/// A search result. Only the id and ordering are trusted; field values are
/// hydrated from the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub paragraphs: Vec<String>,
    pub author_id: i64,
}

impl From<IndexDocument> for SearchHit {
    fn from(doc: IndexDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            paragraphs: doc.paragraphs,
            author_id: doc.author_id,
        }
    }
}

/// The fields a scripted update may assign. `id` is the key and never changes.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAssignment {
    Title(String),
    Paragraphs(Vec<String>),
    AuthorId(i64),
}

impl FieldAssignment {
    /// Name of the field in the index document.
    pub fn field(&self) -> &'static str {
        match self {
            FieldAssignment::Title(_) => "title",
            FieldAssignment::Paragraphs(_) => "paragraphs",
            FieldAssignment::AuthorId(_) => "authorId",
        }
    }

    /// Script statement reading the value from the bound context.
    pub fn script_fragment(&self) -> String {
        let field = self.field();
        format!("doc.{field} = context.{field};")
    }

    pub fn context_value(&self) -> Value {
        match self {
            FieldAssignment::Title(title) => Value::from(title.as_str()),
            FieldAssignment::Paragraphs(paragraphs) => Value::from(paragraphs.clone()),
            FieldAssignment::AuthorId(id) => Value::from(*id),
        }
    }

    #[cfg(test)]
    pub fn apply_to(&self, doc: &mut IndexDocument) {
        match self {
            FieldAssignment::Title(title) => doc.title = title.clone(),
            FieldAssignment::Paragraphs(paragraphs) => doc.paragraphs = paragraphs.clone(),
            FieldAssignment::AuthorId(id) => doc.author_id = *id,
        }
    }
}

/// An update script built from typed field assignments.
///
/// Values never appear in the script source; they travel in the context
/// object the script reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateScript {
    assignments: Vec<FieldAssignment>,
}

impl UpdateScript {
    pub fn new(assignments: Vec<FieldAssignment>) -> Self {
        Self { assignments }
    }

    /// Assign every mutable field of `doc`.
    pub fn for_document(doc: &IndexDocument) -> Self {
        Self::new(vec![
            FieldAssignment::Title(doc.title.clone()),
            FieldAssignment::Paragraphs(doc.paragraphs.clone()),
            FieldAssignment::AuthorId(doc.author_id),
        ])
    }

    pub fn assignments(&self) -> &[FieldAssignment] {
        &self.assignments
    }

    pub fn source(&self) -> String {
        self.assignments
            .iter()
            .map(FieldAssignment::script_fragment)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn context(&self) -> Value {
        let map: Map<String, Value> = self
            .assignments
            .iter()
            .map(|a| (a.field().to_string(), a.context_value()))
            .collect();
        Value::Object(map)
    }

    /// Local equivalent of running the script, for in-memory indexes.
    #[cfg(test)]
    pub fn apply_to(&self, doc: &mut IndexDocument) {
        for assignment in &self.assignments {
            assignment.apply_to(doc);
        }
    }
}
