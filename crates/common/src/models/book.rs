//! Catalog record and the shapes used to write it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Genres offered by the catalog forms
pub const CATALOG_GENRES: &[&str] = &[
    "Fiction",
    "Non-Fiction",
    "Fantasy",
    "Sci-Fi",
    "Mystery",
    "Thriller",
    "Romance",
    "Biography",
    "History",
    "Science",
    "Other",
];

/// Canonical spelling of `genre` if it is one of [`CATALOG_GENRES`]
pub fn catalog_genre(genre: &str) -> Option<&'static str> {
    CATALOG_GENRES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(genre.trim()))
}

pub fn is_catalog_genre(genre: &str) -> bool {
    catalog_genre(genre).is_some()
}

/// A single book as stored in the catalog collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub cover_image_id: Option<String>,
    /// Owning user
    pub user_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Whether `user_id` owns this record
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Raw document shape as returned by the document store.
///
/// Every field is optional here; [`Book::try_from`] decides what is
/// required and what is defaulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookDocument {
    #[serde(rename = "$id", default)]
    pub id: Option<String>,

    #[serde(rename = "$createdAt", default)]
    pub created_at: Option<String>,

    #[serde(rename = "$updatedAt", default)]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub genre: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(rename = "coverImageId", default)]
    pub cover_image_id: Option<String>,

    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl TryFrom<BookDocument> for Book {
    type Error = AppError;

    fn try_from(doc: BookDocument) -> Result<Self, Self::Error> {
        let id = non_empty(doc.id).ok_or_else(|| AppError::InvalidDocument {
            id: "<unknown>".to_string(),
            message: "missing $id".to_string(),
        })?;

        let missing = |field: &str| AppError::InvalidDocument {
            id: id.clone(),
            message: format!("missing {}", field),
        };

        let title = non_empty(doc.title).ok_or_else(|| missing("title"))?;
        let author = non_empty(doc.author).ok_or_else(|| missing("author"))?;
        let user_id = non_empty(doc.user_id).ok_or_else(|| missing("userId"))?;

        Ok(Book {
            id,
            title,
            author,
            genre: non_empty(doc.genre),
            description: non_empty(doc.description),
            cover_image_id: non_empty(doc.cover_image_id),
            user_id,
            created_at: parse_timestamp(doc.created_at),
            updated_at: parse_timestamp(doc.updated_at),
        })
    }
}

impl TryFrom<serde_json::Value> for Book {
    type Error = AppError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let id = value
            .get("$id")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>")
            .to_string();

        let doc: BookDocument =
            serde_json::from_value(value).map_err(|e| AppError::InvalidDocument {
                id,
                message: e.to_string(),
            })?;

        Book::try_from(doc)
    }
}

/// Fields written when a book is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFields {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub cover_image_id: Option<String>,
    pub user_id: String,
}

/// Input to a create call, before any cover is uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub user_id: String,
}

impl NewBook {
    pub fn into_fields(self, cover_image_id: Option<String>) -> BookFields {
        BookFields {
            title: self.title,
            author: self.author,
            genre: self.genre,
            description: self.description,
            cover_image_id,
            user_id: self.user_id,
        }
    }
}

/// Partial update; absent fields are left untouched by the store.
///
/// `cover_image_id` carries the current cover so a replacement upload
/// knows which blob to retire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// An uploaded cover image
#[derive(Clone, PartialEq, Eq)]
pub struct CoverUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for CoverUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Page of documents as returned by a list call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentList<T> {
    /// Total reported by the store, which may exceed `documents.len()`
    pub total: u64,
    pub documents: Vec<T>,
}
