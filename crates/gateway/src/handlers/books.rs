//! Catalog handlers
//!
//! Writes are gated on ownership here; the catalog service itself does
//! not check who is calling.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use bookshelf_common::{
    auth::CurrentSession,
    errors::{AppError, Result},
    models::{catalog_genre, Book, BookPatch, CoverUpload, DocumentList, NewBook},
    BookService,
};

/// Book as returned to callers
#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub cover_image_id: Option<String>,
    pub cover_url: Option<String>,
    pub user_id: String,
    /// Whether the caller owns this book
    pub can_edit: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BookResponse {
    fn new(book: Book, books: &BookService, viewer: Option<&str>) -> Self {
        let cover_url = books.image_preview(book.cover_image_id.as_deref());
        let can_edit = viewer.map(|id| book.is_owned_by(id)).unwrap_or(false);

        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            genre: book.genre,
            description: book.description,
            cover_image_id: book.cover_image_id,
            cover_url,
            user_id: book.user_id,
            can_edit,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub total: u64,
    pub books: Vec<BookResponse>,
}

impl BookListResponse {
    fn new(list: DocumentList<Book>, books: &BookService, viewer: Option<&str>) -> Self {
        Self {
            total: list.total,
            books: list
                .documents
                .into_iter()
                .map(|book| BookResponse::new(book, books, viewer))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TitleSearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct FindParams {
    #[serde(default)]
    pub term: String,
}

/// Fields submitted by the book form. Absent fields stay `None`.
#[derive(Debug, Default, Validate)]
pub struct BookForm {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: Option<String>,

    pub genre: Option<String>,

    #[validate(length(min = 1, max = 5000, message = "Description must be 1-5000 characters"))]
    pub description: Option<String>,

    pub cover: Option<CoverUpload>,
}

impl BookForm {
    /// Validate, normalising the genre to its catalog spelling
    fn check(mut self) -> Result<Self> {
        self.validate()?;

        if let Some(ref genre) = self.genre {
            let canonical = catalog_genre(genre).ok_or_else(|| AppError::Validation {
                message: format!("Unknown genre: {}", genre),
                field: Some("genre".to_string()),
            })?;
            self.genre = Some(canonical.to_string());
        }

        Ok(self)
    }

    fn into_new_book(self, user_id: String) -> Result<(NewBook, Option<CoverUpload>)> {
        let required = |value: Option<String>, field: &str| -> Result<String> {
            value.ok_or_else(|| AppError::MissingField { field: field.to_string() })
        };

        let book = NewBook {
            title: required(self.title, "title")?,
            author: required(self.author, "author")?,
            genre: required(self.genre, "genre")?,
            description: required(self.description, "description")?,
            user_id,
        };

        Ok((book, self.cover))
    }
}

fn multipart_error(error: MultipartError, limit: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::InvalidFormat { message: error.body_text() }
    }
}

/// Read the multipart book form
async fn read_form(mut multipart: Multipart, limit: usize) -> Result<BookForm> {
    let mut form = BookForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "cover" {
            let file_name = field.file_name().unwrap_or("cover").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

            // Browsers send an empty part when no file was picked
            if bytes.is_empty() {
                continue;
            }

            if !content_type.starts_with("image/") {
                return Err(AppError::Validation {
                    message: "Cover must be an image".to_string(),
                    field: Some("cover".to_string()),
                });
            }

            form.cover = Some(CoverUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let slot = match name.as_str() {
            "title" => &mut form.title,
            "author" => &mut form.author,
            "genre" => &mut form.genre,
            "description" => &mut form.description,
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
                continue;
            }
        };

        let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
        *slot = Some(value.trim().to_string());
    }

    Ok(form)
}

// ============================================================================
// Reads
// ============================================================================

pub async fn list_books(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<BookListResponse>> {
    let viewer = session.user_id().await;
    let list = state.books.list_all().await?;
    Ok(Json(BookListResponse::new(list, &state.books, viewer.as_deref())))
}

/// Books owned by the caller
pub async fn my_books(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<BookListResponse>> {
    let user = session.require_user().await?;
    let list = state.books.list_by_user(&user.id).await?;
    Ok(Json(BookListResponse::new(list, &state.books, Some(&user.id))))
}

pub async fn search_by_title(
    State(state): State<AppState>,
    session: CurrentSession,
    Query(params): Query<TitleSearchParams>,
) -> Result<Json<BookListResponse>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(AppError::Validation {
            message: "Please enter a search term".to_string(),
            field: Some("query".to_string()),
        });
    }

    let viewer = session.user_id().await;
    let list = state.books.list_by_title(query).await?;
    Ok(Json(BookListResponse::new(list, &state.books, viewer.as_deref())))
}

/// Free-text search across title, author and genre
pub async fn find_books(
    State(state): State<AppState>,
    session: CurrentSession,
    Query(params): Query<FindParams>,
) -> Result<Json<BookListResponse>> {
    let term = params.term.trim();
    if term.is_empty() {
        return Err(AppError::Validation {
            message: "Please enter a search term".to_string(),
            field: Some("term".to_string()),
        });
    }

    let viewer = session.user_id().await;
    let list = state.books.search(term).await?;
    Ok(Json(BookListResponse::new(list, &state.books, viewer.as_deref())))
}

pub async fn books_by_genre(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(genre): Path<String>,
) -> Result<Json<BookListResponse>> {
    let viewer = session.user_id().await;
    let list = state.books.list_by_genre(&genre).await?;
    Ok(Json(BookListResponse::new(list, &state.books, viewer.as_deref())))
}

pub async fn books_by_author(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(author): Path<String>,
) -> Result<Json<BookListResponse>> {
    let viewer = session.user_id().await;
    let list = state.books.list_by_author(&author).await?;
    Ok(Json(BookListResponse::new(list, &state.books, viewer.as_deref())))
}

pub async fn get_book(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<BookResponse>> {
    let viewer = session.user_id().await;
    let book = state.books.get(&id).await?;
    Ok(Json(BookResponse::new(book, &state.books, viewer.as_deref())))
}

// ============================================================================
// Writes
// ============================================================================

/// Add a book owned by the caller
pub async fn create_book(
    State(state): State<AppState>,
    session: CurrentSession,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BookResponse>)> {
    let user = session.require_user().await?;

    let form = read_form(multipart, state.config.server.max_upload_bytes)
        .await?
        .check()?;
    let (new_book, cover) = form.into_new_book(user.id.clone())?;

    let book = state.books.create(new_book, cover).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse::new(book, &state.books, Some(&user.id))),
    ))
}

/// Edit a book the caller owns
pub async fn update_book(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<BookResponse>> {
    let user = session.require_user().await?;
    let existing = state.books.get(&id).await?;
    if !session.owns(&existing).await {
        return Err(AppError::NotOwner { id });
    }

    let form = read_form(multipart, state.config.server.max_upload_bytes)
        .await?
        .check()?;

    let patch = BookPatch {
        title: form.title,
        author: form.author,
        genre: form.genre,
        description: form.description,
        cover_image_id: existing.cover_image_id,
        user_id: Some(user.id.clone()),
    };

    let book = state.books.update(&id, patch, form.cover).await?;
    Ok(Json(BookResponse::new(book, &state.books, Some(&user.id))))
}

/// Delete a book the caller owns
pub async fn delete_book(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    session.require_user().await?;
    let existing = state.books.get(&id).await?;
    if !session.owns(&existing).await {
        return Err(AppError::NotOwner { id });
    }

    state.books.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
