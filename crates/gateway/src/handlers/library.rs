//! Open Library pass-through handlers
//!
//! Responses add cover and photo URLs so callers never build CDN links.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use bookshelf_common::{
    errors::{AppError, Result},
    openlibrary::{
        key_id, AuthorDetails, CoverSize, SearchResults, WorkDetails, WorkSummary,
    },
    OpenLibraryClient,
};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorWorksParams {
    #[serde(default)]
    pub author: String,
}

#[derive(Serialize)]
pub struct WorkSummaryResponse {
    pub id: String,
    #[serde(flatten)]
    pub work: WorkSummary,
    pub cover_url: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub num_found: u64,
    pub works: Vec<WorkSummaryResponse>,
}

#[derive(Serialize)]
pub struct WorkResponse {
    pub id: String,
    #[serde(flatten)]
    pub work: WorkDetails,
    pub cover_url: Option<String>,
    /// Up to three subjects, as shown on a detail page
    pub genres: Vec<String>,
    pub author_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct AuthorResponse {
    pub id: String,
    #[serde(flatten)]
    pub author: AuthorDetails,
    pub photo_url: Option<String>,
}

fn search_response(results: SearchResults, client: &OpenLibraryClient) -> SearchResponse {
    let works = results
        .works
        .into_iter()
        .map(|work| WorkSummaryResponse {
            id: work.work_id().to_string(),
            cover_url: work.cover_id.map(|id| client.cover_url(id, CoverSize::Large)),
            work,
        })
        .collect();

    SearchResponse {
        num_found: results.num_found,
        works,
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation {
            message: "Please enter a search term".to_string(),
            field: Some(field.to_string()),
        });
    }
    Ok(value.to_string())
}

/// Free-text search, first results only
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let query = required(&params.q, "q")?;
    let results = state.library.search(&query).await?;
    Ok(Json(search_response(results, &state.library)))
}

/// Everything Open Library lists under an author name
pub async fn works_by_author(
    State(state): State<AppState>,
    Query(params): Query<AuthorWorksParams>,
) -> Result<Json<SearchResponse>> {
    let author = required(&params.author, "author")?;
    let results = state.library.works_by_author(&author).await?;
    Ok(Json(search_response(results, &state.library)))
}

pub async fn work(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkResponse>> {
    let work = state.library.work(&id).await?;

    Ok(Json(WorkResponse {
        id: work.work_id().to_string(),
        cover_url: work
            .cover_id()
            .map(|cover| state.library.cover_url(cover, CoverSize::Large)),
        genres: work.subjects.iter().take(3).cloned().collect(),
        author_ids: work.author_keys.iter().map(|key| key_id(key).to_string()).collect(),
        work,
    }))
}

pub async fn author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuthorResponse>> {
    let author = state.library.author(&id).await?;

    Ok(Json(AuthorResponse {
        id: author.author_id().to_string(),
        photo_url: author.photo_id().map(|photo| state.library.author_photo_url(photo)),
        author,
    }))
}
