//! Genre listing

use axum::Json;
use serde::Serialize;

use bookshelf_common::models::CATALOG_GENRES;

#[derive(Serialize)]
pub struct GenreResponse {
    pub name: &'static str,
    /// Route listing the genre's books
    pub books_url: String,
}

#[derive(Serialize)]
pub struct GenreListResponse {
    pub genres: Vec<GenreResponse>,
}

pub async fn list_genres() -> Json<GenreListResponse> {
    let genres = CATALOG_GENRES
        .iter()
        .copied()
        .map(|name| GenreResponse {
            name,
            books_url: format!("/v1/books/genre/{}", name),
        })
        .collect();

    Json(GenreListResponse { genres })
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;

    #[tokio::test]
    async fn test_genres_link_to_listings() {
        let app = TestApp::new();
        let body = body_json(app.send(get("/v1/genres", None)).await).await;
        let genres = body["genres"].as_array().unwrap();
        assert_eq!(genres.len(), 11);
        assert_eq!(genres[3]["name"], "Sci-Fi");
        assert_eq!(genres[3]["books_url"], "/v1/books/genre/Sci-Fi");
        assert!(app.memory.calls().is_empty());
    }
}
