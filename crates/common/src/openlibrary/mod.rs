//! Open Library client
//!
//! One GET per call against the public API. No retry, no caching.

mod models;

pub use models::{key_id, AuthorDetails, SearchResults, WorkDetails, WorkSummary};

use crate::config::OpenLibraryConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, error};

const SERVICE: &str = "openlibrary";

/// Cover image sizes served by the covers CDN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverSize {
    Small,
    Medium,
    #[default]
    Large,
}

impl CoverSize {
    fn suffix(self) -> &'static str {
        match self {
            CoverSize::Small => "S",
            CoverSize::Medium => "M",
            CoverSize::Large => "L",
        }
    }
}

#[derive(Clone)]
pub struct OpenLibraryClient {
    http: reqwest::Client,
    base_url: String,
    covers_url: String,
    search_limit: usize,
}

impl OpenLibraryClient {
    pub fn new(config: &OpenLibraryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            covers_url: config.covers_url.trim_end_matches('/').to_string(),
            search_limit: config.search_limit,
        })
    }

    /// Free-text search, keeping the first `search_limit` hits
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let url = format!("{}/search.json", self.base_url);
        let mut results: SearchResults = self
            .get_json("search", &url, &[("q", query)], || AppError::Metadata {
                message: "search endpoint not found".to_string(),
            })
            .await?;

        results.works.truncate(self.search_limit);
        Ok(results)
    }

    /// Work by id, e.g. `OL45804W`
    pub async fn work(&self, id: &str) -> Result<WorkDetails> {
        let url = format!("{}/works/{}.json", self.base_url, id);
        self.get_json("work", &url, &[], || AppError::WorkNotFound { id: id.to_string() })
            .await
    }

    /// Author by id, e.g. `OL23919A`
    pub async fn author(&self, id: &str) -> Result<AuthorDetails> {
        let url = format!("{}/authors/{}.json", self.base_url, id);
        self.get_json("author", &url, &[], || AppError::AuthorNotFound { id: id.to_string() })
            .await
    }

    /// Every work matching an author name. Not truncated.
    pub async fn works_by_author(&self, author: &str) -> Result<SearchResults> {
        let url = format!("{}/search.json", self.base_url);
        self.get_json("works_by_author", &url, &[("author", author)], || {
            AppError::AuthorNotFound { id: author.to_string() }
        })
        .await
    }

    pub fn cover_url(&self, cover_id: i64, size: CoverSize) -> String {
        format!("{}/b/id/{}-{}.jpg", self.covers_url, cover_id, size.suffix())
    }

    pub fn author_photo_url(&self, photo_id: i64) -> String {
        format!("{}/a/id/{}-{}.jpg", self.covers_url, photo_id, CoverSize::Large.suffix())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        query: &[(&str, &str)],
        not_found: impl FnOnce() -> AppError,
    ) -> Result<T> {
        debug!(operation, url, "Open Library request");

        let start = Instant::now();
        let outcome = self.http.get(url).query(query).send().await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                metrics::record_remote_call(SERVICE, operation, elapsed, false);
                error!(operation, error = %e, "Open Library request failed");
                return Err(AppError::Metadata { message: e.to_string() });
            }
        };

        let status = response.status();
        metrics::record_remote_call(SERVICE, operation, elapsed, status.is_success());

        if status == StatusCode::NOT_FOUND {
            return Err(not_found());
        }

        if !status.is_success() {
            error!(operation, status = status.as_u16(), "Open Library returned an error");
            return Err(AppError::Metadata {
                message: format!("Open Library returned {}", status),
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!(operation, error = %e, "Unreadable Open Library response");
            AppError::Metadata { message: e.to_string() }
        })
    }
}

impl std::fmt::Debug for OpenLibraryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenLibraryClient")
            .field("base_url", &self.base_url)
            .field("search_limit", &self.search_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let count = if params.contains_key("q") { 25 } else { 30 };
        let docs: Vec<Value> = (0..count)
            .map(|i| json!({"key": format!("/works/OL{}W", i), "title": format!("Book {}", i)}))
            .collect();
        Json(json!({"numFound": count, "docs": docs}))
    }

    async fn work(Path(file): Path<String>) -> std::result::Result<Json<Value>, HttpStatus> {
        match file.as_str() {
            "OL45804W.json" => Ok(Json(json!({
                "key": "/works/OL45804W",
                "title": "Fantastic Mr Fox",
                "description": {"type": "/type/text", "value": "A fox outwits three farmers."},
                "covers": [6498519]
            }))),
            "broken.json" => Err(HttpStatus::INTERNAL_SERVER_ERROR),
            _ => Err(HttpStatus::NOT_FOUND),
        }
    }

    async fn author(Path(file): Path<String>) -> std::result::Result<Json<Value>, HttpStatus> {
        match file.as_str() {
            "OL34184A.json" => Ok(Json(json!({
                "key": "/authors/OL34184A",
                "name": "Roald Dahl",
                "bio": "British novelist."
            }))),
            _ => Err(HttpStatus::NOT_FOUND),
        }
    }

    async fn serve() -> OpenLibraryClient {
        let app = Router::new()
            .route("/search.json", get(search))
            .route("/works/{file}", get(work))
            .route("/authors/{file}", get(author));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = OpenLibraryConfig {
            base_url: format!("http://{}", addr),
            ..Default::default()
        };
        OpenLibraryClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_search_truncates_to_limit() {
        let client = serve().await;
        let results = client.search("fox").await.unwrap();
        assert_eq!(results.num_found, 25);
        assert_eq!(results.works.len(), 20);
    }

    #[tokio::test]
    async fn test_works_by_author_is_not_truncated() {
        let client = serve().await;
        let results = client.works_by_author("Roald Dahl").await.unwrap();
        assert_eq!(results.works.len(), 30);
    }

    #[tokio::test]
    async fn test_work_details() {
        let client = serve().await;
        let work = client.work("OL45804W").await.unwrap();
        assert_eq!(work.title, "Fantastic Mr Fox");
        assert_eq!(work.description.as_deref(), Some("A fox outwits three farmers."));
        assert_eq!(work.cover_id(), Some(6498519));
    }

    #[tokio::test]
    async fn test_missing_work_and_author() {
        let client = serve().await;
        let err = client.work("OL0W").await.unwrap_err();
        assert!(matches!(err, AppError::WorkNotFound { ref id } if id == "OL0W"));

        let err = client.author("OL0A").await.unwrap_err();
        assert!(matches!(err, AppError::AuthorNotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_metadata_error() {
        let client = serve().await;
        let err = client.work("broken").await.unwrap_err();
        assert!(matches!(err, AppError::Metadata { .. }));
    }

    #[tokio::test]
    async fn test_author_details() {
        let client = serve().await;
        let author = client.author("OL34184A").await.unwrap();
        assert_eq!(author.name, "Roald Dahl");
        assert_eq!(author.bio.as_deref(), Some("British novelist."));
    }

    #[test]
    fn test_cover_urls() {
        let client = OpenLibraryClient::new(&OpenLibraryConfig::default()).unwrap();
        assert_eq!(
            client.cover_url(6498519, CoverSize::Large),
            "https://covers.openlibrary.org/b/id/6498519-L.jpg"
        );
        assert_eq!(
            client.cover_url(1, CoverSize::Small),
            "https://covers.openlibrary.org/b/id/1-S.jpg"
        );
        assert_eq!(
            client.author_photo_url(6791763),
            "https://covers.openlibrary.org/a/id/6791763-L.jpg"
        );
    }
}
