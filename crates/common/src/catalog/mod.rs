//! Book catalog facade
//!
//! Thin pass-through over the document and blob stores:
//! - Each list operation is exactly one store call
//! - Covers are uploaded before the record that references them
//! - Cover cleanup is best-effort and never fails the caller
//!
//! Ownership is not checked here; callers gate writes.

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{Book, BookPatch, CoverUpload, DocumentList, NewBook};
use crate::platform::{unique_id, BlobStore, DocumentStore, Platform, Query, RawDocumentList};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Catalog operations over the hosted platform
#[derive(Clone)]
pub struct BookService {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

impl BookService {
    pub fn new(documents: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { documents, blobs }
    }

    pub fn from_platform(platform: &Platform) -> Self {
        Self::new(platform.documents.clone(), platform.blobs.clone())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create a book, uploading its cover first when one is given.
    ///
    /// A cover uploaded before a failed record create is left behind.
    pub async fn create(&self, book: NewBook, cover: Option<CoverUpload>) -> Result<Book> {
        let cover_image_id = match cover {
            Some(upload) => Some(self.upload_cover(upload).await?),
            None => None,
        };

        let fields = book.into_fields(cover_image_id.clone());
        let data = serde_json::to_value(&fields)?;
        let id = unique_id();

        let document = match self.documents.create_document(&id, data).await {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "Error creating book");
                if let Some(ref file_id) = cover_image_id {
                    warn!(file_id = %file_id, "Cover uploaded for a book that was never created");
                    metrics::record_orphaned_blob("create");
                }
                return Err(e);
            }
        };

        let book = Book::try_from(document)?;
        info!(book_id = %book.id, user_id = %book.user_id, "Book created");
        Ok(book)
    }

    /// Apply a partial update, replacing the cover when a new one is given.
    ///
    /// `patch.cover_image_id` names the cover being replaced.
    pub async fn update(
        &self,
        id: &str,
        mut patch: BookPatch,
        new_cover: Option<CoverUpload>,
    ) -> Result<Book> {
        if let Some(upload) = new_cover {
            if let Some(old_id) = patch.cover_image_id.take() {
                self.discard_cover(&old_id, "update").await;
            }
            patch.cover_image_id = Some(self.upload_cover(upload).await?);
        }

        let data = serde_json::to_value(&patch)?;
        let document = self
            .documents
            .update_document(id, data)
            .await
            .map_err(|e| {
                error!(book_id = %id, error = %e, "Error updating book");
                book_not_found(e, id)
            })?;

        let book = Book::try_from(document)?;
        info!(book_id = %book.id, "Book updated");
        Ok(book)
    }

    /// Delete a book and, best-effort, its cover
    pub async fn delete(&self, id: &str) -> Result<()> {
        let book = self.get(id).await?;

        self.documents.delete_document(id).await.map_err(|e| {
            error!(book_id = %id, error = %e, "Error deleting book");
            book_not_found(e, id)
        })?;

        if let Some(ref cover_id) = book.cover_image_id {
            self.discard_cover(cover_id, "delete").await;
        }

        info!(book_id = %id, "Book deleted");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every book in the catalog
    pub async fn list_all(&self) -> Result<DocumentList<Book>> {
        self.list("list_all", &[]).await
    }

    /// Books owned by `user_id`
    pub async fn list_by_user(&self, user_id: &str) -> Result<DocumentList<Book>> {
        self.list("list_by_user", &[Query::equal("userId", user_id)]).await
    }

    pub async fn list_by_genre(&self, genre: &str) -> Result<DocumentList<Book>> {
        self.list("list_by_genre", &[Query::search("genre", genre)]).await
    }

    pub async fn list_by_author(&self, author: &str) -> Result<DocumentList<Book>> {
        self.list("list_by_author", &[Query::search("author", author)]).await
    }

    pub async fn list_by_title(&self, title: &str) -> Result<DocumentList<Book>> {
        self.list("list_by_title", &[Query::search("title", title)]).await
    }

    /// Books whose title, author or genre match `term`
    pub async fn search(&self, term: &str) -> Result<DocumentList<Book>> {
        let query = Query::Or(vec![
            Query::search("title", term),
            Query::search("author", term),
            Query::search("genre", term),
        ]);
        self.list("search", &[query]).await
    }

    pub async fn get(&self, id: &str) -> Result<Book> {
        let document = self.documents.get_document(id).await.map_err(|e| {
            if !e.is_not_found() {
                error!(book_id = %id, error = %e, "Error fetching book");
            }
            book_not_found(e, id)
        })?;

        Book::try_from(document)
    }

    /// View URL for a stored cover. Built locally.
    pub fn image_preview(&self, image_id: Option<&str>) -> Option<String> {
        image_id
            .filter(|id| !id.is_empty())
            .map(|id| self.blobs.file_view_url(id))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn list(&self, operation: &'static str, queries: &[Query]) -> Result<DocumentList<Book>> {
        let raw = self.documents.list_documents(queries).await.map_err(|e| {
            error!(operation, error = %e, "Error listing books");
            e
        })?;

        Ok(into_books(operation, raw))
    }

    async fn upload_cover(&self, upload: CoverUpload) -> Result<String> {
        let file_id = unique_id();
        let stored = self.blobs.create_file(&file_id, upload).await.map_err(|e| {
            error!(error = %e, "Error uploading cover");
            e
        })?;

        debug!(file_id = %stored.id, size = stored.size, "Cover uploaded");
        Ok(stored.id)
    }

    async fn discard_cover(&self, file_id: &str, operation: &'static str) {
        if let Err(e) = self.blobs.delete_file(file_id).await {
            warn!(file_id = %file_id, operation, error = %e, "Error deleting cover");
            metrics::record_orphaned_blob(operation);
        }
    }
}

fn book_not_found(error: AppError, id: &str) -> AppError {
    if error.is_not_found() {
        AppError::BookNotFound { id: id.to_string() }
    } else {
        error
    }
}

/// Type a raw page, skipping documents that fail the schema boundary
fn into_books(operation: &str, raw: RawDocumentList) -> DocumentList<Book> {
    let documents = raw
        .documents
        .into_iter()
        .filter_map(|value: Value| match Book::try_from(value) {
            Ok(book) => Some(book),
            Err(e) => {
                warn!(operation, error = %e, "Skipping malformed book document");
                None
            }
        })
        .collect();

    DocumentList { total: raw.total, documents }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{InMemoryPlatform, Operation, PlatformCall};
    use serde_json::json;
    use tokio_test::assert_ok;

    fn setup() -> (Arc<InMemoryPlatform>, BookService) {
        let memory = Arc::new(InMemoryPlatform::new("covers-bucket").with_journal());
        let service = BookService::from_platform(&Platform::in_memory(memory.clone()));
        (memory, service)
    }

    fn new_book(title: &str, genre: &str, user_id: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Ursula K. Le Guin".to_string(),
            genre: genre.to_string(),
            description: "A story".to_string(),
            user_id: user_id.to_string(),
        }
    }

    fn cover() -> CoverUpload {
        CoverUpload {
            file_name: "cover.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        }
    }

    #[tokio::test]
    async fn test_create_uploads_cover_then_record() {
        let (memory, service) = setup();

        let book = service
            .create(new_book("A Wizard of Earthsea", "Fantasy", "u1"), Some(cover()))
            .await
            .unwrap();

        let calls = memory.calls();
        assert_eq!(calls.len(), 2);
        let file_id = match &calls[0] {
            PlatformCall::CreateFile { id, .. } => id.clone(),
            other => panic!("expected file upload first, got {:?}", other),
        };
        match &calls[1] {
            PlatformCall::CreateDocument { data, .. } => {
                assert_eq!(data["coverImageId"], file_id.as_str());
                assert_eq!(data["userId"], "u1");
            }
            other => panic!("expected record create second, got {:?}", other),
        }
        assert_eq!(book.cover_image_id.as_deref(), Some(file_id.as_str()));
    }

    #[tokio::test]
    async fn test_create_without_cover_skips_upload() {
        let (memory, service) = setup();
        let book = service.create(new_book("Lathe", "Sci-Fi", "u1"), None).await.unwrap();

        assert!(book.cover_image_id.is_none());
        assert_eq!(memory.calls().len(), 1);
        assert_eq!(memory.file_count(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_uploaded_cover() {
        let (memory, service) = setup();
        memory.fail(Operation::CreateDocument);

        let result = service.create(new_book("Orphan", "Other", "u1"), Some(cover())).await;
        assert!(result.is_err());
        assert_eq!(memory.file_count(), 1);
        assert_eq!(memory.document_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_creates_no_record() {
        let (memory, service) = setup();
        memory.fail(Operation::CreateFile);

        let result = service.create(new_book("No Cover", "Fantasy", "u1"), Some(cover())).await;
        assert!(result.is_err());
        assert_eq!(memory.document_count(), 0);
        assert_eq!(memory.file_count(), 0);
        assert!(memory
            .calls()
            .iter()
            .all(|call| !matches!(call, PlatformCall::CreateDocument { .. })));
    }

    #[tokio::test]
    async fn test_delete_removes_record_then_cover() {
        let (memory, service) = setup();
        let book = service
            .create(new_book("Tehanu", "Fantasy", "u1"), Some(cover()))
            .await
            .unwrap();
        let cover_id = book.cover_image_id.clone().unwrap();
        memory.clear_calls();

        assert_ok!(service.delete(&book.id).await);

        let calls = memory.calls();
        assert_eq!(
            calls,
            vec![
                PlatformCall::GetDocument { id: book.id.clone() },
                PlatformCall::DeleteDocument { id: book.id.clone() },
                PlatformCall::DeleteFile { id: cover_id.clone() },
            ]
        );
        assert!(!memory.has_file(&cover_id));
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_cover_delete_fails() {
        let (memory, service) = setup();
        let book = service
            .create(new_book("Tehanu", "Fantasy", "u1"), Some(cover()))
            .await
            .unwrap();
        memory.fail(Operation::DeleteFile);

        assert_ok!(service.delete(&book.id).await);
        assert_eq!(memory.document_count(), 0);
        assert_eq!(memory.file_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_book() {
        let (_memory, service) = setup();
        let err = service.delete("nope").await.unwrap_err();
        assert!(matches!(err, AppError::BookNotFound { ref id } if id == "nope"));
    }

    #[tokio::test]
    async fn test_list_by_genre_is_one_search_call() {
        let (memory, service) = setup();
        service.create(new_book("Earthsea", "Fantasy", "u1"), None).await.unwrap();
        service.create(new_book("Dispossessed", "Sci-Fi", "u2"), None).await.unwrap();
        memory.clear_calls();

        let list = service.list_by_genre("Fantasy").await.unwrap();

        assert_eq!(
            memory.calls(),
            vec![PlatformCall::ListDocuments {
                queries: vec![Query::search("genre", "Fantasy")]
            }]
        );
        assert_eq!(list.total, 1);
        assert_eq!(list.documents[0].title, "Earthsea");
    }

    #[tokio::test]
    async fn test_list_by_user_uses_equality() {
        let (memory, service) = setup();
        service.create(new_book("Mine", "Fantasy", "u1"), None).await.unwrap();
        service.create(new_book("Theirs", "Fantasy", "u2"), None).await.unwrap();
        memory.clear_calls();

        let list = service.list_by_user("u1").await.unwrap();
        assert_eq!(list.documents.len(), 1);
        assert_eq!(list.documents[0].user_id, "u1");
        assert_eq!(
            memory.calls(),
            vec![PlatformCall::ListDocuments { queries: vec![Query::equal("userId", "u1")] }]
        );
    }

    #[tokio::test]
    async fn test_search_spans_title_author_and_genre() {
        let (_memory, service) = setup();
        service.create(new_book("Earthsea", "Fantasy", "u1"), None).await.unwrap();
        service.create(new_book("Dispossessed", "Sci-Fi", "u1"), None).await.unwrap();

        assert_eq!(service.search("earth").await.unwrap().documents.len(), 1);
        assert_eq!(service.search("sci").await.unwrap().documents.len(), 1);
        assert_eq!(service.search("le guin").await.unwrap().documents.len(), 2);
    }

    #[tokio::test]
    async fn test_list_skips_malformed_documents() {
        let (memory, service) = setup();
        service.create(new_book("Earthsea", "Fantasy", "u1"), None).await.unwrap();
        memory.seed_document(json!({"$id": "broken", "genre": "Fantasy"}));

        let list = service.list_all().await.unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_get_malformed_document_errors() {
        let (memory, service) = setup();
        memory.seed_document(json!({"$id": "broken", "title": "No owner", "author": "x"}));

        let err = service.get("broken").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn test_list_errors_are_rethrown() {
        let (memory, service) = setup();
        memory.fail(Operation::ListDocuments);
        let err = service.list_all().await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_update_replaces_cover_even_when_old_delete_fails() {
        let (memory, service) = setup();
        let book = service
            .create(new_book("Earthsea", "Fantasy", "u1"), Some(cover()))
            .await
            .unwrap();
        let old_cover = book.cover_image_id.clone().unwrap();
        memory.fail(Operation::DeleteFile);
        memory.clear_calls();

        let patch = BookPatch {
            title: Some("A Wizard of Earthsea".into()),
            cover_image_id: Some(old_cover.clone()),
            ..Default::default()
        };
        let updated = service.update(&book.id, patch, Some(cover())).await.unwrap();

        let calls = memory.calls();
        assert_eq!(calls[0], PlatformCall::DeleteFile { id: old_cover.clone() });
        assert!(matches!(calls[1], PlatformCall::CreateFile { .. }));
        assert!(matches!(calls[2], PlatformCall::UpdateDocument { .. }));

        assert_eq!(updated.title, "A Wizard of Earthsea");
        assert_ne!(updated.cover_image_id.as_deref(), Some(old_cover.as_str()));
        assert!(updated.cover_image_id.is_some());
    }

    #[tokio::test]
    async fn test_update_without_cover_sends_only_patch() {
        let (memory, service) = setup();
        let book = service
            .create(new_book("Earthsea", "Fantasy", "u1"), Some(cover()))
            .await
            .unwrap();
        memory.clear_calls();

        let patch = BookPatch { genre: Some("Fiction".into()), ..Default::default() };
        let updated = service.update(&book.id, patch, None).await.unwrap();

        assert_eq!(updated.genre.as_deref(), Some("Fiction"));
        assert_eq!(updated.cover_image_id, book.cover_image_id);
        assert_eq!(
            memory.calls(),
            vec![PlatformCall::UpdateDocument {
                id: book.id.clone(),
                data: json!({"genre": "Fiction"})
            }]
        );
    }

    #[tokio::test]
    async fn test_update_missing_book() {
        let (_memory, service) = setup();
        let err = service
            .update("ghost", BookPatch::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookNotFound { .. }));
    }

    #[tokio::test]
    async fn test_image_preview_is_local() {
        let (memory, service) = setup();

        assert_eq!(service.image_preview(None), None);
        let url = service.image_preview(Some("abc123")).unwrap();
        assert!(url.contains("covers-bucket"));
        assert!(url.contains("abc123"));
        assert!(memory.calls().is_empty());
    }
}
