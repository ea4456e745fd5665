//! In-process platform backend
//!
//! Keeps accounts, sessions, documents and files in memory. With
//! [`InMemoryPlatform::with_journal`] it also records every call it
//! receives. Individual operations can be forced to fail, which is how
//! the catalog's best-effort paths are exercised.

use super::{
    unique_id, BlobStore, DocumentStore, IdentityProvider, Query, RawDocumentList, StoredFile,
};
use crate::errors::{AppError, Result};
use crate::models::{CoverUpload, Session, User};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAccount,
    CreateSession,
    DeleteSession,
    CurrentAccount,
    ListDocuments,
    GetDocument,
    CreateDocument,
    UpdateDocument,
    DeleteDocument,
    CreateFile,
    DeleteFile,
}

/// Journal entry for one call received by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    CreateAccount { email: String },
    CreateSession { email: String },
    DeleteSession,
    CurrentAccount,
    ListDocuments { queries: Vec<Query> },
    GetDocument { id: String },
    CreateDocument { id: String, data: Value },
    UpdateDocument { id: String, data: Value },
    DeleteDocument { id: String },
    CreateFile { id: String, file_name: String },
    DeleteFile { id: String },
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, String>,
    /// Insertion ordered
    documents: Vec<Value>,
    files: HashMap<String, CoverUpload>,
    failing: HashSet<Operation>,
    /// `None` unless journaling was requested
    calls: Option<Vec<PlatformCall>>,
}

/// Platform backend held entirely in memory
pub struct InMemoryPlatform {
    bucket_id: String,
    state: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new(bucket_id: impl Into<String>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Record every call from now on, for inspection with [`Self::calls`]
    pub fn with_journal(self) -> Self {
        self.lock().calls = Some(Vec::new());
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `call` and fail if `operation` is marked as failing
    fn enter(&self, operation: Operation, call: PlatformCall) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        if let Some(calls) = state.calls.as_mut() {
            calls.push(call);
        }
        if state.failing.contains(&operation) {
            return Err(AppError::Upstream {
                status: 503,
                message: format!("{:?} is unavailable", operation),
            });
        }
        Ok(state)
    }

    /// Make every subsequent `operation` fail until [`Self::recover`]
    pub fn fail(&self, operation: Operation) {
        self.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.lock().failing.remove(&operation);
    }

    /// Calls received so far, oldest first. Empty without a journal.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone().unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Some(calls) = self.lock().calls.as_mut() {
            calls.clear();
        }
    }

    /// Insert a raw document as-is, bypassing the journal
    pub fn seed_document(&self, document: Value) {
        self.lock().documents.push(document);
    }

    pub fn has_file(&self, id: &str) -> bool {
        self.lock().files.contains_key(id)
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }
}

fn field_str<'a>(document: &'a Value, attribute: &str) -> Option<&'a str> {
    document.get(attribute).and_then(Value::as_str)
}

fn matches(document: &Value, query: &Query) -> bool {
    match query {
        Query::Equal { attribute, value } => field_str(document, attribute) == Some(value.as_str()),
        Query::Search { attribute, value } => field_str(document, attribute)
            .map(|field| field.to_lowercase().contains(&value.to_lowercase()))
            .unwrap_or(false),
        Query::Or(queries) => queries.iter().any(|q| matches(document, q)),
        Query::Limit(_) => true,
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn not_found(resource_type: &str, id: &str) -> AppError {
    AppError::NotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for InMemoryPlatform {
    async fn create_account(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User> {
        let mut state = self.enter(
            Operation::CreateAccount,
            PlatformCall::CreateAccount { email: email.to_string() },
        )?;

        if state.accounts.contains_key(email) {
            return Err(AppError::Conflict {
                message: format!("account {} already exists", email),
            });
        }

        let user = User {
            id: user_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        state.accounts.insert(
            email.to_string(),
            Account { user: user.clone(), password: password.to_string() },
        );
        Ok(user)
    }

    async fn create_email_session(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.enter(
            Operation::CreateSession,
            PlatformCall::CreateSession { email: email.to_string() },
        )?;

        let user_id = match state.accounts.get(email) {
            Some(account) if account.password == password => account.user.id.clone(),
            _ => {
                return Err(AppError::Unauthorized {
                    message: "Invalid credentials".to_string(),
                })
            }
        };

        let secret = unique_id();
        state.sessions.insert(secret.clone(), user_id.clone());

        Ok(Session {
            id: unique_id(),
            user_id,
            secret,
            expire: None,
        })
    }

    async fn delete_session(&self, secret: &str) -> Result<()> {
        let mut state = self.enter(Operation::DeleteSession, PlatformCall::DeleteSession)?;
        state
            .sessions
            .remove(secret)
            .map(|_| ())
            .ok_or_else(|| AppError::Unauthorized { message: "No active session".to_string() })
    }

    async fn current_account(&self, secret: &str) -> Result<User> {
        let state = self.enter(Operation::CurrentAccount, PlatformCall::CurrentAccount)?;
        let user_id = state
            .sessions
            .get(secret)
            .ok_or_else(|| AppError::Unauthorized { message: "No active session".to_string() })?;

        state
            .accounts
            .values()
            .find(|account| &account.user.id == user_id)
            .map(|account| account.user.clone())
            .ok_or_else(|| not_found("account", user_id))
    }
}

#[async_trait]
impl DocumentStore for InMemoryPlatform {
    async fn list_documents(&self, queries: &[Query]) -> Result<RawDocumentList> {
        let state = self.enter(
            Operation::ListDocuments,
            PlatformCall::ListDocuments { queries: queries.to_vec() },
        )?;

        let matching: Vec<Value> = state
            .documents
            .iter()
            .filter(|doc| queries.iter().all(|q| matches(doc, q)))
            .cloned()
            .collect();

        let total = matching.len() as u64;
        let limit = queries.iter().find_map(|q| match q {
            Query::Limit(limit) => Some(*limit as usize),
            _ => None,
        });

        let documents = match limit {
            Some(limit) => matching.into_iter().take(limit).collect(),
            None => matching,
        };

        Ok(RawDocumentList { total, documents })
    }

    async fn get_document(&self, id: &str) -> Result<Value> {
        let state = self.enter(
            Operation::GetDocument,
            PlatformCall::GetDocument { id: id.to_string() },
        )?;

        state
            .documents
            .iter()
            .find(|doc| field_str(doc, "$id") == Some(id))
            .cloned()
            .ok_or_else(|| not_found("document", id))
    }

    async fn create_document(&self, id: &str, data: Value) -> Result<Value> {
        let mut state = self.enter(
            Operation::CreateDocument,
            PlatformCall::CreateDocument { id: id.to_string(), data: data.clone() },
        )?;

        if state.documents.iter().any(|doc| field_str(doc, "$id") == Some(id)) {
            return Err(AppError::Conflict {
                message: format!("document {} already exists", id),
            });
        }

        let mut document = match data {
            Value::Object(map) => map,
            _ => {
                return Err(AppError::Validation {
                    message: "document data must be an object".to_string(),
                    field: None,
                })
            }
        };

        let timestamp = now();
        document.insert("$id".to_string(), Value::String(id.to_string()));
        document.insert("$createdAt".to_string(), Value::String(timestamp.clone()));
        document.insert("$updatedAt".to_string(), Value::String(timestamp));

        let document = Value::Object(document);
        state.documents.push(document.clone());
        Ok(document)
    }

    async fn update_document(&self, id: &str, data: Value) -> Result<Value> {
        let mut state = self.enter(
            Operation::UpdateDocument,
            PlatformCall::UpdateDocument { id: id.to_string(), data: data.clone() },
        )?;

        let document = state
            .documents
            .iter_mut()
            .find(|doc| field_str(doc, "$id") == Some(id))
            .ok_or_else(|| not_found("document", id))?;

        let changes: Map<String, Value> = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        if let Value::Object(fields) = &mut *document {
            for (key, value) in changes {
                fields.insert(key, value);
            }
            fields.insert("$updatedAt".to_string(), Value::String(now()));
        }

        Ok(document.clone())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut state = self.enter(
            Operation::DeleteDocument,
            PlatformCall::DeleteDocument { id: id.to_string() },
        )?;

        let before = state.documents.len();
        state.documents.retain(|doc| field_str(doc, "$id") != Some(id));
        if state.documents.len() == before {
            return Err(not_found("document", id));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for InMemoryPlatform {
    async fn create_file(&self, file_id: &str, upload: CoverUpload) -> Result<StoredFile> {
        let mut state = self.enter(
            Operation::CreateFile,
            PlatformCall::CreateFile {
                id: file_id.to_string(),
                file_name: upload.file_name.clone(),
            },
        )?;

        let stored = StoredFile {
            id: file_id.to_string(),
            bucket_id: self.bucket_id.clone(),
            name: upload.file_name.clone(),
            size: upload.bytes.len() as u64,
        };
        state.files.insert(file_id.to_string(), upload);
        Ok(stored)
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let mut state = self.enter(
            Operation::DeleteFile,
            PlatformCall::DeleteFile { id: file_id.to_string() },
        )?;

        state
            .files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| not_found("file", file_id))
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!("memory://storage/buckets/{}/files/{}/view", self.bucket_id, file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_sessions_follow_accounts() {
        let platform = InMemoryPlatform::new("covers");
        assert_ok!(platform.create_account("u1", "a@b.c", "password1", "Ada").await);
        assert_err!(platform.create_email_session("a@b.c", "wrong").await);

        let session = platform.create_email_session("a@b.c", "password1").await.unwrap();
        let user = platform.current_account(&session.secret).await.unwrap();
        assert_eq!(user.id, "u1");

        assert_ok!(platform.delete_session(&session.secret).await);
        assert_err!(platform.current_account(&session.secret).await);
    }

    #[tokio::test]
    async fn test_duplicate_account_conflicts() {
        let platform = InMemoryPlatform::new("covers");
        assert_ok!(platform.create_account("u1", "a@b.c", "password1", "Ada").await);
        let err = platform.create_account("u2", "a@b.c", "password2", "Ada").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let platform = InMemoryPlatform::new("covers");
        platform.seed_document(json!({"$id": "1", "genre": "Epic Fantasy"}));
        platform.seed_document(json!({"$id": "2", "genre": "History"}));

        let list = platform.list_documents(&[Query::search("genre", "fantasy")]).await.unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.documents[0]["$id"], "1");
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let platform = InMemoryPlatform::new("covers");
        platform
            .create_document("b1", json!({"title": "Old", "author": "A"}))
            .await
            .unwrap();
        let updated = platform.update_document("b1", json!({"title": "New"})).await.unwrap();
        assert_eq!(updated["title"], "New");
        assert_eq!(updated["author"], "A");
    }

    #[tokio::test]
    async fn test_failure_injection_is_journaled() {
        let platform = InMemoryPlatform::new("covers").with_journal();
        platform.fail(Operation::DeleteFile);
        assert_err!(platform.delete_file("x").await);
        assert_eq!(platform.calls(), vec![PlatformCall::DeleteFile { id: "x".into() }]);

        platform.recover(Operation::DeleteFile);
        let err = platform.delete_file("x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_journal_is_off_by_default() {
        let platform = InMemoryPlatform::new("covers");
        for _ in 0..100 {
            assert_ok!(platform.list_documents(&[]).await);
        }
        assert!(platform.calls().is_empty());
        assert!(platform.lock().calls.is_none());
    }
}
