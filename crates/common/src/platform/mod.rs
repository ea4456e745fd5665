//! Hosted platform abstraction
//!
//! Three seams, one per managed service:
//! - [`IdentityProvider`]: accounts and email/password sessions
//! - [`DocumentStore`]: the catalog collection
//! - [`BlobStore`]: the cover image bucket
//!
//! [`AppwriteClient`] talks to the real service over REST,
//! [`InMemoryPlatform`] keeps everything in process.

mod appwrite;
mod memory;

pub use appwrite::AppwriteClient;
pub use memory::{InMemoryPlatform, Operation, PlatformCall};

use crate::config::{PlatformConfig, PlatformProvider};
use crate::errors::Result;
use crate::models::{CoverUpload, Session, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Query predicate understood by the document store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Exact match on a field
    Equal { attribute: String, value: String },
    /// Full-text match on an indexed field
    Search { attribute: String, value: String },
    /// Any of the nested predicates
    Or(Vec<Query>),
    /// Cap on the number of returned documents
    Limit(u32),
}

impl Query {
    pub fn equal(attribute: &str, value: impl Into<String>) -> Self {
        Query::Equal { attribute: attribute.to_string(), value: value.into() }
    }

    pub fn search(attribute: &str, value: impl Into<String>) -> Self {
        Query::Search { attribute: attribute.to_string(), value: value.into() }
    }

    /// JSON encoding used by the REST API
    pub fn to_json(&self) -> Value {
        match self {
            Query::Equal { attribute, value } => json!({
                "method": "equal",
                "attribute": attribute,
                "values": [value],
            }),
            Query::Search { attribute, value } => json!({
                "method": "search",
                "attribute": attribute,
                "values": [value],
            }),
            Query::Or(queries) => json!({
                "method": "or",
                "values": queries.iter().map(Query::to_json).collect::<Vec<_>>(),
            }),
            Query::Limit(limit) => json!({
                "method": "limit",
                "values": [limit],
            }),
        }
    }
}

/// Untyped page of documents; typed by the catalog layer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocumentList {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub documents: Vec<Value>,
}

/// Metadata of a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "bucketId", default)]
    pub bucket_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "sizeOriginal", default)]
    pub size: u64,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account
    async fn create_account(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User>;

    /// Exchange credentials for a session
    async fn create_email_session(&self, email: &str, password: &str) -> Result<Session>;

    /// Delete the session identified by `secret`
    async fn delete_session(&self, secret: &str) -> Result<()>;

    /// Fetch the account that owns `secret`
    async fn current_account(&self, secret: &str) -> Result<User>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self, queries: &[Query]) -> Result<RawDocumentList>;

    async fn get_document(&self, id: &str) -> Result<Value>;

    async fn create_document(&self, id: &str, data: Value) -> Result<Value>;

    async fn update_document(&self, id: &str, data: Value) -> Result<Value>;

    async fn delete_document(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn create_file(&self, file_id: &str, upload: CoverUpload) -> Result<StoredFile>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;

    /// URL that serves the file; built locally, never fetched
    fn file_view_url(&self, file_id: &str) -> String;
}

/// Generate an identifier accepted by the platform (32 hex chars)
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Handles to the three platform services
#[derive(Clone)]
pub struct Platform {
    pub identity: Arc<dyn IdentityProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Platform {
    /// Build the platform selected by configuration
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        match config.provider {
            PlatformProvider::Appwrite => {
                let client = Arc::new(AppwriteClient::new(config.clone())?);
                Ok(Self {
                    identity: client.clone(),
                    documents: client.clone(),
                    blobs: client,
                })
            }
            PlatformProvider::Memory => {
                tracing::warn!("Using in-memory platform, data is lost on restart");
                let bucket = if config.bucket_id.is_empty() {
                    "covers"
                } else {
                    config.bucket_id.as_str()
                };
                Ok(Self::in_memory(Arc::new(InMemoryPlatform::new(bucket))))
            }
        }
    }

    /// Wrap a shared in-memory backend
    pub fn in_memory(memory: Arc<InMemoryPlatform>) -> Self {
        Self {
            identity: memory.clone(),
            documents: memory.clone(),
            blobs: memory,
        }
    }

    /// Cheapest round trip to the document store
    pub async fn ping(&self) -> Result<()> {
        self.documents.list_documents(&[Query::Limit(1)]).await.map(|_| ())
    }
}
