//! REST client for an Appwrite-compatible platform

use super::{BlobStore, DocumentStore, IdentityProvider, Query, RawDocumentList, StoredFile};
use crate::config::PlatformConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{CoverUpload, Session, User};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";
const SESSION_HEADER: &str = "X-Appwrite-Session";
const SERVICE: &str = "platform";

/// Error body returned by the platform
#[derive(Debug, Deserialize)]
struct PlatformErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Client for identity, documents and storage
pub struct AppwriteClient {
    http: reqwest::Client,
    config: PlatformConfig,
}

impl AppwriteClient {
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        if config.api_key.is_none() {
            tracing::warn!("platform.api_key is not set; logins will not yield a session token");
        }

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    fn documents_path(&self) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.config.database_id, self.config.books_collection_id
        )
    }

    fn files_path(&self) -> String {
        format!("/storage/buckets/{}/files", self.config.bucket_id)
    }

    /// Request made with the server key
    fn admin(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .http
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.config.project_id);

        match self.config.api_key {
            Some(ref key) => request.header(KEY_HEADER, key),
            None => request,
        }
    }

    /// Request made on behalf of a signed-in user
    fn as_session(&self, method: Method, path: &str, secret: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.config.project_id)
            .header(SESSION_HEADER, secret)
    }

    /// Send a request and map the platform's status codes onto [`AppError`]
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        resource: (&str, &str),
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        let outcome = request.send().await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                metrics::record_remote_call(SERVICE, operation, elapsed, false);
                tracing::error!(operation, error = %e, "Platform request failed");
                return Err(e.into());
            }
        };

        let status = response.status();
        metrics::record_remote_call(SERVICE, operation, elapsed, status.is_success());

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let parsed: Option<PlatformErrorBody> = serde_json::from_str(&body).ok();
        let message = parsed
            .as_ref()
            .map(|b| b.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or(body);

        tracing::error!(
            operation,
            status = status.as_u16(),
            kind = parsed.as_ref().map(|b| b.kind.as_str()).unwrap_or(""),
            error = %message,
            "Platform returned an error"
        );

        let (resource_type, id) = resource;
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            },
            StatusCode::UNAUTHORIZED => AppError::Unauthorized { message },
            StatusCode::FORBIDDEN => AppError::Forbidden { message },
            StatusCode::CONFLICT => AppError::Conflict { message },
            StatusCode::BAD_REQUEST => AppError::Validation { message, field: None },
            _ => AppError::Upstream { status: status.as_u16(), message },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        resource: (&str, &str),
    ) -> Result<T> {
        let response = self.send(operation, request, resource).await?;
        let value = response.json::<T>().await?;
        Ok(value)
    }
}

#[async_trait]
impl IdentityProvider for AppwriteClient {
    async fn create_account(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User> {
        let request = self.admin(Method::POST, "/account").json(&json!({
            "userId": user_id,
            "email": email,
            "password": password,
            "name": name,
        }));
        self.send_json("create_account", request, ("account", email)).await
    }

    async fn create_email_session(&self, email: &str, password: &str) -> Result<Session> {
        let request = self
            .admin(Method::POST, "/account/sessions/email")
            .json(&json!({ "email": email, "password": password }));
        self.send_json("create_session", request, ("account", email)).await
    }

    async fn delete_session(&self, secret: &str) -> Result<()> {
        let request = self.as_session(Method::DELETE, "/account/sessions/current", secret);
        self.send("delete_session", request, ("session", "current")).await?;
        Ok(())
    }

    async fn current_account(&self, secret: &str) -> Result<User> {
        let request = self.as_session(Method::GET, "/account", secret);
        self.send_json("get_account", request, ("account", "current")).await
    }
}

#[async_trait]
impl DocumentStore for AppwriteClient {
    async fn list_documents(&self, queries: &[Query]) -> Result<RawDocumentList> {
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|q| ("queries[]", q.to_json().to_string()))
            .collect();

        let request = self.admin(Method::GET, &self.documents_path()).query(&params);
        self.send_json("list_documents", request, ("collection", self.config.books_collection_id.as_str()))
            .await
    }

    async fn get_document(&self, id: &str) -> Result<Value> {
        let path = format!("{}/{}", self.documents_path(), id);
        let request = self.admin(Method::GET, &path);
        self.send_json("get_document", request, ("document", id)).await
    }

    async fn create_document(&self, id: &str, data: Value) -> Result<Value> {
        let request = self
            .admin(Method::POST, &self.documents_path())
            .json(&json!({ "documentId": id, "data": data }));
        self.send_json("create_document", request, ("document", id)).await
    }

    async fn update_document(&self, id: &str, data: Value) -> Result<Value> {
        let path = format!("{}/{}", self.documents_path(), id);
        let request = self.admin(Method::PATCH, &path).json(&json!({ "data": data }));
        self.send_json("update_document", request, ("document", id)).await
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let path = format!("{}/{}", self.documents_path(), id);
        let request = self.admin(Method::DELETE, &path);
        self.send("delete_document", request, ("document", id)).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for AppwriteClient {
    async fn create_file(&self, file_id: &str, upload: CoverUpload) -> Result<StoredFile> {
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;

        let form = reqwest::multipart::Form::new()
            .text("fileId", file_id.to_string())
            .part("file", part);

        let request = self.admin(Method::POST, &self.files_path()).multipart(form);
        self.send_json("create_file", request, ("file", file_id)).await
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let path = format!("{}/{}", self.files_path(), file_id);
        let request = self.admin(Method::DELETE, &path);
        self.send("delete_file", request, ("file", file_id)).await?;
        Ok(())
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!(
            "{}{}/{}/view?project={}",
            self.config.base_url(),
            self.files_path(),
            file_id,
            self.config.project_id
        )
    }
}
