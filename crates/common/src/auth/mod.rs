//! Request authentication
//!
//! Provides:
//! - Bearer token parsing
//! - The [`CurrentSession`] extractor, which builds a per-request
//!   [`SessionHolder`] and resolves it before the handler runs

use crate::config::AuthConfig;
use crate::errors::AppError;
use crate::platform::Platform;
use crate::session::SessionHolder;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, token) = auth_header.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Session token carried by a request, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
}

/// Resolved session for the current request.
///
/// Extraction never rejects: a missing or stale token yields an
/// anonymous session. Handlers call [`SessionHolder::require_user`]
/// where a login is needed.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Arc<SessionHolder>);

impl std::ops::Deref for CurrentSession {
    type Target = SessionHolder;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    Platform: FromRef<S>,
    AuthConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let platform = Platform::from_ref(state);
        let auth = AuthConfig::from_ref(state);

        let mut holder = SessionHolder::new(platform.identity).with_login_path(auth.login_path);
        if let Some(token) = bearer_token(&parts.headers) {
            holder = holder.with_token(token);
        }

        holder.check().await;
        Ok(CurrentSession(Arc::new(holder)))
    }
}
