//! Session holder
//!
//! An explicit context object tracking who the caller is. One holder is
//! built per request from the caller's session token and moves through
//! `Uninitialized -> Checking -> Resolved(user | none)`.
//!
//! `authenticate` and `register` never return errors: failures are logged
//! and reported as `false`.

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{Book, User};
use crate::platform::{unique_id, IdentityProvider};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Where the holder is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Checking,
    Resolved(Option<User>),
}

#[derive(Debug)]
struct Inner {
    token: Option<String>,
    state: SessionState,
}

pub struct SessionHolder {
    identity: Arc<dyn IdentityProvider>,
    login_path: String,
    inner: RwLock<Inner>,
}

impl SessionHolder {
    /// Holder with no session token
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            login_path: "/login".to_string(),
            inner: RwLock::new(Inner {
                token: None,
                state: SessionState::Uninitialized,
            }),
        }
    }

    /// Attach a token presented by the caller
    pub fn with_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        let mut inner = self.inner.into_inner();
        inner.token = if token.is_empty() { None } else { Some(token) };
        Self {
            identity: self.identity,
            login_path: self.login_path,
            inner: RwLock::new(inner),
        }
    }

    /// Route returned by [`Self::end_session`]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Resolve the current user from the held token.
    ///
    /// Identity failures resolve to "no user".
    pub async fn check(&self) -> Option<User> {
        let token = {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::Checking;
            inner.token.clone()
        };

        let user = match token {
            Some(ref secret) => match self.identity.current_account(secret).await {
                Ok(user) => Some(user),
                Err(e) => {
                    debug!(error = %e, "Session check found no current user");
                    None
                }
            },
            None => None,
        };

        let mut inner = self.inner.write().await;
        inner.state = SessionState::Resolved(user.clone());
        user
    }

    /// Log in with email and password
    pub async fn authenticate(&self, email: &str, password: &str) -> bool {
        let session = match self.identity.create_email_session(email, password).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Login failed");
                metrics::record_auth("login", false);
                return false;
            }
        };

        if session.secret.is_empty() {
            warn!(
                session_id = %session.id,
                "Login succeeded but no session secret was issued; is platform.api_key set?"
            );
            metrics::record_auth("login", false);
            return false;
        }

        {
            let mut inner = self.inner.write().await;
            inner.token = Some(session.secret);
        }

        self.check().await;
        metrics::record_auth("login", true);
        info!(user_id = %session.user_id, "User logged in");
        true
    }

    /// Create an account, then log in with the same credentials
    pub async fn register(&self, email: &str, password: &str, name: &str) -> bool {
        if let Err(e) = self
            .identity
            .create_account(&unique_id(), email, password, name)
            .await
        {
            warn!(error = %e, "Registration failed");
            metrics::record_auth("register", false);
            return false;
        }

        let ok = self.authenticate(email, password).await;
        if !ok {
            warn!("Registration failed: account created but login did not succeed");
        }
        metrics::record_auth("register", ok);
        ok
    }

    /// Delete the remote session and forget the local one.
    ///
    /// Returns the route the caller should be sent to.
    pub async fn end_session(&self) -> String {
        let token = {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::Resolved(None);
            inner.token.take()
        };

        if let Some(secret) = token {
            match self.identity.delete_session(&secret).await {
                Ok(()) => info!("Session ended"),
                Err(e) => warn!(error = %e, "Logout failed"),
            }
        }

        self.login_path.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    /// True until the first check has resolved
    pub async fn is_loading(&self) -> bool {
        matches!(
            self.inner.read().await.state,
            SessionState::Uninitialized | SessionState::Checking
        )
    }

    pub async fn user(&self) -> Option<User> {
        match self.inner.read().await.state {
            SessionState::Resolved(ref user) => user.clone(),
            _ => None,
        }
    }

    pub async fn user_id(&self) -> Option<String> {
        self.user().await.map(|user| user.id)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.user().await.is_some()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.read().await.token.clone()
    }

    /// The current user, or an error telling the caller to log in
    pub async fn require_user(&self) -> Result<User> {
        self.user().await.ok_or_else(|| AppError::Unauthorized {
            message: "You must be logged in to perform this action".to_string(),
        })
    }

    /// Whether the current user owns `book`
    pub async fn owns(&self, book: &Book) -> bool {
        match self.user().await {
            Some(user) => book.is_owned_by(&user.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHolder")
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{InMemoryPlatform, Operation, PlatformCall};

    fn identity() -> Arc<InMemoryPlatform> {
        Arc::new(InMemoryPlatform::new("covers").with_journal())
    }

    fn book_owned_by(user_id: &str) -> Book {
        Book {
            id: "b1".into(),
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            genre: Some("Sci-Fi".into()),
            description: None,
            cover_image_id: None,
            user_id: user_id.into(),
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_lifecycle_starts_loading() {
        let holder = SessionHolder::new(identity());
        assert!(holder.is_loading().await);
        assert_eq!(holder.state().await, SessionState::Uninitialized);

        assert!(holder.check().await.is_none());
        assert!(!holder.is_loading().await);
        assert_eq!(holder.state().await, SessionState::Resolved(None));
    }

    #[tokio::test]
    async fn test_register_then_authenticated() {
        let platform = identity();
        let holder = SessionHolder::new(platform.clone());

        assert!(holder.register("ada@example.com", "password1", "Ada").await);
        let user = holder.user().await.unwrap();
        assert_eq!(user.name, "Ada");
        assert!(holder.token().await.is_some());

        let calls = platform.calls();
        assert!(matches!(calls[0], PlatformCall::CreateAccount { .. }));
        assert!(matches!(calls[1], PlatformCall::CreateSession { .. }));
        assert_eq!(calls[2], PlatformCall::CurrentAccount);
    }

    #[tokio::test]
    async fn test_rejected_credentials_return_false() {
        let platform = identity();
        platform
            .create_account("u1", "ada@example.com", "password1", "Ada")
            .await
            .unwrap();

        let holder = SessionHolder::new(platform);
        assert!(!holder.authenticate("ada@example.com", "wrong-password").await);
        assert!(!holder.is_authenticated().await);
        assert!(holder.token().await.is_none());
    }

    #[tokio::test]
    async fn test_identity_outage_returns_false() {
        let platform = identity();
        platform.fail(Operation::CreateSession);

        let holder = SessionHolder::new(platform);
        assert!(!holder.authenticate("ada@example.com", "password1").await);
    }

    #[tokio::test]
    async fn test_duplicate_registration_returns_false() {
        let platform = identity();
        let first = SessionHolder::new(platform.clone());
        assert!(first.register("ada@example.com", "password1", "Ada").await);

        let second = SessionHolder::new(platform);
        assert!(!second.register("ada@example.com", "password2", "Ada").await);
    }

    #[tokio::test]
    async fn test_token_resolves_on_check() {
        let platform = identity();
        let holder = SessionHolder::new(platform.clone());
        assert!(holder.register("ada@example.com", "password1", "Ada").await);
        let token = holder.token().await.unwrap();

        let next_request = SessionHolder::new(platform).with_token(token);
        let user = next_request.check().await.unwrap();
        assert_eq!(user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_stale_token_resolves_anonymous() {
        let holder = SessionHolder::new(identity()).with_token("not-a-session");
        assert!(holder.check().await.is_none());
        assert!(holder.require_user().await.is_err());
    }

    #[tokio::test]
    async fn test_end_session_clears_and_redirects() {
        let platform = identity();
        let holder = SessionHolder::new(platform.clone()).with_login_path("/signin");
        assert!(holder.register("ada@example.com", "password1", "Ada").await);

        let target = holder.end_session().await;
        assert_eq!(target, "/signin");
        assert!(!holder.is_authenticated().await);
        assert!(holder.token().await.is_none());
        assert_eq!(platform.calls().last(), Some(&PlatformCall::DeleteSession));
    }

    #[tokio::test]
    async fn test_end_session_clears_even_when_remote_fails() {
        let platform = identity();
        let holder = SessionHolder::new(platform.clone());
        assert!(holder.register("ada@example.com", "password1", "Ada").await);
        platform.fail(Operation::DeleteSession);

        assert_eq!(holder.end_session().await, "/login");
        assert!(!holder.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_ownership_compares_user_ids() {
        let platform = identity();
        let holder = SessionHolder::new(platform);
        assert!(!holder.owns(&book_owned_by("anyone")).await);

        assert!(holder.register("ada@example.com", "password1", "Ada").await);
        let me = holder.user_id().await.unwrap();
        assert!(holder.owns(&book_owned_by(&me)).await);
        assert!(!holder.owns(&book_owned_by("someone-else")).await);
    }
}
