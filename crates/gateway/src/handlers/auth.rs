//! Session handlers: login, registration, logout and the current user

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use bookshelf_common::{
    auth::CurrentSession,
    errors::{AppError, Result},
    models::User,
};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,

    /// When present, must match `password`
    #[serde(default)]
    pub confirm_password: Option<String>,
}

/// Issued session
#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: Option<User>,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub redirect: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub authenticated: bool,
    pub user: Option<User>,
}

async fn issued(session: &CurrentSession) -> Result<SessionResponse> {
    let token = session.token().await.ok_or_else(|| AppError::Internal {
        message: "session was created without a token".to_string(),
    })?;

    Ok(SessionResponse {
        token,
        user: session.user().await,
    })
}

/// Log in with email and password
pub async fn login(
    session: CurrentSession,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    request.validate()?;

    if !session.authenticate(&request.email, &request.password).await {
        return Err(AppError::InvalidCredentials);
    }

    Ok(Json(issued(&session).await?))
}

/// Create an account and log straight in
pub async fn register(
    session: CurrentSession,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    request.validate()?;

    if let Some(ref confirm) = request.confirm_password {
        if confirm != &request.password {
            return Err(AppError::Validation {
                message: "Passwords do not match".to_string(),
                field: Some("confirm_password".to_string()),
            });
        }
    }

    if !session
        .register(&request.email, &request.password, &request.name)
        .await
    {
        return Err(AppError::RegistrationFailed);
    }

    Ok((StatusCode::CREATED, Json(issued(&session).await?)))
}

/// End the current session
pub async fn logout(session: CurrentSession) -> Json<LogoutResponse> {
    Json(LogoutResponse {
        redirect: session.end_session().await,
    })
}

pub async fn me(session: CurrentSession) -> Json<MeResponse> {
    let user = session.user().await;
    Json(MeResponse {
        authenticated: user.is_some(),
        user,
    })
}
