use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::db::Account;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Returned by both registration and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub token: String,
}

impl SessionResponse {
    fn new(account: Account, token: String) -> Self {
        SessionResponse {
            id: account.id,
            name: account.name,
            email: account.email,
            token,
        }
    }
}

/// POST /users
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let account = state
        .credentials
        .register(&req.name, &req.email, &req.password)
        .await?;

    let token = state.tokens.issue(&account.id)?;

    Ok((StatusCode::CREATED, Json(SessionResponse::new(account, token))))
}

/// POST /users/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Please add all fields".to_string()));
    }

    let account = state.credentials.verify(&req.email, &req.password).await?;
    let token = state.tokens.issue(&account.id)?;

    tracing::info!(account_id = %account.id, "login succeeded");

    Ok(Json(SessionResponse::new(account, token)))
}

/// GET /users/me (requires auth via middleware)
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .credentials
        .find(&user.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    Ok(Json(account))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.credentials.list().await?))
}
