use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad credentials. The message is deliberately vague.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not authorized")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Maps a unique-constraint violation to `Conflict`, everything else to `Database`.
    pub fn from_insert(err: sqlx::Error, conflict_message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(conflict_message.to_string())
            }
            _ => AppError::Database(err),
        }
    }

    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::Auth(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Crypto(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", err))
    }
}

// Axum IntoResponse implementation for HTTP errors
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        let message = match self {
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg,
            AppError::Unauthenticated => "Not authorized".to_string(),
            AppError::RateLimited => "Too many requests, try again later".to_string(),
            other => {
                // Server-side detail stays in the logs.
                tracing::error!(error = %other, "request failed");
                "Something went wrong, please try again".to_string()
            }
        };

        let body = serde_json::json!({
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
