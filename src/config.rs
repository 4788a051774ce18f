use std::str::FromStr;

use crate::error::AppError;

#[derive(Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    /// HS256 signing secret for session tokens. Required.
    pub jwt_secret: String,
    pub api_prefix: String,
    /// Allowed CORS origin. Permissive when unset.
    pub client_url: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub request_timeout_secs: u64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    /// Serve `GET /users` without authentication.
    pub public_user_directory: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .field("api_prefix", &self.api_prefix)
            .field("client_url", &self.client_url)
            .field("public_user_directory", &self.public_user_directory)
            .finish_non_exhaustive()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e)))
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_vars<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Config("JWT_SECRET must be set".to_string()))?;

        let mut api_prefix = lookup("API_PREFIX").unwrap_or_else(|| "/api/v1".to_string());
        if !api_prefix.starts_with('/') {
            api_prefix.insert(0, '/');
        }
        let api_prefix = api_prefix.trim_end_matches('/').to_string();

        let config = Config {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse_var(&lookup, "PORT", "8000")?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://quillpost.db?mode=rwc".to_string()),
            jwt_secret,
            api_prefix,
            client_url: lookup("CLIENT_URL").filter(|s| !s.trim().is_empty()),
            db_max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS", "20")?,
            db_min_connections: parse_var(&lookup, "DB_MIN_CONNECTIONS", "1")?,
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS", "30")?,
            argon2_memory_kib: parse_var(&lookup, "ARGON2_MEMORY_KIB", "19456")?,
            argon2_iterations: parse_var(&lookup, "ARGON2_ITERATIONS", "2")?,
            rate_limit_max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS", "100")?,
            rate_limit_window_secs: parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS", "60")?,
            public_user_directory: parse_var(&lookup, "PUBLIC_USER_DIRECTORY", "false")?,
        };

        if config.db_min_connections > config.db_max_connections {
            return Err(AppError::Config(
                "DB_MIN_CONNECTIONS exceeds DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
