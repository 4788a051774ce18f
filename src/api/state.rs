use std::sync::Arc;
use sqlx::{Pool, Sqlite};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::crypto::{PasswordHasher, TokenService};
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub credentials: CredentialStore,
    pub tokens: Arc<TokenService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services from configuration. Fails on a missing signing key.
    pub fn new(db: Pool<Sqlite>, config: Arc<Config>) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(config.argon2_memory_kib, config.argon2_iterations)?;
        let tokens = TokenService::new(&config.jwt_secret)?;

        Ok(AppState {
            credentials: CredentialStore::new(db.clone(), Arc::new(hasher)),
            tokens: Arc::new(tokens),
            db,
            config,
        })
    }
}
