//! Account registration and credential verification.

use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use crate::crypto::PasswordHasher;
use crate::db::{Account, UserRepository};
use crate::error::AppError;

/// Message for both unknown email and wrong password.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Clone)]
pub struct CredentialStore {
    db: Pool<Sqlite>,
    hasher: Arc<PasswordHasher>,
}

/// Lower-cased, trimmed email used as the login key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::Validation("Please add all fields".to_string()));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::Validation("Please enter a valid email".to_string()));
    };
    if local.is_empty() || domain.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("Please enter a valid email".to_string()));
    }

    Ok(())
}

impl CredentialStore {
    pub fn new(db: Pool<Sqlite>, hasher: Arc<PasswordHasher>) -> Self {
        CredentialStore { db, hasher }
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, AppError> {
        let name = name.trim();
        let email = normalize_email(email);
        validate_registration(name, &email, password)?;

        // Hashing is CPU bound; keep it off the async workers.
        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await??;

        let account = UserRepository::create(&self.db, name, &email, &password_hash).await?;
        tracing::info!(account_id = %account.id, "account registered");

        Ok(account)
    }

    pub async fn verify(&self, email: &str, password: &str) -> Result<Account, AppError> {
        let email = normalize_email(email);
        let account = UserRepository::get_by_email(&self.db, &email).await?;

        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let stored = account.as_ref().map(|a| a.password_hash.clone());

        let matched = tokio::task::spawn_blocking(move || match stored {
            Some(hash) => hasher.verify(&plaintext, &hash),
            None => Ok(hasher.verify_dummy(&plaintext)),
        })
        .await??;

        match account {
            Some(account) if matched => Ok(account),
            _ => {
                tracing::debug!("credential verification failed");
                Err(AppError::Auth(INVALID_CREDENTIALS.to_string()))
            }
        }
    }

    pub async fn find(&self, id: &str) -> Result<Option<Account>, AppError> {
        UserRepository::get_by_id(&self.db, id).await
    }

    pub async fn list(&self) -> Result<Vec<Account>, AppError> {
        UserRepository::list(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> CredentialStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrate(&pool).await.unwrap();
        CredentialStore::new(pool, Arc::new(PasswordHasher::new(1024, 1).unwrap()))
    }

    #[tokio::test]
    async fn register_then_verify() {
        let store = store().await;
        let account = store.register("Ada", "ada@x.com", "secret123").await.unwrap();
        assert_eq!(account.name, "Ada");
        assert_ne!(account.password_hash, "secret123");
        assert_eq!(account.created_at, account.updated_at);

        let verified = store.verify("ada@x.com", "secret123").await.unwrap();
        assert_eq!(verified.id, account.id);
    }

    #[tokio::test]
    async fn email_is_case_insensitive_login_key() {
        let store = store().await;
        store.register("Ada", "  Ada@X.com ", "secret123").await.unwrap();
        assert!(store.verify("ada@x.com", "secret123").await.is_ok());

        let err = store.register("Imposter", "ADA@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_identical() {
        let store = store().await;
        store.register("Ada", "ada@x.com", "secret123").await.unwrap();

        let wrong = store.verify("ada@x.com", "nope").await.unwrap_err();
        let unknown = store.verify("nobody@x.com", "secret123").await.unwrap_err();

        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, AppError::Auth(ref m) if m == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = store().await;
        store.register("Ada", "ada@x.com", "secret123").await.unwrap();
        let err = store.register("Ada again", "ada@x.com", "other").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let store = store().await;
        for (name, email, password) in [
            ("", "a@x.com", "pw"),
            ("   ", "a@x.com", "pw"),
            ("Ada", "", "pw"),
            ("Ada", "a@x.com", ""),
            ("Ada", "no-at-sign", "pw"),
        ] {
            let err = store.register(name, email, password).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{name:?} {email:?}");
        }
        assert!(store.list().await.unwrap().is_empty());
    }
}
