use sqlx::{Pool, Sqlite};
use uuid::Uuid;
use crate::db::models::Account;
use crate::error::AppError;

pub struct UserRepository;

impl UserRepository {
    /// Inserts a new account. A duplicate email surfaces as `Conflict` from
    /// the unique index, so concurrent registrations cannot both succeed.
    pub async fn create(
        pool: &Pool<Sqlite>,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Account, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query_as::<_, Account>(
            r#"
INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::from_insert(e, "User already exists"))
    }

    pub async fn get_by_email(
        pool: &Pool<Sqlite>,
        email: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM users WHERE email = ?"
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    pub async fn get_by_id(
        pool: &Pool<Sqlite>,
        id: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM users WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Account>, AppError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM users ORDER BY created_at ASC, email ASC"
        )
        .fetch_all(pool)
        .await?;

        Ok(accounts)
    }
}
