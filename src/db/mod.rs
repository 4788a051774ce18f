pub mod models;
pub mod users;
pub mod posts;

pub use models::{Account, Post, PostOwner};
pub use users::UserRepository;
pub use posts::PostRepository;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::Config;
use crate::error::AppError;

/// Opens the pool described by `config`.
pub async fn connect(config: &Config) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn migrate(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
