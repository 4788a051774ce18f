use sqlx::{Pool, Sqlite};
use uuid::Uuid;
use crate::db::models::{Post, PostRow};
use crate::error::AppError;

const SELECT_POST: &str = r#"
SELECT p.id, p.title, p.content, p.user_id,
       u.name AS user_name, u.email AS user_email,
       p.created_at, p.updated_at
FROM posts p
JOIN users u ON p.user_id = u.id
"#;

pub struct PostRepository;

impl PostRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        user_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Post, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
INSERT INTO posts (id, title, content, user_id, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(title)
        .bind(content)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        // Fetch with owner joined
        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created post".to_string()))
    }

    pub async fn get_by_id(
        pool: &Pool<Sqlite>,
        id: &str,
    ) -> Result<Option<Post>, AppError> {
        let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.id = ?", SELECT_POST))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(Post::from))
    }

    /// Newest first.
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "{} ORDER BY p.created_at DESC, p.rowid DESC",
            SELECT_POST
        ))
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: &str,
        title: &str,
        content: &str,
    ) -> Result<Post, AppError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE posts SET title = ?, content = ?, updated_at = ? WHERE id = ?"
        )
        .bind(title)
        .bind(content)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        Ok(())
    }
}
