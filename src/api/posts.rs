use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::authz::ensure_can_mutate;
use crate::db::{Post, PostRepository};
use crate::error::AppError;

const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 50_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Legacy field; when present it must name the caller.
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletePostResponse {
    pub id: String,
}

fn validate_post(title: &str, content: &str) -> Result<(), AppError> {
    if title.trim().is_empty() || content.trim().is_empty() {
        return Err(AppError::Validation("Please add all fields".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(AppError::Validation(format!(
            "Content must be at most {} characters",
            MAX_CONTENT_LEN
        )));
    }
    Ok(())
}

/// Loads the post and checks that `user` owns it.
async fn load_owned(state: &AppState, id: &str, user: &AuthUser) -> Result<Post, AppError> {
    let post = PostRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    ensure_can_mutate(&post.user, user)?;
    Ok(post)
}

/// GET /posts
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(PostRepository::list(&state.db).await?))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Post>, AppError> {
    let post = PostRepository::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    Ok(Json(post))
}

/// POST /posts (requires auth)
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_post(&req.title, &req.content)?;

    if let Some(claimed) = req.user_id.as_deref().filter(|id| !id.is_empty()) {
        if claimed != user.id {
            tracing::warn!(caller_id = %user.id, claimed_id = %claimed, "post created on behalf of another account");
            return Err(AppError::Forbidden(
                "Cannot create posts for another user".to_string(),
            ));
        }
    }

    let post = PostRepository::create(&state.db, &user.id, req.title.trim(), &req.content).await?;
    tracing::info!(post_id = %post.id, account_id = %user.id, "post created");

    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /posts/{id} (requires auth and ownership)
pub async fn update_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let existing = load_owned(&state, &id, &user).await?;

    let title = req.title.unwrap_or(existing.title);
    let content = req.content.unwrap_or(existing.content);
    validate_post(&title, &content)?;

    let post = PostRepository::update(&state.db, &id, title.trim(), &content).await?;
    tracing::info!(post_id = %post.id, account_id = %user.id, "post updated");

    Ok(Json(post))
}

/// DELETE /posts/{id} (requires auth and ownership)
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DeletePostResponse>, AppError> {
    load_owned(&state, &id, &user).await?;
    PostRepository::delete(&state.db, &id).await?;
    tracing::info!(post_id = %id, account_id = %user.id, "post deleted");

    Ok(Json(DeletePostResponse { id }))
}
