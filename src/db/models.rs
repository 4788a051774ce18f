use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::authz::Principal;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Principal for Account {
    fn principal_id(&self) -> &str {
        &self.id
    }

    fn principal_email(&self) -> &str {
        &self.email
    }
}

/// Flat row for a post joined with its owner.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOwner {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Principal for PostOwner {
    fn principal_id(&self) -> &str {
        &self.id
    }

    fn principal_email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Owner, populated with name and email.
    pub user: PostOwner,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            title: row.title,
            content: row.content,
            user: PostOwner {
                id: row.user_id,
                name: row.user_name,
                email: row.user_email,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
