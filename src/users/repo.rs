use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::repo_types::{PublicUser, User};
use crate::pagination::Page;

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a public user with no profile picture.
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn update_profile_picture(&self, user_id: i64, url: &str) -> anyhow::Result<()>;

    async fn update_visibility(&self, user_id: i64, is_public: bool) -> anyhow::Result<()>;

    /// Public users other than `exclude_user_id`, ordered by username.
    /// `search` is a case-insensitive substring of the username.
    async fn list_public(
        &self,
        exclude_user_id: i64,
        search: Option<&str>,
        page: Page,
    ) -> anyhow::Result<Vec<PublicUser>>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, profile_picture, is_public, password)
            VALUES ($1, $2, NULL, TRUE, $3)
            RETURNING id, username, email, profile_picture, is_public, password
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                CreateUserError::DuplicateEmail
            }
            other => CreateUserError::Other(anyhow::Error::new(other).context("insert user")),
        })
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, profile_picture, is_public, password
            FROM users
            WHERE email = $1
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn update_profile_picture(&self, user_id: i64, url: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET profile_picture = $1 WHERE id = $2")
            .bind(url)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("update profile picture")?;
        Ok(())
    }

    async fn update_visibility(&self, user_id: i64, is_public: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_public = $1 WHERE id = $2")
            .bind(is_public)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("update visibility")?;
        Ok(())
    }

    async fn list_public(
        &self,
        exclude_user_id: i64,
        search: Option<&str>,
        page: Page,
    ) -> anyhow::Result<Vec<PublicUser>> {
        let pattern = search.map(|s| format!("%{}%", escape_like(s)));
        let rows = sqlx::query_as::<_, PublicUser>(
            r#"
            SELECT id, username, email, profile_picture, is_public
            FROM users
            WHERE is_public = TRUE
              AND id <> $1
              AND ($2::TEXT IS NULL OR username ILIKE $2)
            ORDER BY username COLLATE "C" ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(exclude_user_id)
        .bind(pattern)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await
        .context("list public users")?;
        Ok(rows)
    }
}

/// Escapes LIKE metacharacters so the search term matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
