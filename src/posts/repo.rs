use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;

use super::repo_types::{NewPost, Post, PostUpdate};
use crate::pagination::{Page, SortOrder};

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> anyhow::Result<Post>;

    /// All posts of a user, newest first.
    async fn list_by_owner(&self, user_id: i64) -> anyhow::Result<Vec<Post>>;

    /// One page of a user's posts ordered by creation time.
    async fn list_page(
        &self,
        user_id: i64,
        page: Page,
        order: SortOrder,
    ) -> anyhow::Result<Vec<Post>>;

    /// Whether `post_id` exists and belongs to `user_id`.
    async fn is_owner(&self, post_id: i64, user_id: i64) -> anyhow::Result<bool> {
        let posts = self.list_by_owner(user_id).await?;
        Ok(posts.iter().any(|p| p.id == post_id))
    }

    /// Applies the provided fields; `None` if the post no longer exists.
    async fn update(&self, post_id: i64, changes: PostUpdate) -> anyhow::Result<Option<Post>>;

    async fn delete(&self, post_id: i64) -> anyhow::Result<()>;
}

pub struct PgPostStore {
    db: PgPool,
}

impl PgPostStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create(&self, post: NewPost) -> anyhow::Result<Post> {
        let row = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (user_id, picture, title, location_lat, location_long)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, picture, title, location_lat, location_long, created_at
            "#,
        )
        .bind(post.user_id)
        .bind(&post.picture)
        .bind(&post.title)
        .bind(post.location_lat)
        .bind(post.location_long)
        .fetch_one(&self.db)
        .await
        .context("insert post")?;
        Ok(row)
    }

    async fn list_by_owner(&self, user_id: i64) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, picture, title, location_lat, location_long, created_at
            FROM posts
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list posts by owner")?;
        Ok(rows)
    }

    async fn list_page(
        &self,
        user_id: i64,
        page: Page,
        order: SortOrder,
    ) -> anyhow::Result<Vec<Post>> {
        let dir = order.as_sql();
        let sql = format!(
            r#"
            SELECT id, user_id, picture, title, location_lat, location_long, created_at
            FROM posts
            WHERE user_id = $1
            ORDER BY created_at {dir}, id {dir}
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, Post>(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.db)
            .await
            .context("list posts page")?;
        Ok(rows)
    }

    async fn is_owner(&self, post_id: i64, user_id: i64) -> anyhow::Result<bool> {
        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1 AND user_id = $2)",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .context("check post ownership")?;
        Ok(owned)
    }

    async fn update(&self, post_id: i64, changes: PostUpdate) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET picture = COALESCE($2, picture),
                title = COALESCE($3, title),
                location_lat = COALESCE($4, location_lat),
                location_long = COALESCE($5, location_long)
            WHERE id = $1
            RETURNING id, user_id, picture, title, location_lat, location_long, created_at
            "#,
        )
        .bind(post_id)
        .bind(changes.picture)
        .bind(changes.title)
        .bind(changes.location_lat)
        .bind(changes.location_long)
        .fetch_optional(&self.db)
        .await
        .context("update post")?;
        Ok(row)
    }

    async fn delete(&self, post_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.db)
            .await
            .context("delete post")?;
        Ok(())
    }
}
