//! Read and write posts.
use anyhow::Context;
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
}

/// A post that failed to be found.
#[derive(Debug, thiserror::Error)]
#[error("There is no post with id {post_id}")]
pub struct PostNotFound {
    pub post_id: i64,
}

#[tracing::instrument(name = "List posts", skip_all)]
pub async fn list_posts(pool: &SqlitePool) -> Result<Vec<Post>, anyhow::Error> {
    sqlx::query_as("SELECT id, title, content FROM post ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to retrieve posts")
}

#[tracing::instrument(name = "Get post", skip(pool))]
pub async fn get_post(pool: &SqlitePool, post_id: i64) -> Result<Option<Post>, anyhow::Error> {
    sqlx::query_as("SELECT id, title, content FROM post WHERE id = ?")
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .context("Failed to retrieve the post")
}

#[tracing::instrument(name = "Insert post", skip_all)]
pub async fn insert_post(
    pool: &SqlitePool,
    title: &str,
    content: &str,
) -> Result<i64, anyhow::Error> {
    let outcome = sqlx::query("INSERT INTO post (title, content) VALUES (?, ?)")
        .bind(title)
        .bind(content)
        .execute(pool)
        .await
        .context("Failed to insert a new post")?;
    Ok(outcome.last_insert_rowid())
}

/// Overwrite the title and content of an existing post.
#[tracing::instrument(name = "Update post", skip(pool, title, content))]
pub async fn update_post(
    pool: &SqlitePool,
    post_id: i64,
    title: &str,
    content: &str,
) -> Result<Result<(), PostNotFound>, anyhow::Error> {
    let outcome = sqlx::query("UPDATE post SET title = ?, content = ? WHERE id = ?")
        .bind(title)
        .bind(content)
        .bind(post_id)
        .execute(pool)
        .await
        .context("Failed to update the post")?;
    if outcome.rows_affected() == 0 {
        return Ok(Err(PostNotFound { post_id }));
    }
    Ok(Ok(()))
}

#[tracing::instrument(name = "Delete post", skip(pool))]
pub async fn delete_post(
    pool: &SqlitePool,
    post_id: i64,
) -> Result<Result<(), PostNotFound>, anyhow::Error> {
    let outcome = sqlx::query("DELETE FROM post WHERE id = ?")
        .bind(post_id)
        .execute(pool)
        .await
        .context("Failed to delete the post")?;
    if outcome.rows_affected() == 0 {
        return Ok(Err(PostNotFound { post_id }));
    }
    Ok(Ok(()))
}
