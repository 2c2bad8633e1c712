//! Read and write user accounts.
use anyhow::Context;
use secrecy::SecretString;
use sqlx::SqlitePool;

use crate::password::compute_password_hash;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InsertUserError {
    #[error("A user with this email already exists.")]
    DuplicateEmail,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

/// Register a new, non-admin, user.
///
/// Email uniqueness is enforced by the database: a constraint violation
/// is reported as [`InsertUserError::DuplicateEmail`].
#[tracing::instrument(name = "Insert user", skip(pool, password))]
pub async fn insert_user(
    pool: &SqlitePool,
    email: &str,
    password: &SecretString,
) -> Result<i64, InsertUserError> {
    let outcome = sqlx::query("INSERT INTO user (email, password_hash) VALUES (?, ?)")
        .bind(email)
        .bind(compute_password_hash(password))
        .execute(pool)
        .await;
    match outcome {
        Ok(outcome) => Ok(outcome.last_insert_rowid()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(InsertUserError::DuplicateEmail)
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context("Failed to insert a new user")
            .into()),
    }
}

#[tracing::instrument(name = "Find user by id", skip(pool))]
pub async fn find_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>, anyhow::Error> {
    sqlx::query_as("SELECT id, email, is_admin FROM user WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to retrieve the user")
}

#[tracing::instrument(name = "List users", skip_all)]
pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, anyhow::Error> {
    sqlx::query_as("SELECT id, email, is_admin FROM user ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to retrieve users")
}
