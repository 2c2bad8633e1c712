//! Prepare the database before the server starts accepting requests.
use anyhow::Context;
use sqlx::SqlitePool;

use crate::configuration::AdminConfig;
use crate::password::compute_password_hash;
use crate::session::SessionStore;

/// The application tables.
///
/// Every statement is idempotent: running them against an existing database is a no-op.
pub fn migration_query() -> &'static str {
    "CREATE TABLE IF NOT EXISTS post (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title VARCHAR(100) NOT NULL,
    content TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email VARCHAR(100) NOT NULL UNIQUE,
    password_hash VARCHAR(100) NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT FALSE
);"
}

/// Create the application tables and the sessions table, if they don't exist.
#[tracing::instrument(name = "Run database migrations", skip_all)]
pub async fn migrate(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    use sqlx::Executor as _;

    pool.execute(migration_query())
        .await
        .context("Failed to create the application tables")?;
    SessionStore::new(pool.clone())
        .migrate()
        .await
        .context("Failed to create the sessions table")?;
    Ok(())
}

/// Make sure the administrator account exists.
///
/// An existing account with the same email is left untouched.
#[tracing::instrument(name = "Seed the administrator account", skip_all, fields(admin.email = %admin.email))]
pub async fn seed_admin(pool: &SqlitePool, admin: &AdminConfig) -> Result<(), anyhow::Error> {
    let outcome = sqlx::query(
        "INSERT INTO user (email, password_hash, is_admin) VALUES (?, ?, TRUE) \
        ON CONFLICT(email) DO NOTHING",
    )
    .bind(&admin.email)
    .bind(compute_password_hash(&admin.password))
    .execute(pool)
    .await
    .context("Failed to insert the administrator account")?;
    if outcome.rows_affected() > 0 {
        tracing::info!("Created the administrator account");
    }
    Ok(())
}

/// Run the migrations, then seed the administrator account.
pub async fn bootstrap(pool: &SqlitePool, admin: &AdminConfig) -> Result<(), anyhow::Error> {
    migrate(pool).await?;
    seed_admin(pool, admin).await?;
    Ok(())
}
