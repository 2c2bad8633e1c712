//! Hash user-provided passwords and check credentials against the stored digests.
//!
//! Passwords are stored as the hex-encoded SHA-256 digest of the plaintext,
//! without salt, to stay compatible with the existing user records.
use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Something went wrong when validating credentials")]
    UnexpectedError(#[source] anyhow::Error),
}

/// Compute the hex-encoded SHA-256 digest of a password.
pub fn compute_password_hash(password: &SecretString) -> String {
    hex::encode(Sha256::digest(password.expose_secret().as_bytes()))
}

#[tracing::instrument(name = "Validate credentials", skip_all)]
/// Look for a user with the given email address whose stored digest matches
/// the digest of the given password.
///
/// Unknown email addresses and wrong passwords are indistinguishable:
/// both yield [`AuthError::InvalidCredentials`].
pub async fn validate_credentials(
    email: &str,
    password: &SecretString,
    pool: &SqlitePool,
) -> Result<i64, AuthError> {
    let password_hash = compute_password_hash(password);
    let user_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM user WHERE email = ? AND password_hash = ?")
            .bind(email)
            .bind(password_hash)
            .fetch_optional(pool)
            .await
            .context("Failed to perform a query to retrieve stored credentials.")
            .map_err(AuthError::UnexpectedError)?;
    user_id.ok_or(AuthError::InvalidCredentials)
}
