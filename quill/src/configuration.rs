use cookie::Key;
use secrecy::{ExposeSecret, SecretString};
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::PathBuf;

use crate::session::SessionConfig;
use crate::web::body::BodySizeLimit;

#[derive(serde::Deserialize, Debug, Clone)]
/// The configuration object holding all the values required
/// to configure the application.
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cookie: CookieConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub body_size_limit: BodySizeLimit,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    /// Where the SQLite database file lives.
    pub path: PathBuf,
    /// Create the database file if it doesn't exist yet.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
    #[serde(
        default = "default_max_connections",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub max_connections: u32,
}

fn default_create_if_missing() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseConfig {
    /// Return the database connection options.
    pub fn connection_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(self.create_if_missing)
    }

    /// Return a database connection pool.
    pub async fn get_pool(&self) -> Result<SqlitePool, sqlx::Error> {
        SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(self.connection_options())
            .await
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
/// Configuration for cookie signing.
pub struct CookieConfig {
    /// The secret the signing key is derived from.
    ///
    /// It must be at least 32 bytes long.
    pub secret_key: SecretString,
}

impl CookieConfig {
    /// Derive the key used to sign and verify cookies.
    pub fn key(&self) -> Result<Key, InvalidSecretKey> {
        let secret = self.secret_key.expose_secret().as_bytes();
        if secret.len() < 32 {
            return Err(InvalidSecretKey { len: secret.len() });
        }
        Ok(Key::derive_from(secret))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("The cookie secret key must be at least 32 bytes long, but it is only {len} bytes long")]
pub struct InvalidSecretKey {
    len: usize,
}

#[derive(serde::Deserialize, Clone, Debug)]
/// The administrator account created at startup, if it doesn't exist already.
pub struct AdminConfig {
    #[serde(default = "default_admin_email")]
    pub email: String,
    #[serde(default = "default_admin_password")]
    pub password: SecretString,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            email: default_admin_email(),
            password: default_admin_password(),
        }
    }
}

fn default_admin_email() -> String {
    "admin@example.com".to_owned()
}

fn default_admin_password() -> SecretString {
    SecretString::from("admin")
}
