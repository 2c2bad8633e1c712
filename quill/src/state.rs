use cookie::Key;
use sqlx::SqlitePool;

use crate::bootstrap::bootstrap;
use crate::configuration::{AppConfig, InvalidSecretKey};
use crate::routes::{RouteId, router};
use crate::session::{SessionConfig, SessionStore};
use crate::templates::{TemplateError, Templates};
use crate::web::body::BodySizeLimit;
use crate::web::router::{Router, RouterError};

/// Everything a request handler may need that outlives a single request.
///
/// It is built once, at startup, and shared by all connections.
#[derive(Debug)]
pub struct ApplicationState {
    pub pool: SqlitePool,
    pub session_store: SessionStore,
    pub session_config: SessionConfig,
    pub key: Key,
    pub templates: Templates,
    pub router: Router<RouteId>,
    pub body_size_limit: BodySizeLimit,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to connect to the database")]
    Database(#[source] sqlx::Error),
    #[error("Failed to prepare the database")]
    Bootstrap(#[source] anyhow::Error),
    #[error(transparent)]
    InvalidSecretKey(#[from] InvalidSecretKey),
    #[error(transparent)]
    Templates(#[from] TemplateError),
    #[error("Failed to build the routing table")]
    Router(#[source] RouterError),
}

/// Connect to the database, bring it up to date and assemble the application state.
pub async fn build_application_state(config: &AppConfig) -> Result<ApplicationState, BuildError> {
    let pool = config
        .database
        .get_pool()
        .await
        .map_err(BuildError::Database)?;
    ApplicationState::new(pool, config).await
}

impl ApplicationState {
    /// Assemble the application state on top of an existing connection pool.
    pub async fn new(pool: SqlitePool, config: &AppConfig) -> Result<Self, BuildError> {
        let key = config.cookie.key()?;
        bootstrap(&pool, &config.admin)
            .await
            .map_err(BuildError::Bootstrap)?;
        let session_store = SessionStore::new(pool.clone());
        match session_store.delete_expired().await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Deleted {n} expired session records"),
            // Stale records are never loaded, so there is no need to abort.
            Err(e) => tracing_log_error::log_error!(
                e,
                level: tracing::Level::WARN,
                "Failed to delete expired session records"
            ),
        }
        let templates = Templates::parse()?;
        let router = router().map_err(BuildError::Router)?;
        Ok(Self {
            session_store,
            pool,
            session_config: config.session.clone(),
            key,
            templates,
            router,
            body_size_limit: config.body_size_limit,
        })
    }
}
