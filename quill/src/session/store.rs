//! Server-side session records, stored in SQLite.
use super::SessionId;
use errors::{
    ChangeIdError, CreateError, DeleteError, DeleteExpiredError, DuplicateIdError, LoadError,
    UnknownIdError, UpdateError, UpdateTtlError,
};
use jiff::Timestamp;
use serde_json::Value;
use sqlx::{
    SqlitePool,
    error::DatabaseError as _,
    sqlite::{SqliteError, SqliteQueryResult},
};
use std::{borrow::Cow, collections::HashMap};

#[derive(Debug, Clone)]
/// Where server-side session records are stored.
///
/// All session records live in a single `sessions` table, with the state
/// serialized as JSON text. Use [`migrate`](Self::migrate) to create the
/// table and its index.
pub struct SessionStore(SqlitePool);

impl SessionStore {
    /// Creates a new session store on top of the provided pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }

    /// Return the query used to create the sessions table and index.
    ///
    /// The query is idempotent: if the table and index already exist, it does nothing.
    pub fn migration_query() -> &'static str {
        "CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    deadline INTEGER NOT NULL,
    state TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_deadline ON sessions(deadline);"
    }

    /// Create the sessions table and index in the database.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        use sqlx::Executor as _;

        self.0.execute(Self::migration_query()).await?;
        Ok(())
    }

    /// Creates a new session record in the store using the provided ID.
    #[tracing::instrument(name = "Create server-side session record", level = tracing::Level::INFO, skip_all)]
    pub async fn create(
        &self,
        id: &SessionId,
        record: SessionRecordRef<'_>,
    ) -> Result<(), CreateError> {
        let deadline = Timestamp::now() + record.ttl;
        let state = serde_json::to_string(&record.state)?;
        // Expired records with the same id can be overwritten.
        let query = sqlx::query(
            "INSERT INTO sessions (id, deadline, state) \
            VALUES (?, ?, ?) \
            ON CONFLICT(id) DO UPDATE \
            SET deadline = excluded.deadline, state = excluded.state \
            WHERE sessions.deadline < unixepoch()",
        )
        .bind(id.inner().to_string())
        .bind(deadline.as_second())
        .bind(state);

        match query.execute(&self.0).await {
            // An upsert that doesn't touch any row means the id is taken by a live session.
            Ok(r) if r.rows_affected() == 0 => Err(DuplicateIdError { id: *id }.into()),
            Ok(_) => Ok(()),
            Err(e) => match as_duplicated_id_error(&e, id) {
                Err(e) => Err(e.into()),
                Ok(()) => Err(CreateError::Other(e.into())),
            },
        }
    }

    /// Overwrites the state of an existing session record.
    #[tracing::instrument(name = "Update server-side session record", level = tracing::Level::INFO, skip_all)]
    pub async fn update(
        &self,
        id: &SessionId,
        record: SessionRecordRef<'_>,
    ) -> Result<(), UpdateError> {
        let new_deadline = Timestamp::now() + record.ttl;
        let new_state = serde_json::to_string(&record.state)?;
        let query = sqlx::query(
            "UPDATE sessions \
            SET deadline = ?, state = ? \
            WHERE id = ? AND deadline > unixepoch()",
        )
        .bind(new_deadline.as_second())
        .bind(new_state)
        .bind(id.inner().to_string());

        match query.execute(&self.0).await {
            Ok(r) => as_unknown_id_error(&r, id).map_err(Into::into),
            Err(e) => Err(UpdateError::Other(e.into())),
        }
    }

    /// Update the TTL of an existing session record, leaving its state unchanged.
    #[tracing::instrument(name = "Update TTL for server-side session record", level = tracing::Level::INFO, skip_all)]
    pub async fn update_ttl(
        &self,
        id: &SessionId,
        ttl: std::time::Duration,
    ) -> Result<(), UpdateTtlError> {
        let new_deadline = Timestamp::now() + ttl;
        let query = sqlx::query(
            "UPDATE sessions \
            SET deadline = ? \
            WHERE id = ? AND deadline > unixepoch()",
        )
        .bind(new_deadline.as_second())
        .bind(id.inner().to_string());
        match query.execute(&self.0).await {
            Ok(r) => as_unknown_id_error(&r, id).map_err(Into::into),
            Err(e) => Err(UpdateTtlError::Other(e.into())),
        }
    }

    /// Returns `None` if the session does not exist or has expired.
    #[tracing::instrument(name = "Load server-side session record", level = tracing::Level::INFO, skip_all)]
    pub async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, LoadError> {
        let row = sqlx::query(
            "SELECT deadline, state \
            FROM sessions \
            WHERE id = ? AND deadline > unixepoch()",
        )
        .bind(session_id.inner().to_string())
        .fetch_optional(&self.0)
        .await
        .map_err(|e| LoadError::Other(e.into()))?;
        row.map(|r| {
            use anyhow::Context as _;
            use sqlx::Row as _;

            let deadline_unix: i64 = r
                .try_get(0)
                .context("Failed to deserialize the retrieved session deadline")
                .map_err(LoadError::DeserializationError)?;
            let deadline = Timestamp::from_second(deadline_unix)
                .context("Failed to parse the retrieved session deadline")
                .map_err(LoadError::DeserializationError)?;
            let state: String = r
                .try_get(1)
                .context("Failed to deserialize the retrieved session state")
                .map_err(LoadError::DeserializationError)?;
            let ttl = Timestamp::now().duration_until(deadline);
            Ok(SessionRecord {
                // Only fails if the deadline has passed since the query ran.
                ttl: ttl.try_into().unwrap_or(std::time::Duration::ZERO),
                state: serde_json::from_str(&state)
                    .context("Failed to deserialize the retrieved session state")
                    .map_err(LoadError::DeserializationError)?,
            })
        })
        .transpose()
    }

    #[tracing::instrument(name = "Delete server-side session record", level = tracing::Level::INFO, skip_all)]
    pub async fn delete(&self, id: &SessionId) -> Result<(), DeleteError> {
        let query = sqlx::query(
            "DELETE FROM sessions \
            WHERE id = ? AND deadline > unixepoch()",
        )
        .bind(id.inner().to_string());
        match query.execute(&self.0).await {
            Ok(r) => as_unknown_id_error(&r, id).map_err(Into::into),
            Err(e) => Err(DeleteError::Other(e.into())),
        }
    }

    /// Change the session id associated with an existing session record.
    #[tracing::instrument(name = "Change id for server-side session record", level = tracing::Level::INFO, skip_all)]
    pub async fn change_id(
        &self,
        old_id: &SessionId,
        new_id: &SessionId,
    ) -> Result<(), ChangeIdError> {
        let query = sqlx::query(
            "UPDATE sessions \
            SET id = ? \
            WHERE id = ? AND deadline > unixepoch()",
        )
        .bind(new_id.inner().to_string())
        .bind(old_id.inner().to_string());
        match query.execute(&self.0).await {
            Ok(r) => as_unknown_id_error(&r, old_id).map_err(Into::into),
            Err(e) => match as_duplicated_id_error(&e, new_id) {
                Err(e) => Err(e.into()),
                Ok(()) => Err(ChangeIdError::Other(e.into())),
            },
        }
    }

    /// Returns the number of deleted records.
    #[tracing::instrument(name = "Delete expired server-side session records", level = tracing::Level::INFO, skip_all)]
    pub async fn delete_expired(&self) -> Result<usize, DeleteExpiredError> {
        let r = sqlx::query("DELETE FROM sessions WHERE deadline < unixepoch()")
            .execute(&self.0)
            .await
            .map_err(|e| DeleteExpiredError::from(anyhow::Error::from(e)))?;
        Ok(r.rows_affected().try_into().unwrap_or(usize::MAX))
    }
}

/// A server-side session record that's going to be written to the store.
#[derive(Debug)]
pub struct SessionRecordRef<'session> {
    /// The set of key-value pairs attached to a session.
    pub state: Cow<'session, HashMap<String, Value>>,
    /// The session time-to-live.
    pub ttl: std::time::Duration,
}

/// A server-side session record that was retrieved from the store.
#[derive(Debug)]
pub struct SessionRecord {
    /// The set of key-value pairs attached to a session.
    pub state: HashMap<String, Value>,
    /// The time left before the record expires.
    pub ttl: std::time::Duration,
}

/// Errors that can occur when interacting with a session storage backend.
pub mod errors {
    use crate::session::SessionId;

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStore::create`][super::SessionStore::create].
    pub enum CreateError {
        #[error("Failed to serialize the session state.")]
        SerializationError(#[from] serde_json::Error),
        #[error(transparent)]
        DuplicateId(#[from] DuplicateIdError),
        #[error("Something went wrong when creating a new session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStore::update`][super::SessionStore::update].
    pub enum UpdateError {
        #[error("Failed to serialize the session state.")]
        SerializationError(#[from] serde_json::Error),
        #[error(transparent)]
        UnknownIdError(#[from] UnknownIdError),
        #[error("Something went wrong when updating the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStore::update_ttl`][super::SessionStore::update_ttl].
    pub enum UpdateTtlError {
        #[error(transparent)]
        UnknownId(#[from] UnknownIdError),
        #[error("Something went wrong when updating the TTL of the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStore::load`][super::SessionStore::load].
    pub enum LoadError {
        #[error("Failed to deserialize the session state.")]
        DeserializationError(#[source] anyhow::Error),
        #[error("Something went wrong when loading the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStore::delete`][super::SessionStore::delete].
    pub enum DeleteError {
        #[error(transparent)]
        UnknownId(#[from] UnknownIdError),
        #[error("Something went wrong when deleting the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStore::change_id`][super::SessionStore::change_id].
    pub enum ChangeIdError {
        #[error(transparent)]
        UnknownId(#[from] UnknownIdError),
        #[error(transparent)]
        DuplicateId(#[from] DuplicateIdError),
        #[error("Something went wrong when changing the session id for a session record.")]
        Other(#[source] anyhow::Error),
    }

    #[derive(Debug, thiserror::Error)]
    #[error("Something went wrong when deleting expired sessions")]
    /// The error returned by [`SessionStore::delete_expired`][super::SessionStore::delete_expired].
    pub struct DeleteExpiredError(#[from] anyhow::Error);

    #[derive(Debug, thiserror::Error)]
    #[error("There is no session with the given id")]
    pub struct UnknownIdError {
        pub id: SessionId,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("A session with the same ID already exists.")]
    pub struct DuplicateIdError {
        pub id: SessionId,
    }
}

fn as_duplicated_id_error(e: &sqlx::Error, id: &SessionId) -> Result<(), DuplicateIdError> {
    if let Some(e) = e.as_database_error() {
        if let Some(e) = e.try_downcast_ref::<SqliteError>() {
            // SQLITE_CONSTRAINT_PRIMARYKEY
            if e.code().as_deref() == Some("1555") {
                return Err(DuplicateIdError { id: *id });
            }
        }
    }
    Ok(())
}

fn as_unknown_id_error(r: &SqliteQueryResult, id: &SessionId) -> Result<(), UnknownIdError> {
    if r.rows_affected() == 0 {
        return Err(UnknownIdError { id: *id });
    }
    Ok(())
}
