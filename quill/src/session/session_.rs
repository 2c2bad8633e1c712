use cookie::Cookie;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

use super::config::SessionCookieKind;
use super::incoming::IncomingSession;
use super::store::SessionRecordRef;
use super::store::errors::{ChangeIdError, DeleteError, LoadError, UpdateError, UpdateTtlError};
use super::{SessionConfig, SessionId, SessionStore};
use errors::{
    FinalizeError, ServerGetError, ServerSetError, SyncError, ValueDeserializationError,
    ValueSerializationError,
};

/// The current HTTP session.
///
/// The client only holds the session id, in a signed cookie.
/// All session values live server-side, in the [`SessionStore`], and are loaded lazily
/// on first access.
#[derive(Debug)]
pub struct Session<'store> {
    id: CurrentSessionId,
    /// The id carried by the incoming session cookie, if any.
    incoming_id: Option<SessionId>,
    server_state: ServerState,
    /// Set when the store has been written to, so the cookie expiry must follow.
    touched: bool,
    store: &'store SessionStore,
    config: &'store SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CurrentSessionId {
    Existing(SessionId),
    ToBeRenamed { old: SessionId, new: SessionId },
    NewlyGenerated(SessionId),
}

impl CurrentSessionId {
    fn new_id(&self) -> SessionId {
        match self {
            Self::Existing(id) => *id,
            Self::ToBeRenamed { new, .. } => *new,
            Self::NewlyGenerated(id) => *id,
        }
    }

    fn old_id(&self) -> Option<SessionId> {
        match self {
            Self::Existing(id) => Some(*id),
            Self::ToBeRenamed { old, .. } => Some(*old),
            Self::NewlyGenerated(..) => None,
        }
    }
}

#[derive(Debug)]
enum ServerState {
    NotLoaded,
    Unchanged {
        state: HashMap<String, Value>,
        ttl: std::time::Duration,
    },
    DoesNotExist,
    MarkedForDeletion,
    Changed {
        state: HashMap<String, Value>,
    },
}

/// What should happen to the session cookie on the client.
#[derive(Debug)]
pub enum SessionCookie {
    /// Set (or refresh) the session cookie. It must be signed before being sent.
    Set(Cookie<'static>),
    /// Remove the session cookie from the client.
    Remove(Cookie<'static>),
}

impl<'store> Session<'store> {
    /// Create a new HTTP session.
    ///
    /// It is a continuation of the existing session if there was a valid session cookie
    /// attached to the request.
    /// It is a brand-new session otherwise.
    pub fn new(
        store: &'store SessionStore,
        config: &'store SessionConfig,
        incoming_session: Option<IncomingSession>,
    ) -> Self {
        let incoming_id = incoming_session.map(|s| s.id);
        let (id, server_state) = match incoming_id {
            Some(id) => (CurrentSessionId::Existing(id), ServerState::NotLoaded),
            None => (
                CurrentSessionId::NewlyGenerated(SessionId::random()),
                ServerState::DoesNotExist,
            ),
        };
        Self {
            id,
            incoming_id,
            server_state,
            touched: false,
            store,
            config,
        }
    }

    /// Get the value stored under `key`, deserialized as `T`.
    pub async fn get<T: DeserializeOwned>(
        &mut self,
        key: &str,
    ) -> Result<Option<T>, ServerGetError> {
        let value = self.state().await?.and_then(|state| state.get(key)).cloned();
        Ok(value.map(|v| deserialize(key, v)).transpose()?)
    }

    /// Store `value` under `key`, returning the raw value it replaced.
    ///
    /// Sessions marked for deletion ignore writes.
    pub async fn insert<T: Serialize>(
        &mut self,
        key: &str,
        value: T,
    ) -> Result<Option<Value>, ServerSetError> {
        let value = serde_json::to_value(value).map_err(|source| ValueSerializationError {
            key: key.to_owned(),
            source,
        })?;
        Ok(self
            .state_mut()
            .await?
            .and_then(|state| state.insert(key.to_owned(), value)))
    }

    /// Remove the value stored under `key` and return it.
    pub async fn remove<T: DeserializeOwned>(
        &mut self,
        key: &str,
    ) -> Result<Option<T>, ServerGetError> {
        // A missing key must not turn an unchanged state into a changed one.
        if !self.state().await?.is_some_and(|state| state.contains_key(key)) {
            return Ok(None);
        }
        let value = self.state_mut().await?.and_then(|state| state.remove(key));
        Ok(value.map(|v| deserialize(key, v)).transpose()?)
    }

    /// The loaded server-side state, if there is one.
    async fn state(&mut self) -> Result<Option<&HashMap<String, Value>>, LoadError> {
        self.load().await?;
        match &self.server_state {
            ServerState::Unchanged { state, .. } | ServerState::Changed { state } => {
                Ok(Some(state))
            }
            ServerState::MarkedForDeletion => {
                tracing::debug!("Tried to read from a session marked for deletion");
                Ok(None)
            }
            ServerState::NotLoaded | ServerState::DoesNotExist => Ok(None),
        }
    }

    /// The server-side state, marked as changed so that the next sync writes it.
    async fn state_mut(&mut self) -> Result<Option<&mut HashMap<String, Value>>, LoadError> {
        self.load().await?;
        match &mut self.server_state {
            ServerState::MarkedForDeletion => {
                tracing::debug!("Tried to write to a session marked for deletion");
            }
            ServerState::DoesNotExist => {
                self.server_state = ServerState::Changed {
                    state: HashMap::new(),
                };
            }
            ServerState::Unchanged { state, .. } => {
                let state = std::mem::take(state);
                self.server_state = ServerState::Changed { state };
            }
            ServerState::NotLoaded | ServerState::Changed { .. } => {}
        }
        match &mut self.server_state {
            ServerState::Changed { state } => Ok(Some(state)),
            _ => Ok(None),
        }
    }

    /// Generate a new session identifier and attach it to this session.
    /// The session state is preserved.
    ///
    /// Call it whenever the privilege level of the session changes (e.g. on login)
    /// to prevent session fixation attacks.
    pub fn cycle_id(&mut self) {
        let new = SessionId::random();
        self.id = match self.id.old_id() {
            Some(old) => CurrentSessionId::ToBeRenamed { old, new },
            None => CurrentSessionId::NewlyGenerated(new),
        };
    }

    /// Invalidate the session.
    ///
    /// The server-side record will be deleted and the client-side cookie
    /// will be removed using a removal cookie.
    pub fn invalidate(&mut self) {
        self.server_state = ServerState::MarkedForDeletion;
    }

    /// Fetch the server-side state on first access.
    async fn load(&mut self) -> Result<(), LoadError> {
        if !matches!(self.server_state, ServerState::NotLoaded) {
            return Ok(());
        }
        let Some(session_id) = self.id.old_id() else {
            return Ok(());
        };
        self.server_state = match self.store.load(&session_id).await? {
            Some(r) => ServerState::Unchanged {
                state: r.state,
                ttl: r.ttl,
            },
            None => {
                // The record expired or was deleted. Carry on with a fresh session
                // rather than resurrecting the old id.
                tracing::debug!("The session cookie points to a missing record, starting a new session.");
                self.id = CurrentSessionId::NewlyGenerated(SessionId::random());
                ServerState::DoesNotExist
            }
        };
        Ok(())
    }

    /// Write the in-memory server-side state back to the store.
    async fn sync(&mut self) -> Result<(), SyncError> {
        let fresh_ttl = self.config.state.ttl;
        let server_state = std::mem::replace(&mut self.server_state, ServerState::DoesNotExist);
        self.server_state = match server_state {
            // Empty sessions are never persisted.
            ServerState::DoesNotExist => ServerState::DoesNotExist,
            ServerState::NotLoaded => match self.id {
                CurrentSessionId::Existing(_) => ServerState::NotLoaded,
                CurrentSessionId::ToBeRenamed { old, new } => {
                    match self.store.change_id(&old, &new).await {
                        Ok(()) => {
                            self.touched = true;
                            ServerState::NotLoaded
                        }
                        // Nothing to rename, the record expired mid-request.
                        Err(ChangeIdError::UnknownId(_)) => ServerState::DoesNotExist,
                        Err(e) => return Err(e.into()),
                    }
                }
                CurrentSessionId::NewlyGenerated(_) => {
                    unreachable!("A newly generated session cannot have a 'NotLoaded' server state.")
                }
            },
            ServerState::Unchanged { state, ttl } => match self.id {
                CurrentSessionId::Existing(id) => {
                    let threshold = fresh_ttl.mul_f32(self.config.state.ttl_extension_threshold);
                    if ttl < threshold {
                        match self.store.update_ttl(&id, fresh_ttl).await {
                            Ok(()) => self.touched = true,
                            Err(UpdateTtlError::UnknownId(_)) => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    ServerState::Unchanged { state, ttl }
                }
                CurrentSessionId::ToBeRenamed { old, new } => {
                    delete_if_exists(self.store, &old).await?;
                    self.create(&new, &state, fresh_ttl).await?;
                    ServerState::Unchanged {
                        state,
                        ttl: fresh_ttl,
                    }
                }
                CurrentSessionId::NewlyGenerated(_) => ServerState::Unchanged { state, ttl },
            },
            ServerState::MarkedForDeletion => {
                if let Some(id) = self.id.old_id() {
                    delete_if_exists(self.store, &id).await?;
                }
                ServerState::DoesNotExist
            }
            ServerState::Changed { state } => {
                match self.id {
                    CurrentSessionId::Existing(id) => {
                        let record = SessionRecordRef {
                            state: Cow::Borrowed(&state),
                            ttl: fresh_ttl,
                        };
                        match self.store.update(&id, record).await {
                            Ok(()) => {}
                            // The record expired since we loaded it: store it again.
                            Err(UpdateError::UnknownIdError(_)) => {
                                self.create(&id, &state, fresh_ttl).await?
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    CurrentSessionId::ToBeRenamed { old, new } => {
                        delete_if_exists(self.store, &old).await?;
                        self.create(&new, &state, fresh_ttl).await?;
                    }
                    CurrentSessionId::NewlyGenerated(id) => {
                        self.create(&id, &state, fresh_ttl).await?;
                    }
                }
                self.touched = true;
                ServerState::Unchanged {
                    state,
                    ttl: fresh_ttl,
                }
            }
        };
        Ok(())
    }

    async fn create(
        &self,
        id: &SessionId,
        state: &HashMap<String, Value>,
        ttl: std::time::Duration,
    ) -> Result<(), SyncError> {
        let record = SessionRecordRef {
            state: Cow::Borrowed(state),
            ttl,
        };
        self.store.create(id, record).await?;
        Ok(())
    }

    /// Sync the session with the store and determine what should happen to the
    /// session cookie on the client.
    ///
    /// Returns `None` if the cookie should be left untouched.
    pub async fn finalize(&mut self) -> Result<Option<SessionCookie>, FinalizeError> {
        self.sync().await?;

        let record_exists = match &self.server_state {
            ServerState::DoesNotExist => false,
            ServerState::NotLoaded | ServerState::Unchanged { .. } => true,
            ServerState::MarkedForDeletion | ServerState::Changed { .. } => {
                unreachable!("The server state has just been synchronized.")
            }
        };
        if !record_exists {
            return Ok(self.incoming_id.map(|_| SessionCookie::Remove(self.removal_cookie())));
        }
        let new_id = self.id.new_id();
        if self.incoming_id == Some(new_id) && !self.touched {
            return Ok(None);
        }
        Ok(Some(SessionCookie::Set(self.session_cookie(new_id))))
    }

    fn session_cookie(&self, id: SessionId) -> Cookie<'static> {
        let config = &self.config.cookie;
        let mut cookie = Cookie::build((config.name.clone(), id.to_string()))
            .secure(config.secure)
            .http_only(config.http_only);
        if let Some(domain) = config.domain.as_deref() {
            cookie = cookie.domain(domain.to_owned());
        }
        if let Some(path) = config.path.as_deref() {
            cookie = cookie.path(path.to_owned());
        }
        if let Some(same_site) = config.same_site {
            cookie = cookie.same_site(same_site);
        }
        if config.kind == SessionCookieKind::Persistent {
            let max_age = self
                .config
                .state
                .ttl
                .try_into()
                .unwrap_or(cookie::time::Duration::MAX);
            cookie = cookie.max_age(max_age);
        }
        cookie.build()
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        let config = &self.config.cookie;
        let mut cookie = Cookie::build(config.name.clone());
        if let Some(domain) = config.domain.as_deref() {
            cookie = cookie.domain(domain.to_owned());
        }
        if let Some(path) = config.path.as_deref() {
            cookie = cookie.path(path.to_owned());
        }
        cookie.build()
    }
}

fn deserialize<T: DeserializeOwned>(
    key: &str,
    value: Value,
) -> Result<T, ValueDeserializationError> {
    serde_json::from_value(value).map_err(|source| ValueDeserializationError {
        key: key.to_owned(),
        source,
    })
}

async fn delete_if_exists(store: &SessionStore, id: &SessionId) -> Result<(), DeleteError> {
    match store.delete(id).await {
        // Either way, no record is associated with this id anymore.
        Ok(()) | Err(DeleteError::UnknownId(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Errors that can occur when interacting with the session state.
pub mod errors {
    use crate::session::store::errors::{
        ChangeIdError, CreateError, DeleteError, LoadError, UpdateError, UpdateTtlError,
    };
    use crate::web::Response;

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned when writing the session state back to the store.
    pub enum SyncError {
        #[error("Failed to create a new session record")]
        CreateError(#[from] CreateError),
        #[error("Failed to update a session record")]
        UpdateError(#[from] UpdateError),
        #[error("Failed to delete a session record")]
        DeleteError(#[from] DeleteError),
        #[error("Failed to update the TTL for a session record")]
        UpdateTtlError(#[from] UpdateTtlError),
        #[error("Failed to change the session id for a session record")]
        ChangeIdError(#[from] ChangeIdError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`Session::get`][super::Session::get].
    pub enum ServerGetError {
        #[error("Failed to load the session record")]
        LoadError(#[from] LoadError),
        #[error(transparent)]
        DeserializationError(#[from] ValueDeserializationError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`Session::insert`][super::Session::insert].
    pub enum ServerSetError {
        #[error("Failed to load the session record")]
        LoadError(#[from] LoadError),
        #[error(transparent)]
        SerializationError(#[from] ValueSerializationError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    #[error("Failed to deserialize the value associated with `{key}`")]
    pub struct ValueDeserializationError {
        /// The key of the value that we failed to deserialize.
        pub key: String,
        #[source]
        pub source: serde_json::Error,
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    #[error("Failed to serialize the value associated with `{key}`")]
    pub struct ValueSerializationError {
        /// The key of the value that we failed to serialize.
        pub key: String,
        #[source]
        pub source: serde_json::Error,
    }

    /// The error returned by [`Session::finalize`][super::Session::finalize].
    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    pub enum FinalizeError {
        #[error("Failed to sync the server-side session state")]
        SyncErr(#[from] SyncError),
    }

    impl FinalizeError {
        /// Convert the error into a response.
        pub fn into_response(&self) -> Response {
            Response::internal_server_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionCookie};
    use crate::session::incoming::IncomingSession;
    use crate::session::{SessionConfig, SessionId, SessionStore};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SessionStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SessionStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn incoming(cookie: &Option<SessionCookie>) -> Option<IncomingSession> {
        match cookie {
            Some(SessionCookie::Set(c)) => Some(IncomingSession {
                id: c.value().parse().unwrap(),
            }),
            _ => None,
        }
    }

    #[tokio::test]
    async fn empty_sessions_are_not_persisted() {
        let (store, config) = (store().await, SessionConfig::default());
        let mut session = Session::new(&store, &config, None);
        assert_eq!(session.get::<i64>("user_id").await.unwrap(), None);
        assert!(session.finalize().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn values_survive_across_requests() {
        let (store, config) = (store().await, SessionConfig::default());

        let mut first = Session::new(&store, &config, None);
        first.insert("user_id", 42_i64).await.unwrap();
        let cookie = first.finalize().await.unwrap();
        let Some(SessionCookie::Set(set)) = &cookie else {
            panic!("Expected a session cookie");
        };
        assert_eq!(set.name(), "id");
        assert_eq!(set.path(), Some("/"));
        assert_eq!(set.http_only(), Some(true));

        let mut second = Session::new(&store, &config, incoming(&cookie));
        assert_eq!(second.get::<i64>("user_id").await.unwrap(), Some(42));
        // Reading doesn't require a new cookie.
        assert!(second.finalize().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cycling_the_id_keeps_the_state() {
        let (store, config) = (store().await, SessionConfig::default());

        let mut first = Session::new(&store, &config, None);
        first.insert("csrf_token", "token").await.unwrap();
        let first_cookie = first.finalize().await.unwrap();
        let old_id: SessionId = match &first_cookie {
            Some(SessionCookie::Set(c)) => c.value().parse().unwrap(),
            _ => panic!("Expected a session cookie"),
        };

        let mut second = Session::new(&store, &config, incoming(&first_cookie));
        second.cycle_id();
        second.insert("user_id", 1_i64).await.unwrap();
        let second_cookie = second.finalize().await.unwrap();
        let new_id: SessionId = match &second_cookie {
            Some(SessionCookie::Set(c)) => c.value().parse().unwrap(),
            _ => panic!("Expected a session cookie"),
        };
        assert_ne!(old_id, new_id);
        assert!(store.load(&old_id).await.unwrap().is_none());

        let mut third = Session::new(&store, &config, incoming(&second_cookie));
        assert_eq!(
            third.get::<String>("csrf_token").await.unwrap().as_deref(),
            Some("token")
        );
        assert_eq!(third.get::<i64>("user_id").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn invalidated_sessions_remove_the_cookie() {
        let (store, config) = (store().await, SessionConfig::default());

        let mut first = Session::new(&store, &config, None);
        first.insert("user_id", 7_i64).await.unwrap();
        let cookie = first.finalize().await.unwrap();

        let mut second = Session::new(&store, &config, incoming(&cookie));
        second.invalidate();
        let outcome = second.finalize().await.unwrap();
        assert!(matches!(outcome, Some(SessionCookie::Remove(_))));

        let mut third = Session::new(&store, &config, incoming(&cookie));
        assert_eq!(third.get::<i64>("user_id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn removing_a_value_is_persisted() {
        let (store, config) = (store().await, SessionConfig::default());

        let mut first = Session::new(&store, &config, None);
        first.insert("user_id", 7_i64).await.unwrap();
        first.insert("csrf_token", "token").await.unwrap();
        let cookie = first.finalize().await.unwrap();

        let mut second = Session::new(&store, &config, incoming(&cookie));
        assert_eq!(second.remove::<i64>("user_id").await.unwrap(), Some(7));
        second.finalize().await.unwrap();

        let mut third = Session::new(&store, &config, incoming(&cookie));
        assert_eq!(third.get::<i64>("user_id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cookies_pointing_to_missing_records_are_replaced() {
        let (store, config) = (store().await, SessionConfig::default());
        let stale = Some(IncomingSession {
            id: SessionId::random(),
        });

        let mut session = Session::new(&store, &config, stale);
        assert_eq!(session.get::<i64>("user_id").await.unwrap(), None);
        // Nothing to store: the stale cookie is removed.
        let outcome = session.finalize().await.unwrap();
        assert!(matches!(outcome, Some(SessionCookie::Remove(_))));
    }
}
