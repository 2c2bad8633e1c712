use cookie::Key;

use super::{SessionCookieConfig, SessionId};
use crate::web::cookie::Cookies;

/// The session id carried by the incoming request, if any.
///
/// Built using [`IncomingSession::extract`].
#[derive(Debug)]
pub struct IncomingSession {
    pub(crate) id: SessionId,
}

impl IncomingSession {
    /// Extract the session cookie from the incoming request, verifying its signature.
    ///
    /// Returns `None` if the cookie is missing, wasn't signed with `key`,
    /// or doesn't contain a well-formed session id.
    pub fn extract(cookies: &Cookies, config: &SessionCookieConfig, key: &Key) -> Option<Self> {
        let cookie = cookies.get_signed(&config.name, key)?;
        match cookie.value().parse::<SessionId>() {
            Ok(id) => Some(Self { id }),
            Err(e) => {
                tracing_log_error::log_error!(
                    e,
                    level: tracing::Level::WARN,
                    "Invalid session cookie, starting a new session."
                );
                None
            }
        }
    }
}
