//! Server-side HTTP sessions.
//!
//! The client receives a signed cookie holding a random session id.
//! Everything else (the logged-in user, the CSRF token, pending flash messages)
//! is stored server-side, in the `sessions` table.
mod config;
mod id;
mod incoming;
mod session_;
pub mod store;

pub use config::{SessionConfig, SessionCookieConfig, SessionCookieKind, SessionStateConfig};
pub use id::SessionId;
pub use incoming::IncomingSession;
pub use session_::{Session, SessionCookie, errors};
pub use store::SessionStore;
