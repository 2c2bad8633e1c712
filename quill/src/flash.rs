//! One-time messages carried across a redirect.
use crate::session::Session;
use crate::session::errors::{ServerGetError, ServerSetError};

const FLASHES_KEY: &str = "_flashes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

impl FlashMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("Failed to read the pending flash messages")]
    Get(#[from] ServerGetError),
    #[error("Failed to store a flash message")]
    Set(#[from] ServerSetError),
}

/// Queue a message, to be shown on the next rendered page.
pub async fn push(session: &mut Session<'_>, message: FlashMessage) -> Result<(), FlashError> {
    let mut pending: Vec<FlashMessage> = session.get(FLASHES_KEY).await?.unwrap_or_default();
    pending.push(message);
    session.insert(FLASHES_KEY, pending).await?;
    Ok(())
}

/// Drain all pending messages, oldest first.
pub async fn take(session: &mut Session<'_>) -> Result<Vec<FlashMessage>, FlashError> {
    Ok(session.remove(FLASHES_KEY).await?.unwrap_or_default())
}
