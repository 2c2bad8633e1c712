//! A per-session token embedded in every form and checked on every submission.
use rand::Rng as _;

use crate::session::Session;
use crate::session::errors::{ServerGetError, ServerSetError};

const CSRF_TOKEN_KEY: &str = "csrf_token";

#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("Failed to read the CSRF token from the session")]
    Get(#[from] ServerGetError),
    #[error("Failed to store the CSRF token in the session")]
    Set(#[from] ServerSetError),
}

/// Return the CSRF token for this session, generating one if there is none yet.
pub async fn token(session: &mut Session<'_>) -> Result<String, CsrfError> {
    if let Some(token) = session.get::<String>(CSRF_TOKEN_KEY).await? {
        return Ok(token);
    }
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    let token = hex::encode(bytes);
    session.insert(CSRF_TOKEN_KEY, &token).await?;
    Ok(token)
}

/// Check a submitted token against the one stored in the session.
///
/// A session without a token never matches.
/// The comparison runs in constant time.
pub async fn verify(session: &mut Session<'_>, submitted: &str) -> Result<bool, CsrfError> {
    let expected = session.get::<String>(CSRF_TOKEN_KEY).await?;
    Ok(expected
        .is_some_and(|expected| !submitted.is_empty() && tokens_match(&expected, submitted)))
}

fn tokens_match(expected: &str, submitted: &str) -> bool {
    use subtle::ConstantTimeEq as _;

    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}
