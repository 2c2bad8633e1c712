use cookie::SameSite;

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure how sessions are stored and tracked.
pub struct SessionConfig {
    /// Configure the cookie used to carry the session id.
    #[serde(default)]
    pub cookie: SessionCookieConfig,
    /// Configure the server-side session records.
    #[serde(default)]
    pub state: SessionStateConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure the cookie used to store the session id on the client-side.
pub struct SessionCookieConfig {
    /// The name of the cookie used to store the session ID.
    ///
    /// By default, the name is set to `id`.
    #[serde(default = "default_session_cookie_name")]
    pub name: String,
    /// Set the `Domain` attribute on the session cookie.
    ///
    /// By default, the attribute is not set.
    #[serde(default)]
    pub domain: Option<String>,
    /// Set the `Path` attribute on the session cookie.
    ///
    /// By default, the attribute is set to `/`.
    #[serde(default = "default_session_cookie_path")]
    pub path: Option<String>,
    /// Set the `Secure` attribute on the session cookie.
    ///
    /// Secure cookies are only transmitted over HTTPS.
    ///
    /// Default is `true`.
    #[serde(default = "default_true")]
    pub secure: bool,
    /// Set the `HttpOnly` attribute on the session cookie.
    ///
    /// Default is `true`.
    #[serde(default = "default_true")]
    pub http_only: bool,
    /// Set the [`SameSite`] attribute on the session cookie.
    ///
    /// By default, the attribute is set to [`SameSite::Lax`].
    #[serde(default = "default_session_cookie_same_site")]
    #[serde(with = "same_site")]
    pub same_site: Option<SameSite>,
    /// The kind of session cookie to use.
    ///
    /// By default, it is set to [`SessionCookieKind::Persistent`].
    #[serde(default)]
    pub kind: SessionCookieKind,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: default_session_cookie_name(),
            domain: None,
            path: default_session_cookie_path(),
            secure: default_true(),
            http_only: default_true(),
            same_site: default_session_cookie_same_site(),
            kind: Default::default(),
        }
    }
}

fn default_session_cookie_name() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_cookie_path() -> Option<String> {
    Some("/".to_string())
}

fn default_session_cookie_same_site() -> Option<SameSite> {
    Some(SameSite::Lax)
}

/// The kind of cookie used to store the session id on the client-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCookieKind {
    /// The cookie is stored with an expiration date, set via the `Max-Age`
    /// attribute to the session TTL.
    #[default]
    Persistent,
    /// The cookie expires when the browser session ends.
    Session,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure the server-side session records.
pub struct SessionStateConfig {
    /// How long a session record stays valid after its last update.
    ///
    /// Written in a human-friendly format in configuration files, e.g. `"24h"`.
    /// Default is 24 hours.
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: std::time::Duration,
    /// The TTL of an existing record is only extended when less than this
    /// fraction of a fresh TTL is left.
    ///
    /// Default is `0.8`.
    #[serde(default = "default_ttl_extension_threshold")]
    pub ttl_extension_threshold: f32,
}

impl Default for SessionStateConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            ttl_extension_threshold: default_ttl_extension_threshold(),
        }
    }
}

fn default_ttl_extension_threshold() -> f32 {
    0.8
}

fn default_ttl() -> std::time::Duration {
    std::time::Duration::from_secs(60 * 60 * 24)
}

mod same_site {
    use cookie::SameSite;
    use serde::{Deserializer, de};
    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SameSite>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SameSiteVisitor;

        impl<'de> de::Visitor<'de> for SameSiteVisitor {
            type Value = Option<SameSite>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or null")
            }

            fn visit_str<E>(self, value: &str) -> Result<Option<SameSite>, E>
            where
                E: de::Error,
            {
                match value {
                    "Strict" | "strict" => Ok(Some(SameSite::Strict)),
                    "Lax" | "lax" => Ok(Some(SameSite::Lax)),
                    "None" | "none" => Ok(Some(SameSite::None)),
                    _ => Err(de::Error::unknown_variant(
                        value,
                        &["Strict", "Lax", "None"],
                    )),
                }
            }

            fn visit_none<E>(self) -> Result<Option<SameSite>, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Option<SameSite>, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Option<SameSite>, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_str(self)
            }
        }

        deserializer.deserialize_option(SameSiteVisitor)
    }
}
