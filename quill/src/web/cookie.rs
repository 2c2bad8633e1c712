//! Request cookies and the `Set-Cookie` headers we send back.
use cookie::{Cookie, CookieJar, Key};
use http::HeaderValue;
use http::header::{COOKIE, SET_COOKIE};

use super::{RequestHead, Response};

/// The cookies attached to an incoming request, plus the changes we want
/// to send back to the client.
///
/// Cookies parsed from the request are treated as "original" cookies: only
/// the cookies added or removed while handling the request end up in the
/// `Set-Cookie` headers of the response.
#[derive(Debug)]
pub struct Cookies {
    jar: CookieJar,
}

impl Cookies {
    /// Parse the `Cookie` headers of the incoming request.
    ///
    /// Malformed cookies are silently skipped.
    pub fn from_request_head(head: &RequestHead) -> Self {
        let mut jar = CookieJar::new();
        head.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok)
            .for_each(|c| jar.add_original(c.into_owned()));
        Cookies { jar }
    }

    /// Get a cookie by name, without checking its signature.
    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.jar.get(name)
    }

    /// Get a cookie by name, verifying its signature with `key`.
    ///
    /// Returns `None` if the cookie is missing or if it wasn't signed with `key`.
    pub fn get_signed(&self, name: &str, key: &Key) -> Option<Cookie<'static>> {
        self.jar.signed(key).get(name)
    }

    /// Sign the cookie with `key` and queue it for the response.
    pub fn add_signed(&mut self, cookie: Cookie<'static>, key: &Key) {
        self.jar.signed_mut(key).add(cookie)
    }

    /// Remove a cookie.
    ///
    /// If the cookie was sent by the client, a removal cookie is queued for the response.
    /// Path and domain must match the ones the cookie was originally set with.
    pub fn remove(&mut self, cookie: Cookie<'static>) {
        self.jar.remove(cookie)
    }

    /// Attach a `Set-Cookie` header to the response for every cookie that changed.
    pub fn apply_delta(&self, mut response: Response) -> Response {
        for delta in self.jar.delta() {
            match HeaderValue::from_str(&delta.encoded().to_string()) {
                Ok(value) => response = response.append_header(SET_COOKIE, value),
                Err(e) => {
                    tracing::warn!(warning = "Ignoring bad cookie.", context = %e);
                }
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::Cookies;
    use crate::web::Response;
    use cookie::{Cookie, Key};
    use http::header::{COOKIE, SET_COOKIE};

    fn key() -> Key {
        Key::derive_from(b"a-test-secret-that-is-definitely-longer-than-32-bytes")
    }

    fn cookies_from(header: Option<&str>) -> Cookies {
        let mut builder = http::Request::builder();
        if let Some(header) = header {
            builder = builder.header(COOKIE, header);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        Cookies::from_request_head(&parts.into())
    }

    #[test]
    fn unchanged_cookies_are_not_sent_back() {
        let cookies = cookies_from(Some("flavour=yummy; foo=bar"));
        assert_eq!(cookies.get("foo").unwrap().value(), "bar");

        let response = cookies.apply_delta(Response::ok());
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[test]
    fn separators_without_spaces_are_accepted() {
        let cookies = cookies_from(Some("theme=dark;id=abc; lang=en"));
        assert_eq!(cookies.get("theme").unwrap().value(), "dark");
        assert_eq!(cookies.get("id").unwrap().value(), "abc");
        assert_eq!(cookies.get("lang").unwrap().value(), "en");
    }

    #[test]
    fn malformed_pairs_are_skipped() {
        let cookies = cookies_from(Some("garbage;id=abc"));
        assert!(cookies.get("garbage").is_none());
        assert_eq!(cookies.get("id").unwrap().value(), "abc");
    }

    #[test]
    fn signed_cookies_roundtrip() {
        let mut outgoing = cookies_from(None);
        outgoing.add_signed(Cookie::new("id", "session-id"), &key());
        let response = outgoing.apply_delta(Response::ok());
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        let sent = Cookie::parse_encoded(set_cookie.to_owned()).unwrap();

        let incoming = cookies_from(Some(&sent.encoded().stripped().to_string()));
        let cookie = incoming.get_signed("id", &key()).unwrap();
        assert_eq!(cookie.value(), "session-id");
    }

    #[test]
    fn tampered_signed_cookies_are_rejected() {
        let cookies = cookies_from(Some("id=forged-session-id"));
        assert!(cookies.get_signed("id", &key()).is_none());
    }

    #[test]
    fn removing_an_incoming_cookie_queues_a_removal_cookie() {
        let mut cookies = cookies_from(Some("id=value"));
        cookies.remove(Cookie::build("id").path("/").build());
        let response = cookies.apply_delta(Response::ok());
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("id=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
