use http::{HeaderMap, Method, Uri, Version};

/// All the information on an incoming request that is not its body.
#[non_exhaustive]
#[derive(Debug)]
pub struct RequestHead {
    /// The HTTP method of the request.
    pub method: Method,
    /// The [request target](https://datatracker.ietf.org/doc/html/rfc7230#section-5.3),
    /// i.e. the path and the query string.
    pub target: Uri,
    /// The HTTP version used by the request.
    pub version: Version,
    /// The headers attached to the request.
    pub headers: HeaderMap,
}

impl From<http::request::Parts> for RequestHead {
    fn from(parts: http::request::Parts) -> Self {
        Self {
            method: parts.method,
            target: parts.uri,
            version: parts.version,
            headers: parts.headers,
        }
    }
}

/// A unique identifier assigned by the server to every incoming request.
///
/// It's a UUID v7, so identifiers are sortable by the time they were generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerRequestId(uuid::Uuid);

impl ServerRequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl std::fmt::Display for ServerRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.as_hyphenated().fmt(f)
    }
}
