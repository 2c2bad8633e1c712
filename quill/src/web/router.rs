//! Map incoming requests to handlers, using their path and method.
use http::header::ALLOW;
use http::{HeaderValue, Method};
use smallvec::SmallVec;

use super::Response;

/// A routing table: a set of path patterns, each with the handlers registered
/// for the methods it supports.
///
/// Path patterns follow `matchit`'s syntax, e.g. `/edit/{post_id}`.
pub struct Router<H> {
    inner: matchit::Router<Endpoint<H>>,
}

impl<H> std::fmt::Debug for Router<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

struct Endpoint<H> {
    pattern: &'static str,
    // Inlining limit: most paths are registered for `GET` and `POST` at most.
    handlers: SmallVec<[(Method, H); 2]>,
}

impl<H: Copy> Router<H> {
    /// Build a routing table from a list of `(method, path pattern, handler)` triples.
    ///
    /// Registering the same method twice for the same path pattern is an error.
    pub fn new<I>(routes: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = (Method, &'static str, H)>,
    {
        let mut endpoints: Vec<Endpoint<H>> = Vec::new();
        for (method, pattern, handler) in routes {
            let index = match endpoints.iter().position(|e| e.pattern == pattern) {
                Some(index) => index,
                None => {
                    endpoints.push(Endpoint {
                        pattern,
                        handlers: SmallVec::new(),
                    });
                    endpoints.len() - 1
                }
            };
            let endpoint = &mut endpoints[index];
            if endpoint.handlers.iter().any(|(m, _)| *m == method) {
                return Err(RouterError::DuplicateRoute { method, pattern });
            }
            endpoint.handlers.push((method, handler));
        }

        let mut inner = matchit::Router::new();
        for endpoint in endpoints {
            let pattern = endpoint.pattern;
            inner
                .insert(pattern, endpoint)
                .map_err(|source| RouterError::InvalidPattern { pattern, source })?;
        }
        Ok(Self { inner })
    }

    /// Find the handler for the given method and path.
    pub fn route(&self, method: &Method, path: &str) -> RouteMatch<H> {
        let Ok(matched) = self.inner.at(path) else {
            return RouteMatch::NotFound;
        };
        let endpoint = matched.value;
        let params = RouteParams(
            matched
                .params
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        );
        match endpoint.handlers.iter().find(|(m, _)| m == method) {
            Some((_, handler)) => RouteMatch::Found(MatchedRoute {
                handler: *handler,
                pattern: endpoint.pattern,
                params,
            }),
            None => RouteMatch::MethodNotAllowed {
                pattern: endpoint.pattern,
                allowed: MethodAllowList(
                    endpoint.handlers.iter().map(|(m, _)| m.clone()).collect(),
                ),
            },
        }
    }
}

/// The outcome of [`Router::route`].
#[derive(Debug)]
pub enum RouteMatch<H> {
    Found(MatchedRoute<H>),
    /// The path matched a registered pattern, but not for this method.
    MethodNotAllowed {
        pattern: &'static str,
        allowed: MethodAllowList,
    },
    NotFound,
}

impl<H> RouteMatch<H> {
    /// The path pattern that matched the request, if any.
    pub fn pattern(&self) -> Option<&'static str> {
        match self {
            RouteMatch::Found(m) => Some(m.pattern),
            RouteMatch::MethodNotAllowed { pattern, .. } => Some(*pattern),
            RouteMatch::NotFound => None,
        }
    }
}

#[derive(Debug)]
pub struct MatchedRoute<H> {
    pub handler: H,
    pub pattern: &'static str,
    pub params: RouteParams,
}

/// The values extracted from the request path for the route parameters, e.g.
/// `post_id` in `/edit/{post_id}`.
#[derive(Debug, Default)]
pub struct RouteParams(SmallVec<[(String, String); 1]>);

impl RouteParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The set of methods supported by a path pattern.
#[derive(Debug, Clone)]
pub struct MethodAllowList(SmallVec<[Method; 2]>);

impl MethodAllowList {
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }

    /// The value of the `Allow` header for this set of methods, e.g. `GET, POST`.
    pub fn allow_header_value(&self) -> Option<HeaderValue> {
        if self.0.is_empty() {
            return None;
        }
        let value = self
            .0
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        HeaderValue::from_str(&value).ok()
    }
}

/// The response returned when no handler matches the incoming request.
///
/// `405 Method Not Allowed`, with an `Allow` header, if the path is known.
/// `404 Not Found` otherwise.
pub fn default_fallback<H>(route_match: &RouteMatch<H>) -> Response {
    match route_match {
        RouteMatch::MethodNotAllowed { allowed, .. } => {
            let response = Response::method_not_allowed();
            match allowed.allow_header_value() {
                Some(value) => response.insert_header(ALLOW, value),
                None => response,
            }
        }
        RouteMatch::Found(_) | RouteMatch::NotFound => Response::not_found(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("`{method} {pattern}` has been registered more than once")]
    DuplicateRoute {
        method: Method,
        pattern: &'static str,
    },
    #[error("`{pattern}` is not a valid path pattern")]
    InvalidPattern {
        pattern: &'static str,
        #[source]
        source: matchit::InsertError,
    },
}

#[cfg(test)]
mod tests {
    use super::{RouteMatch, Router, default_fallback};
    use http::header::ALLOW;
    use http::{Method, StatusCode};

    fn router() -> Router<u8> {
        Router::new([
            (Method::GET, "/", 0),
            (Method::GET, "/edit/{post_id}", 1),
            (Method::POST, "/edit/{post_id}", 2),
            (Method::POST, "/delete/{post_id}", 3),
        ])
        .unwrap()
    }

    #[test]
    fn dispatches_by_method_and_captures_parameters() {
        let RouteMatch::Found(matched) = router().route(&Method::POST, "/edit/42") else {
            panic!("Expected a match");
        };
        assert_eq!(matched.handler, 2);
        assert_eq!(matched.pattern, "/edit/{post_id}");
        assert_eq!(matched.params.get("post_id"), Some("42"));
    }

    #[test]
    fn unknown_paths_are_not_found() {
        let route_match = router().route(&Method::GET, "/nope");
        assert!(matches!(route_match, RouteMatch::NotFound));
        assert_eq!(default_fallback(&route_match).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn known_paths_with_the_wrong_method_list_the_allowed_ones() {
        let route_match = router().route(&Method::GET, "/delete/1");
        let response = default_fallback(&route_match);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let outcome = Router::new([(Method::GET, "/", 0), (Method::GET, "/", 1)]);
        insta::assert_snapshot!(outcome.unwrap_err(), @"`GET /` has been registered more than once");
    }
}
