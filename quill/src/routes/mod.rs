//! The routing table and the per-request pipeline.
use http::Method;
use std::sync::Arc;
use tracing::Instrument;

use crate::ApplicationState;
use crate::session::{IncomingSession, Session, SessionCookie};
use crate::telemetry::{RootSpan, error_logger, response_logger, root_span};
use crate::web::cookie::Cookies;
use crate::web::router::{RouteMatch, RouteParams, Router, RouterError, default_fallback};
use crate::web::server::{IncomingStream, ServerHandle, serve};
use crate::web::{RequestHead, Response, ServerRequestId};

pub mod admin;
mod context;
pub mod posts;
pub mod users;

pub use context::{ContextError, RequestContext};

/// Identifies the handler a request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteId {
    Index,
    Dashboard,
    CreatePostForm,
    CreatePost,
    EditPostForm,
    EditPost,
    DeletePost,
    SignUpForm,
    SignUp,
    LoginForm,
    Login,
    Logout,
    Admin,
}

/// The application's routing table.
pub fn router() -> Result<Router<RouteId>, RouterError> {
    Router::new([
        (Method::GET, "/", RouteId::Index),
        (Method::GET, "/dashboard", RouteId::Dashboard),
        (Method::GET, "/create", RouteId::CreatePostForm),
        (Method::POST, "/create", RouteId::CreatePost),
        (Method::GET, "/edit/{post_id}", RouteId::EditPostForm),
        (Method::POST, "/edit/{post_id}", RouteId::EditPost),
        (Method::POST, "/delete/{post_id}", RouteId::DeletePost),
        (Method::GET, "/sign-up", RouteId::SignUpForm),
        (Method::POST, "/sign-up", RouteId::SignUp),
        (Method::GET, "/login", RouteId::LoginForm),
        (Method::POST, "/login", RouteId::Login),
        (Method::GET, "/logout", RouteId::Logout),
        (Method::GET, "/admin", RouteId::Admin),
    ])
}

/// Start serving requests on `incoming`.
///
/// The server keeps running until it is shut down via the returned [`ServerHandle`].
pub fn run(incoming: IncomingStream, state: ApplicationState) -> ServerHandle {
    serve(
        incoming,
        route_request::<hyper::body::Incoming>,
        Arc::new(state),
    )
}

/// Process an incoming request, from routing to the final response.
///
/// The session is loaded from the signed session cookie before the handler runs,
/// and synchronized with the store after it returns.
pub async fn route_request<B>(request: http::Request<B>, state: Arc<ApplicationState>) -> Response
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = request.into_parts();
    let head: RequestHead = parts.into();
    let route_match = state.router.route(&head.method, head.target.path());
    let root_span = root_span(&head, route_match.pattern(), ServerRequestId::generate());

    let response = handle(&state, head, body, route_match, &root_span)
        .instrument(root_span.clone().into_inner())
        .await;
    response_logger(response, &root_span)
}

async fn handle<B>(
    state: &ApplicationState,
    head: RequestHead,
    body: B,
    route_match: RouteMatch<RouteId>,
    root_span: &RootSpan,
) -> Response
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut cookies = Cookies::from_request_head(&head);
    let incoming_session =
        IncomingSession::extract(&cookies, &state.session_config.cookie, &state.key);
    let mut ctx = RequestContext {
        state,
        session: Session::new(&state.session_store, &state.session_config, incoming_session),
        head,
    };

    let response = match &route_match {
        RouteMatch::Found(matched) => {
            dispatch(&mut ctx, matched.handler, &matched.params, body, root_span).await
        }
        RouteMatch::MethodNotAllowed { .. } | RouteMatch::NotFound => {
            default_fallback(&route_match)
        }
    };
    let response = ctx.error_page(response).await;

    match ctx.session.finalize().await {
        Ok(Some(SessionCookie::Set(cookie))) => cookies.add_signed(cookie, &state.key),
        Ok(Some(SessionCookie::Remove(cookie))) => cookies.remove(cookie),
        Ok(None) => {}
        Err(e) => {
            error_logger(&e, root_span);
            return e.into_response();
        }
    }
    cookies.apply_delta(response)
}

async fn dispatch<B>(
    ctx: &mut RequestContext<'_>,
    route: RouteId,
    params: &RouteParams,
    body: B,
    root_span: &RootSpan,
) -> Response
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    // Recover from handler errors: log them, then convert them into a response.
    macro_rules! respond {
        ($outcome:expr) => {{
            let outcome = $outcome;
            match outcome {
                Ok(response) => response,
                Err(e) => {
                    error_logger(&e, root_span);
                    e.into_response()
                }
            }
        }};
    }

    // `post_id` must be an integer, any other value doesn't match the route.
    let post_id = || params.get("post_id").and_then(|id| id.parse::<i64>().ok());

    match route {
        RouteId::Index => respond!(users::index(ctx).await),
        RouteId::Dashboard => respond!(posts::dashboard(ctx).await),
        RouteId::CreatePostForm => respond!(posts::create_form(ctx).await),
        RouteId::CreatePost => respond!(posts::create(ctx, body).await),
        RouteId::EditPostForm => match post_id() {
            Some(post_id) => respond!(posts::edit_form(ctx, post_id).await),
            None => Response::not_found(),
        },
        RouteId::EditPost => match post_id() {
            Some(post_id) => respond!(posts::edit(ctx, post_id, body).await),
            None => Response::not_found(),
        },
        RouteId::DeletePost => match post_id() {
            Some(post_id) => respond!(posts::delete(ctx, post_id, body).await),
            None => Response::not_found(),
        },
        RouteId::SignUpForm => respond!(users::sign_up_form(ctx).await),
        RouteId::SignUp => respond!(users::sign_up(ctx, body).await),
        RouteId::LoginForm => respond!(users::login_form(ctx).await),
        RouteId::Login => respond!(users::login(ctx, body).await),
        RouteId::Logout => respond!(users::logout(ctx).await),
        RouteId::Admin => respond!(admin::admin(ctx).await),
    }
}

#[cfg(test)]
mod tests {
    use super::route_request;
    use crate::ApplicationState;
    use crate::bootstrap::tests::in_memory_pool;
    use crate::configuration::AppConfig;
    use bytes::Bytes;
    use http::header::{ALLOW, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use http::{Method, StatusCode};
    use http_body_util::{BodyExt, Full};
    use std::sync::Arc;

    async fn state() -> Arc<ApplicationState> {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "database": { "path": ":memory:" },
            "cookie": { "secret_key": "a-secret-used-in-tests-and-nowhere-else-really" },
            "session": { "cookie": { "secure": false } },
        }))
        .unwrap();
        let state = ApplicationState::new(in_memory_pool().await, &config)
            .await
            .unwrap();
        Arc::new(state)
    }

    async fn send(
        state: &Arc<ApplicationState>,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
    ) -> http::Response<Full<Bytes>> {
        let mut request = http::Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        let request = request.body(Full::new(Bytes::new())).unwrap();
        route_request(request, state.clone()).await.into()
    }

    async fn body_text(response: http::Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn anonymous_visitors_are_sent_to_the_login_page() {
        let state = state().await;
        for path in ["/", "/dashboard", "/create", "/edit/1", "/admin"] {
            let response = send(&state, Method::GET, path, None).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
            assert_eq!(response.headers()[LOCATION], "/login", "{path}");
        }
    }

    #[tokio::test]
    async fn unknown_paths_get_an_html_not_found_page() {
        let state = state().await;
        let response = send(&state, Method::GET, "/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(body_text(response).await.contains("Not found"));
    }

    #[tokio::test]
    async fn non_integer_post_ids_are_not_found() {
        let state = state().await;
        let response = send(&state, Method::GET, "/edit/first", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unsupported_methods_list_the_allowed_ones() {
        let state = state().await;
        let response = send(&state, Method::GET, "/delete/1", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
    }

    #[tokio::test]
    async fn rendering_a_form_starts_a_session() {
        let state = state().await;
        let response = send(&state, Method::GET, "/login", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_owned();
        assert!(set_cookie.starts_with("id="));
        assert!(set_cookie.contains("HttpOnly"));
        let html = body_text(response).await;
        assert!(html.contains(r#"name="csrf_token""#));

        // The same session, hence the same token, on the next visit.
        let cookie = set_cookie.split(';').next().unwrap();
        let response = send(&state, Method::GET, "/login", Some(cookie)).await;
        let token = |html: &str| {
            let needle = r#"name="csrf_token" value=""#;
            let start = html.find(needle).unwrap() + needle.len();
            html[start..start + 64].to_owned()
        };
        assert_eq!(token(&html), token(&body_text(response).await));
    }

    #[tokio::test]
    async fn redirects_do_not_create_sessions() {
        let state = state().await;
        let response = send(&state, Method::GET, "/", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }
}
