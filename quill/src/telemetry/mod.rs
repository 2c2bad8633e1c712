//! Request-level telemetry: the root span, response and error logging.
pub mod fields;

use fields::{
    ERROR_DETAILS, ERROR_MESSAGE, ERROR_SOURCE_CHAIN, HTTP_REQUEST_METHOD, HTTP_REQUEST_SERVER_ID,
    HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, NETWORK_PROTOCOL_VERSION, URL_PATH, URL_QUERY,
    USER_AGENT_ORIGINAL, error_details, error_message, error_source_chain, http_request_method,
    http_request_server_id, http_response_status_code, http_route, network_protocol_version,
    url_path, url_query, user_agent_original,
};

use crate::web::{RequestHead, Response, ServerRequestId};

/// The span wrapping the processing of an incoming request.
#[derive(Debug, Clone)]
pub struct RootSpan(tracing::Span);

impl std::ops::Deref for RootSpan {
    type Target = tracing::Span;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl RootSpan {
    pub fn new(span: tracing::Span) -> Self {
        Self(span)
    }

    pub fn into_inner(self) -> tracing::Span {
        self.0
    }
}

/// Construct a new root span for the given request.
pub fn root_span(
    request_head: &RequestHead,
    matched_path_pattern: Option<&'static str>,
    request_id: ServerRequestId,
) -> RootSpan {
    // `{ <expr> }` tells `tracing` to evaluate the field name as an expression,
    // i.e. `{ HTTP_REQUEST_METHOD }` becomes "http.request.method".
    let span = tracing::info_span!(
        "HTTP request",
        { HTTP_REQUEST_METHOD } = http_request_method(request_head),
        { HTTP_REQUEST_SERVER_ID } = http_request_server_id(request_id),
        { HTTP_ROUTE } = http_route(matched_path_pattern),
        { NETWORK_PROTOCOL_VERSION } = network_protocol_version(request_head),
        { URL_QUERY } = url_query(request_head),
        { URL_PATH } = url_path(request_head),
        { USER_AGENT_ORIGINAL } = user_agent_original(request_head),
        // Populated later by `response_logger` and `error_logger`.
        // `tracing` requires all fields to be declared when the span is created.
        { HTTP_RESPONSE_STATUS_CODE } = tracing::field::Empty,
        { ERROR_MESSAGE } = tracing::field::Empty,
        { ERROR_DETAILS } = tracing::field::Empty,
        { ERROR_SOURCE_CHAIN } = tracing::field::Empty,
    );
    RootSpan::new(span)
}

/// Enrich [`RootSpan`] with information extracted from the outgoing response.
pub fn response_logger(response: Response, root_span: &RootSpan) -> Response {
    root_span.record(
        HTTP_RESPONSE_STATUS_CODE,
        http_response_status_code(&response),
    );
    response
}

/// Log an error that reached the route boundary.
///
/// It emits an error event and attaches information about the error to the root span.
/// If multiple errors are observed for the same request, only the details of the last
/// one are attached to the root span.
pub fn error_logger<E>(e: &E, root_span: &RootSpan)
where
    E: std::error::Error + ?Sized,
{
    tracing_log_error::log_error!(*e, "An error occurred during request handling");
    root_span.record(ERROR_MESSAGE, error_message(e));
    root_span.record(ERROR_DETAILS, error_details(e));
    root_span.record(ERROR_SOURCE_CHAIN, error_source_chain(e));
}
