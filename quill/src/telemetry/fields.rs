//! Utilities to log common resources with consistent naming and representations.
//!
//! For well-known resources, this module exposes:
//!
//! - A constant holding the conventional field name used when logging that resource
//! - A function to compute the conventional log representation of that resource
//!
//! For example, you have [`HTTP_REQUEST_METHOD`] and [`http_request_method`] for the
//! `http.request.method` field.
//!
//! The naming follows [OpenTelemetry's semantic convention](https://opentelemetry.io/docs/specs/semconv/)
//! whenever possible.
use http::{Method, Version};
use tracing::Value;

use crate::web::{RequestHead, Response, ServerRequestId};

pub use tracing_log_error::fields::*;

pub const HTTP_REQUEST_METHOD: &str = "http.request.method";

pub const HTTP_REQUEST_SERVER_ID: &str = "http.request.server_id";

pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";

pub const HTTP_ROUTE: &str = "http.route";

pub const NETWORK_PROTOCOL_VERSION: &str = "network.protocol.version";

pub const URL_PATH: &str = "url.path";

pub const URL_QUERY: &str = "url.query";

pub const USER_AGENT_ORIGINAL: &str = "user_agent.original";

pub fn http_request_method(request_head: &RequestHead) -> impl Value + use<> {
    match request_head.method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::TRACE => "TRACE",
        Method::PATCH => "PATCH",
        Method::CONNECT => "CONNECT",
        Method::HEAD => "HEAD",
        Method::DELETE => "DELETE",
        Method::OPTIONS => "OPTIONS",
        _ => "_OTHER",
    }
}

pub fn http_request_server_id(id: ServerRequestId) -> impl Value {
    tracing::field::display(id)
}

pub fn http_response_status_code(response: &Response) -> impl Value + use<> {
    response.status().as_u16()
}

/// The path pattern that matched the request, or `*` if none did.
pub fn http_route(matched_path_pattern: Option<&'static str>) -> impl Value {
    matched_path_pattern.unwrap_or("*")
}

pub fn network_protocol_version(request_head: &RequestHead) -> impl Value + use<> {
    match request_head.version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "_OTHER",
    }
}

pub fn url_path(request_head: &RequestHead) -> impl Value + '_ {
    request_head.target.path()
}

pub fn url_query(request_head: &RequestHead) -> impl Value + '_ {
    request_head.target.query().unwrap_or_default()
}

pub fn user_agent_original(request_head: &RequestHead) -> impl Value + '_ {
    request_head
        .headers
        .get(http::header::USER_AGENT)
        .map(|h| h.to_str().unwrap_or_default())
        .unwrap_or_default()
}
