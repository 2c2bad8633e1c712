//! The HTTP plumbing the application is built on: request and response types,
//! body extraction, cookies, routing primitives and the server loop.
pub mod body;
pub mod cookie;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use request::{RequestHead, ServerRequestId};
pub use response::{Html, Response};
