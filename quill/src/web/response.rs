use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use mime::TEXT_HTML_UTF_8;
use std::borrow::Cow;

/// Represents an HTTP response.
///
/// Use the status shorthands (e.g. [`Response::ok`], [`Response::not_found`]) to start
/// building a response, then attach headers and a typed body.
#[derive(Debug)]
pub struct Response {
    inner: http::Response<Full<Bytes>>,
}

impl Response {
    /// Build a new [`Response`] with the given status code and an empty body.
    pub fn new(status_code: StatusCode) -> Self {
        let inner = http::Response::new(Full::default());
        Self { inner }.set_status(status_code)
    }

    /// A `303 See Other` redirect to the given location.
    ///
    /// Browsers follow it with a `GET`, which is what we want after a form submission.
    pub fn redirect_to(location: &'static str) -> Self {
        Self::see_other().insert_header(LOCATION, HeaderValue::from_static(location))
    }

    pub fn set_status(mut self, status: StatusCode) -> Self {
        *self.inner.status_mut() = status;
        self
    }

    /// Append a value to a header.
    ///
    /// Existing values for the same header are preserved.
    pub fn append_header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.inner.headers_mut().append(key, value);
        self
    }

    /// Insert a header value, replacing any existing value for the same header.
    pub fn insert_header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.inner.headers_mut().insert(key, value);
        self
    }

    /// Set the body of the response, together with the matching `Content-Type` header.
    pub fn set_typed_body<B>(self, body: B) -> Self
    where
        B: TypedBody,
    {
        let (mut head, _) = self.inner.into_parts();
        head.headers.insert(CONTENT_TYPE, body.content_type());
        Self {
            inner: http::Response::from_parts(head, body.body()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn body(&self) -> &Full<Bytes> {
        self.inner.body()
    }
}

impl From<Response> for http::Response<Full<Bytes>> {
    fn from(res: Response) -> Self {
        res.inner
    }
}

macro_rules! shorthand {
    ($name:ident) => {
        paste::paste! {
            #[doc = "Start building a new [`Response`] with [`" $name "`](`StatusCode::" $name "`) as status code."]
            pub fn [<$name:lower>]() -> Response {
                Response::new(StatusCode::[<$name>])
            }
        }
    };
}

impl Response {
    // 2xx
    shorthand!(OK);

    // 3xx
    shorthand!(SEE_OTHER);

    // 4xx
    shorthand!(BAD_REQUEST);
    shorthand!(UNAUTHORIZED);
    shorthand!(NOT_FOUND);
    shorthand!(METHOD_NOT_ALLOWED);
    shorthand!(CONFLICT);
    shorthand!(PAYLOAD_TOO_LARGE);
    shorthand!(UNSUPPORTED_MEDIA_TYPE);
    shorthand!(UNPROCESSABLE_ENTITY);

    // 5xx
    shorthand!(INTERNAL_SERVER_ERROR);
}

/// A body type that knows its own `Content-Type`.
pub trait TypedBody {
    fn content_type(&self) -> HeaderValue;

    fn body(self) -> Full<Bytes>;
}

/// A response body with `Content-Type` set to `text/html; charset=utf-8`.
pub struct Html(Bytes);

impl From<String> for Html {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&'static str> for Html {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Cow<'static, str>> for Html {
    fn from(s: Cow<'static, str>) -> Self {
        match s {
            Cow::Borrowed(s) => s.into(),
            Cow::Owned(s) => s.into(),
        }
    }
}

impl TypedBody for Html {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static(TEXT_HTML_UTF_8.as_ref())
    }

    fn body(self) -> Full<Bytes> {
        Full::new(self.0)
    }
}

/// A plain-text response body, used for low-level protocol errors.
pub struct PlainText(Bytes);

impl From<String> for PlainText {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl TypedBody for PlainText {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref())
    }

    fn body(self) -> Full<Bytes> {
        Full::new(self.0)
    }
}
