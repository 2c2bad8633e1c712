//! Buffer incoming request bodies and parse them as urlencoded forms.
use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_LENGTH;
use http_body_util::{BodyExt, Limited};
use serde::Deserialize;
use ubyte::{ByteUnit, ToByteUnit};

use super::RequestHead;
use super::response::{PlainText, Response};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(from = "RawBodySizeLimit")]
/// An upper limit on the size of incoming request bodies.
///
/// In configuration files it's written as `{ enabled: bool, max_size: "2 MB" }`.
/// Both keys are optional: the limit is enabled by default, with a maximum size of 2 MB.
pub enum BodySizeLimit {
    /// Reject request bodies larger than `max_size`.
    Enabled { max_size: ByteUnit },
    /// Accept request bodies of any size.
    Disabled,
}

impl Default for BodySizeLimit {
    fn default() -> Self {
        Self::Enabled {
            max_size: default_max_size(),
        }
    }
}

#[derive(serde::Deserialize)]
struct RawBodySizeLimit {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default = "default_max_size")]
    max_size: ByteUnit,
}

impl From<RawBodySizeLimit> for BodySizeLimit {
    fn from(raw: RawBodySizeLimit) -> Self {
        if raw.enabled {
            Self::Enabled {
                max_size: raw.max_size,
            }
        } else {
            Self::Disabled
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_size() -> ByteUnit {
    2.megabytes()
}

#[derive(Debug)]
#[non_exhaustive]
/// The complete body of an incoming request, buffered in memory.
pub struct BufferedBody {
    pub bytes: Bytes,
}

impl BufferedBody {
    /// Buffer the request body in memory, enforcing the configured size limit.
    pub async fn extract<B>(
        request_head: &RequestHead,
        body: B,
        body_size_limit: BodySizeLimit,
    ) -> Result<Self, ExtractBufferedBodyError>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match body_size_limit {
            BodySizeLimit::Enabled { max_size } => {
                Self::extract_with_limit(&request_head.headers, body, max_size).await
            }
            BodySizeLimit::Disabled => match body.collect().await {
                Ok(collected) => Ok(Self {
                    bytes: collected.to_bytes(),
                }),
                Err(e) => Err(UnexpectedBufferError { source: e.into() }.into()),
            },
        }
    }

    async fn extract_with_limit<B>(
        headers: &HeaderMap,
        body: B,
        max_size: ByteUnit,
    ) -> Result<Self, ExtractBufferedBodyError>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok()?.parse::<usize>().ok());

        let limit_error = || SizeLimitExceeded {
            max_size,
            content_length,
        };

        // Short-circuit if the client already told us the body is too large.
        if let Some(len) = content_length {
            if len > max_size {
                return Err(limit_error().into());
            }
        }

        let max_n_bytes = max_size.as_u64().try_into().unwrap_or(usize::MAX);
        match Limited::new(body, max_n_bytes).collect().await {
            Ok(collected) => Ok(Self {
                bytes: collected.to_bytes(),
            }),
            Err(e) => {
                if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    Err(limit_error().into())
                } else {
                    Err(UnexpectedBufferError { source: e }.into())
                }
            }
        }
    }
}

#[derive(Debug)]
/// Parse the body of an incoming request as a urlencoded form.
///
/// The request must carry a `Content-Type` header set to `application/x-www-form-urlencoded`.
pub struct UrlEncodedBody<T>(pub T);

impl<T> UrlEncodedBody<T> {
    pub fn extract<'body>(
        request_head: &RequestHead,
        buffered_body: &'body BufferedBody,
    ) -> Result<Self, ExtractUrlEncodedBodyError>
    where
        T: Deserialize<'body>,
    {
        check_urlencoded_content_type(&request_head.headers)?;
        parse(buffered_body.bytes.as_ref()).map(UrlEncodedBody)
    }
}

fn check_urlencoded_content_type(headers: &HeaderMap) -> Result<(), ExtractUrlEncodedBodyError> {
    let Some(content_type) = headers.get(http::header::CONTENT_TYPE) else {
        return Err(ExtractUrlEncodedBodyError::MissingContentType);
    };
    let Ok(content_type) = content_type.to_str() else {
        return Err(ExtractUrlEncodedBodyError::MissingContentType);
    };
    let mismatch = || ExtractUrlEncodedBodyError::ContentTypeMismatch {
        actual: content_type.to_string(),
    };

    let Ok(mime) = content_type.parse::<mime::Mime>() else {
        return Err(mismatch());
    };
    if mime.type_() != mime::APPLICATION || mime.subtype() != mime::WWW_FORM_URLENCODED {
        return Err(mismatch());
    }
    Ok(())
}

fn parse<'a, T>(bytes: &'a [u8]) -> Result<T, ExtractUrlEncodedBodyError>
where
    T: Deserialize<'a>,
{
    serde_html_form::from_bytes(bytes).map_err(ExtractUrlEncodedBodyError::DeserializationError)
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
/// The error returned by [`BufferedBody::extract`] when the body cannot be buffered.
pub enum ExtractBufferedBodyError {
    #[error(transparent)]
    SizeLimitExceeded(#[from] SizeLimitExceeded),
    #[error(transparent)]
    UnexpectedBufferError(#[from] UnexpectedBufferError),
}

impl ExtractBufferedBodyError {
    /// Convert an [`ExtractBufferedBodyError`] into an HTTP response.
    pub fn into_response(&self) -> Response {
        match self {
            ExtractBufferedBodyError::SizeLimitExceeded(_) => Response::payload_too_large(),
            ExtractBufferedBodyError::UnexpectedBufferError(_) => Response::bad_request(),
        }
        .set_typed_body(PlainText::from(self.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("The request body is larger than the maximum size limit enforced by this server.")]
#[non_exhaustive]
pub struct SizeLimitExceeded {
    /// The maximum size limit enforced by this server.
    pub max_size: ByteUnit,
    /// The value of the `Content-Length` header for the request that breached the body
    /// size limit, if it was present and well-formed.
    pub content_length: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
#[error("Something went wrong while reading the request body.")]
#[non_exhaustive]
pub struct UnexpectedBufferError {
    #[source]
    pub(crate) source: Box<dyn std::error::Error + Send + Sync>,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
/// The error returned by [`UrlEncodedBody::extract`].
pub enum ExtractUrlEncodedBodyError {
    #[error(
        "The `Content-Type` header is missing. This endpoint expects requests with a `Content-Type` header set to `application/x-www-form-urlencoded`"
    )]
    MissingContentType,
    #[error(
        "The `Content-Type` header was set to `{actual}`. This endpoint expects requests with a `Content-Type` header set to `application/x-www-form-urlencoded`"
    )]
    ContentTypeMismatch { actual: String },
    #[error("Failed to deserialize the body as a urlencoded form.\n{0}")]
    DeserializationError(#[source] serde_html_form::de::Error),
}

impl ExtractUrlEncodedBodyError {
    /// Convert an [`ExtractUrlEncodedBodyError`] into an HTTP response.
    pub fn into_response(&self) -> Response {
        match self {
            ExtractUrlEncodedBodyError::MissingContentType
            | ExtractUrlEncodedBodyError::ContentTypeMismatch { .. } => {
                Response::unsupported_media_type()
            }
            ExtractUrlEncodedBodyError::DeserializationError(_) => Response::bad_request(),
        }
        .set_typed_body(PlainText::from(self.to_string()))
    }
}
