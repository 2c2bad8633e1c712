use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ApplicationState;
use crate::csrf::{self, CsrfError};
use crate::flash::{self, FlashError, FlashMessage};
use crate::forms::{CSRF_TOKEN_INVALID, FieldErrors, Form};
use crate::session::Session;
use crate::session::errors::{ServerGetError, ServerSetError};
use crate::templates::{Chrome, Page, TemplateError};
use crate::web::body::{
    BufferedBody, ExtractBufferedBodyError, ExtractUrlEncodedBodyError, UrlEncodedBody,
};
use crate::web::{Html, RequestHead, Response};

/// The session key holding the id of the logged-in user.
pub(crate) const USER_ID_KEY: &str = "user_id";

/// Everything a handler needs to process the current request.
///
/// It lives as long as the request does. Nothing in here is shared with other requests,
/// with the exception of the application state.
pub struct RequestContext<'a> {
    pub state: &'a ApplicationState,
    pub head: RequestHead,
    pub session: Session<'a>,
}

impl<'a> RequestContext<'a> {
    /// The id of the logged-in user, if any.
    pub async fn user_id(&mut self) -> Result<Option<i64>, ContextError> {
        Ok(self.session.get(USER_ID_KEY).await?)
    }

    /// Queue a message for the next rendered page.
    pub async fn flash(&mut self, message: FlashMessage) -> Result<(), ContextError> {
        Ok(flash::push(&mut self.session, message).await?)
    }

    /// Render `page` with the given status code.
    ///
    /// Pending flash messages are drained and shown on the page.
    pub async fn render<T>(
        &mut self,
        page: Page,
        values: &T,
        status: StatusCode,
    ) -> Result<Response, ContextError>
    where
        T: Serialize,
    {
        let chrome = Chrome {
            flashes: flash::take(&mut self.session).await?,
            csrf_token: csrf::token(&mut self.session).await?,
            logged_in: self.user_id().await?.is_some(),
        };
        let html = self.state.templates.render(page, values, &chrome)?;
        Ok(Response::new(status).set_typed_body(Html::from(html)))
    }

    /// Buffer and parse the submitted form, then validate it.
    ///
    /// The CSRF token is checked together with the other fields: a missing or
    /// mismatched token is reported as a field error.
    pub async fn form<F, B>(&mut self, body: B) -> Result<(F, FieldErrors), ContextError>
    where
        F: Form + DeserializeOwned,
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let buffered =
            BufferedBody::extract(&self.head, body, self.state.body_size_limit).await?;
        let UrlEncodedBody(form) = UrlEncodedBody::<F>::extract(&self.head, &buffered)?;
        let mut errors = form.validate();
        if !csrf::verify(&mut self.session, form.csrf_token()).await? {
            errors.add("csrf_token", CSRF_TOKEN_INVALID);
        }
        Ok((form, errors))
    }

    /// Attach an HTML page to bare `404` and `500` responses.
    ///
    /// Flash messages are left untouched, for the next page to show.
    pub async fn error_page(&mut self, response: Response) -> Response {
        if response.headers().contains_key(CONTENT_TYPE) {
            return response;
        }
        let page = match response.status() {
            StatusCode::NOT_FOUND => Page::NotFound,
            StatusCode::INTERNAL_SERVER_ERROR => Page::Error,
            _ => return response,
        };
        let chrome = Chrome {
            logged_in: matches!(self.user_id().await, Ok(Some(_))),
            ..Default::default()
        };
        match self.state.templates.render(page, &(), &chrome) {
            Ok(html) => response.set_typed_body(Html::from(html)),
            Err(e) => {
                tracing_log_error::log_error!(e, "Failed to render an error page");
                response
            }
        }
    }
}

/// The failures every handler may run into, regardless of what it does.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Body(#[from] ExtractBufferedBodyError),
    #[error(transparent)]
    Form(#[from] ExtractUrlEncodedBodyError),
    #[error("Failed to read from the session")]
    SessionGet(#[from] ServerGetError),
    #[error("Failed to write to the session")]
    SessionSet(#[from] ServerSetError),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error(transparent)]
    Csrf(#[from] CsrfError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl ContextError {
    pub fn into_response(&self) -> Response {
        match self {
            ContextError::Body(e) => e.into_response(),
            ContextError::Form(e) => e.into_response(),
            ContextError::SessionGet(_)
            | ContextError::SessionSet(_)
            | ContextError::Flash(_)
            | ContextError::Csrf(_)
            | ContextError::Template(_) => Response::internal_server_error(),
        }
    }
}
