//! Sign up, log in, log out.
use http::StatusCode;

use super::context::{ContextError, RequestContext, USER_ID_KEY};
use crate::flash::FlashMessage;
use crate::forms::{FieldErrors, Form, LoginForm, SignUpForm};
use crate::password::{AuthError, validate_credentials};
use crate::templates::Page;
use crate::users::{InsertUserError, insert_user};
use crate::web::Response;

#[derive(serde::Serialize)]
struct CredentialsPage<'a> {
    email: &'a str,
    errors: &'a FieldErrors,
}

/// `GET /`
pub async fn index(ctx: &mut RequestContext<'_>) -> Result<Response, ContextError> {
    match ctx.user_id().await? {
        Some(_) => Ok(Response::redirect_to("/dashboard")),
        None => Ok(Response::redirect_to("/login")),
    }
}

/// `GET /sign-up`
pub async fn sign_up_form(ctx: &mut RequestContext<'_>) -> Result<Response, SignUpError> {
    let errors = FieldErrors::new(SignUpForm::FIELDS);
    let page = CredentialsPage {
        email: "",
        errors: &errors,
    };
    Ok(ctx.render(Page::SignUp, &page, StatusCode::OK).await?)
}

/// `POST /sign-up`
pub async fn sign_up<B>(ctx: &mut RequestContext<'_>, body: B) -> Result<Response, SignUpError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (form, errors) = ctx.form::<SignUpForm, _>(body).await?;
    let email = form.email.trim();
    if !errors.is_empty() {
        let page = CredentialsPage {
            email,
            errors: &errors,
        };
        return Ok(ctx
            .render(Page::SignUp, &page, StatusCode::UNPROCESSABLE_ENTITY)
            .await?);
    }

    match insert_user(&ctx.state.pool, email, &form.password).await {
        Ok(_) => {
            ctx.flash(FlashMessage::success("Account created successfully!"))
                .await?;
            Ok(Response::redirect_to("/login"))
        }
        Err(e @ InsertUserError::DuplicateEmail) => {
            ctx.flash(FlashMessage::error(e.to_string())).await?;
            let page = CredentialsPage {
                email,
                errors: &errors,
            };
            Ok(ctx.render(Page::SignUp, &page, StatusCode::CONFLICT).await?)
        }
        Err(InsertUserError::UnexpectedError(e)) => Err(SignUpError::UnexpectedError(e)),
    }
}

/// `GET /login`
pub async fn login_form(ctx: &mut RequestContext<'_>) -> Result<Response, LoginError> {
    let errors = FieldErrors::new(LoginForm::FIELDS);
    let page = CredentialsPage {
        email: "",
        errors: &errors,
    };
    Ok(ctx.render(Page::Login, &page, StatusCode::OK).await?)
}

/// `POST /login`
pub async fn login<B>(ctx: &mut RequestContext<'_>, body: B) -> Result<Response, LoginError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (form, errors) = ctx.form::<LoginForm, _>(body).await?;
    let email = form.email.trim();
    if !errors.is_empty() {
        let page = CredentialsPage {
            email,
            errors: &errors,
        };
        return Ok(ctx
            .render(Page::Login, &page, StatusCode::UNPROCESSABLE_ENTITY)
            .await?);
    }

    match validate_credentials(email, &form.password, &ctx.state.pool).await {
        Ok(user_id) => {
            // A new privilege level, a new session id.
            ctx.session.cycle_id();
            ctx.session
                .insert(USER_ID_KEY, user_id)
                .await
                .map_err(ContextError::from)?;
            ctx.flash(FlashMessage::success("Logged in successfully!"))
                .await?;
            Ok(Response::redirect_to("/dashboard"))
        }
        Err(e @ AuthError::InvalidCredentials) => {
            tracing::info!(user.email = %email, "Rejected login attempt");
            ctx.flash(FlashMessage::error(e.to_string())).await?;
            let page = CredentialsPage {
                email,
                errors: &errors,
            };
            Ok(ctx.render(Page::Login, &page, StatusCode::UNAUTHORIZED).await?)
        }
        Err(AuthError::UnexpectedError(e)) => Err(LoginError::UnexpectedError(e)),
    }
}

/// `GET /logout`
pub async fn logout(ctx: &mut RequestContext<'_>) -> Result<Response, ContextError> {
    let user_id: Option<i64> = ctx.session.remove(USER_ID_KEY).await?;
    if user_id.is_some() {
        ctx.session.cycle_id();
    }
    ctx.flash(FlashMessage::success("You have been logged out."))
        .await?;
    Ok(Response::redirect_to("/login"))
}

#[derive(Debug, thiserror::Error)]
pub enum SignUpError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("Something went wrong while registering a new user")]
    UnexpectedError(#[source] anyhow::Error),
}

impl SignUpError {
    pub fn into_response(&self) -> Response {
        match self {
            SignUpError::Context(e) => e.into_response(),
            SignUpError::UnexpectedError(_) => Response::internal_server_error(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("Something went wrong while validating credentials")]
    UnexpectedError(#[source] anyhow::Error),
}

impl LoginError {
    pub fn into_response(&self) -> Response {
        match self {
            LoginError::Context(e) => e.into_response(),
            LoginError::UnexpectedError(_) => Response::internal_server_error(),
        }
    }
}
