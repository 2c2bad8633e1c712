//! List, create, edit and delete posts.
//!
//! Every handler requires a logged-in user: anonymous visitors are sent to `/login`.
use http::StatusCode;

use super::context::{ContextError, RequestContext};
use crate::flash::FlashMessage;
use crate::forms::{CsrfForm, FieldErrors, Form, PostForm};
use crate::posts::{self, Post, PostNotFound};
use crate::templates::Page;
use crate::web::Response;

#[derive(serde::Serialize)]
struct DashboardPage<'a> {
    posts: &'a [Post],
}

#[derive(serde::Serialize)]
struct PostFormPage<'a> {
    post_id: Option<i64>,
    form: &'a PostForm,
    errors: &'a FieldErrors,
}

macro_rules! require_login {
    ($ctx:expr) => {
        if $ctx.user_id().await?.is_none() {
            return Ok(Response::redirect_to("/login"));
        }
    };
}

/// `GET /dashboard`
pub async fn dashboard(ctx: &mut RequestContext<'_>) -> Result<Response, PostError> {
    require_login!(ctx);
    render_dashboard(ctx, StatusCode::OK).await
}

async fn render_dashboard(
    ctx: &mut RequestContext<'_>,
    status: StatusCode,
) -> Result<Response, PostError> {
    let posts = posts::list_posts(&ctx.state.pool).await?;
    let page = DashboardPage { posts: &posts };
    Ok(ctx.render(Page::Dashboard, &page, status).await?)
}

/// `GET /create`
pub async fn create_form(ctx: &mut RequestContext<'_>) -> Result<Response, PostError> {
    require_login!(ctx);
    let page = PostFormPage {
        post_id: None,
        form: &PostForm::default(),
        errors: &FieldErrors::new(PostForm::FIELDS),
    };
    Ok(ctx.render(Page::CreatePost, &page, StatusCode::OK).await?)
}

/// `POST /create`
pub async fn create<B>(ctx: &mut RequestContext<'_>, body: B) -> Result<Response, PostError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    require_login!(ctx);
    let (form, errors) = ctx.form::<PostForm, _>(body).await?;
    if !errors.is_empty() {
        let page = PostFormPage {
            post_id: None,
            form: &form,
            errors: &errors,
        };
        return Ok(ctx
            .render(Page::CreatePost, &page, StatusCode::UNPROCESSABLE_ENTITY)
            .await?);
    }

    let post_id = posts::insert_post(&ctx.state.pool, &form.title, &form.content).await?;
    tracing::info!(post.id = post_id, "Created a new post");
    ctx.flash(FlashMessage::success("Post created successfully!"))
        .await?;
    Ok(Response::redirect_to("/dashboard"))
}

/// `GET /edit/{post_id}`
pub async fn edit_form(ctx: &mut RequestContext<'_>, post_id: i64) -> Result<Response, PostError> {
    require_login!(ctx);
    let post = posts::get_post(&ctx.state.pool, post_id)
        .await?
        .ok_or(PostNotFound { post_id })?;
    let form = PostForm {
        title: post.title,
        content: post.content,
        csrf_token: String::new(),
    };
    let page = PostFormPage {
        post_id: Some(post_id),
        form: &form,
        errors: &FieldErrors::new(PostForm::FIELDS),
    };
    Ok(ctx.render(Page::EditPost, &page, StatusCode::OK).await?)
}

/// `POST /edit/{post_id}`
pub async fn edit<B>(
    ctx: &mut RequestContext<'_>,
    post_id: i64,
    body: B,
) -> Result<Response, PostError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    require_login!(ctx);
    if posts::get_post(&ctx.state.pool, post_id).await?.is_none() {
        return Err(PostNotFound { post_id }.into());
    }
    let (form, errors) = ctx.form::<PostForm, _>(body).await?;
    if !errors.is_empty() {
        let page = PostFormPage {
            post_id: Some(post_id),
            form: &form,
            errors: &errors,
        };
        return Ok(ctx
            .render(Page::EditPost, &page, StatusCode::UNPROCESSABLE_ENTITY)
            .await?);
    }

    posts::update_post(&ctx.state.pool, post_id, &form.title, &form.content).await??;
    ctx.flash(FlashMessage::success("Post updated!")).await?;
    Ok(Response::redirect_to("/dashboard"))
}

/// `POST /delete/{post_id}`
pub async fn delete<B>(
    ctx: &mut RequestContext<'_>,
    post_id: i64,
    body: B,
) -> Result<Response, PostError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    require_login!(ctx);
    if posts::get_post(&ctx.state.pool, post_id).await?.is_none() {
        return Err(PostNotFound { post_id }.into());
    }
    let (_, errors) = ctx.form::<CsrfForm, _>(body).await?;
    if !errors.is_empty() {
        for message in errors.get("csrf_token") {
            ctx.flash(FlashMessage::error(*message)).await?;
        }
        return render_dashboard(ctx, StatusCode::UNPROCESSABLE_ENTITY).await;
    }

    posts::delete_post(&ctx.state.pool, post_id).await??;
    tracing::info!(post.id = post_id, "Deleted a post");
    ctx.flash(FlashMessage::success("Post deleted!")).await?;
    Ok(Response::redirect_to("/dashboard"))
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error(transparent)]
    NotFound(#[from] PostNotFound),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("Something went wrong while accessing posts")]
    UnexpectedError(#[from] anyhow::Error),
}

impl PostError {
    pub fn into_response(&self) -> Response {
        match self {
            PostError::NotFound(_) => Response::not_found(),
            PostError::Context(e) => e.into_response(),
            PostError::UnexpectedError(_) => Response::internal_server_error(),
        }
    }
}
