use http::StatusCode;

use super::context::{ContextError, RequestContext, USER_ID_KEY};
use crate::flash::FlashMessage;
use crate::posts::{Post, list_posts};
use crate::templates::Page;
use crate::users::{User, find_user, list_users};
use crate::web::Response;

#[derive(serde::Serialize)]
struct AdminPage<'a> {
    users: &'a [User],
    posts: &'a [Post],
}

/// `GET /admin`
///
/// Only administrators get to see the page. Everybody else is sent back to the
/// dashboard, with an error message.
pub async fn admin(ctx: &mut RequestContext<'_>) -> Result<Response, AdminError> {
    let Some(user_id) = ctx.user_id().await? else {
        return Ok(Response::redirect_to("/login"));
    };
    let Some(user) = find_user(&ctx.state.pool, user_id).await? else {
        // The account behind this session is gone.
        tracing::warn!(user.id = user_id, "The session references an unknown user");
        let _: Option<i64> = ctx
            .session
            .remove(USER_ID_KEY)
            .await
            .map_err(ContextError::from)?;
        return Ok(Response::redirect_to("/login"));
    };
    if !user.is_admin {
        tracing::info!(user.id = user_id, "Denied access to the admin page");
        ctx.flash(FlashMessage::error("You do not have access to this page."))
            .await?;
        return Ok(Response::redirect_to("/dashboard"));
    }

    let users = list_users(&ctx.state.pool).await?;
    let posts = list_posts(&ctx.state.pool).await?;
    let page = AdminPage {
        users: &users,
        posts: &posts,
    };
    Ok(ctx.render(Page::Admin, &page, StatusCode::OK).await?)
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("Something went wrong while building the admin page")]
    UnexpectedError(#[from] anyhow::Error),
}

impl AdminError {
    pub fn into_response(&self) -> Response {
        match self {
            AdminError::Context(e) => e.into_response(),
            AdminError::UnexpectedError(_) => Response::internal_server_error(),
        }
    }
}
