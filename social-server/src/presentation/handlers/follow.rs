use crate::application::auth_service::AuthService;
use crate::application::follow_service::FollowService;
use crate::domain::error::DomainError;
use crate::presentation::utils::{AuthenticatedUser, redirect, request_id};
use actix_web::{HttpRequest, HttpResponse, get, web};
use tracing::info;

#[get("/{username}/follow")]
pub async fn profile_follow(
    req: HttpRequest,
    user: AuthenticatedUser,
    auth: web::Data<AuthService>,
    follows: web::Data<FollowService>,
    path: web::Path<String>,
) -> Result<HttpResponse, DomainError> {
    let author = auth.find_by_username(&path.into_inner()).await?;
    let outcome = follows.follow(user.id, author.id).await?;

    info!(
        request_id = %request_id(&req),
        username = %user.username,
        author = %author.username,
        outcome = ?outcome,
        "follow requested"
    );

    Ok(redirect(&format!("/{}/", author.username)))
}

#[get("/{username}/unfollow")]
pub async fn profile_unfollow(
    req: HttpRequest,
    user: AuthenticatedUser,
    auth: web::Data<AuthService>,
    follows: web::Data<FollowService>,
    path: web::Path<String>,
) -> Result<HttpResponse, DomainError> {
    let author = auth.find_by_username(&path.into_inner()).await?;
    let removed = follows.unfollow(user.id, author.id).await?;

    info!(
        request_id = %request_id(&req),
        username = %user.username,
        author = %author.username,
        removed,
        "unfollow requested"
    );

    Ok(redirect(&format!("/{}/", author.username)))
}
