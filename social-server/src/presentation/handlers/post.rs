use crate::application::feed_service::FeedService;
use crate::application::group_service::GroupService;
use crate::application::post_service::{PostDraft, PostService};
use crate::domain::error::{DomainError, FormErrors, post_url};
use crate::infrastructure::media::MediaStorage;
use crate::presentation::dto::{CommentForm, read_post_form};
use crate::presentation::utils::{AuthenticatedUser, html, redirect, request_id};
use crate::presentation::views::{self, CommentFormView, PostFormView};
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use tracing::info;

async fn render_post_form(
    user: &AuthenticatedUser,
    groups: &GroupService,
    draft: &PostDraft,
    image: Option<&str>,
    editing: Option<(&str, i64)>,
    errors: &FormErrors,
) -> Result<HttpResponse, DomainError> {
    let groups = groups.list_groups().await?;
    let form = PostFormView {
        text: &draft.text,
        group: draft.group.as_deref(),
        image,
        editing,
    };
    Ok(html(views::post_form_page(Some(user), form, &groups, errors)))
}

#[get("/new")]
pub async fn new_post_form(
    user: AuthenticatedUser,
    groups: web::Data<GroupService>,
) -> Result<HttpResponse, DomainError> {
    render_post_form(&user, &groups, &PostDraft::default(), None, None, &FormErrors::new()).await
}

#[post("/new")]
pub async fn create_post(
    req: HttpRequest,
    user: AuthenticatedUser,
    posts: web::Data<PostService>,
    groups: web::Data<GroupService>,
    media: web::Data<MediaStorage>,
    payload: Multipart,
) -> Result<HttpResponse, DomainError> {
    let draft = read_post_form(payload, media.max_upload_bytes()).await?;

    match posts.create_post(user.id, draft.clone()).await {
        Ok(post) => {
            info!(
                request_id = %request_id(&req),
                username = %user.username,
                post_id = post.id,
                "post created"
            );
            Ok(redirect("/"))
        }
        Err(DomainError::Validation(errors)) => {
            render_post_form(&user, &groups, &draft, None, None, &errors).await
        }
        Err(err) => Err(err),
    }
}

#[get("/{username}/{post_id}/")]
pub async fn post_view(
    viewer: Option<AuthenticatedUser>,
    feeds: web::Data<FeedService>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, DomainError> {
    let (username, post_id) = path.into_inner();
    let detail = feeds.post_detail(&username, post_id).await?;
    Ok(html(views::post_page(
        &detail,
        viewer.as_ref(),
        CommentFormView::default(),
    )))
}

#[get("/{username}/{post_id}/edit")]
pub async fn post_edit_form(
    user: AuthenticatedUser,
    posts: web::Data<PostService>,
    groups: web::Data<GroupService>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, DomainError> {
    let (username, post_id) = path.into_inner();
    if user.username != username {
        return Err(DomainError::NotOwner { username, post_id });
    }
    let post = posts.owned_post(user.id, post_id).await?;
    let draft = PostDraft {
        text: post.text,
        group: post.group_id.map(|id| id.to_string()),
        image: None,
    };
    render_post_form(
        &user,
        &groups,
        &draft,
        post.image.as_deref(),
        Some((username.as_str(), post_id)),
        &FormErrors::new(),
    )
    .await
}

#[post("/{username}/{post_id}/edit")]
pub async fn post_edit(
    req: HttpRequest,
    user: AuthenticatedUser,
    posts: web::Data<PostService>,
    groups: web::Data<GroupService>,
    media: web::Data<MediaStorage>,
    path: web::Path<(String, i64)>,
    payload: Multipart,
) -> Result<HttpResponse, DomainError> {
    let (username, post_id) = path.into_inner();
    if user.username != username {
        return Err(DomainError::NotOwner { username, post_id });
    }
    let current = posts.owned_post(user.id, post_id).await?;
    let draft = read_post_form(payload, media.max_upload_bytes()).await?;

    match posts
        .edit_post(user.id, &user.username, &username, post_id, draft.clone())
        .await
    {
        Ok(post) => {
            info!(
                request_id = %request_id(&req),
                username = %user.username,
                post_id = post.id,
                "post updated"
            );
            Ok(redirect(&post_url(&username, post.id)))
        }
        Err(DomainError::Validation(errors)) => {
            render_post_form(
                &user,
                &groups,
                &draft,
                current.image.as_deref(),
                Some((username.as_str(), post_id)),
                &errors,
            )
            .await
        }
        Err(err) => Err(err),
    }
}

/// Comments are only accepted through the form; a plain visit lands on the post.
#[get("/{username}/{post_id}/comment/")]
pub async fn add_comment_redirect(path: web::Path<(String, i64)>) -> HttpResponse {
    let (username, post_id) = path.into_inner();
    redirect(&post_url(&username, post_id))
}

#[post("/{username}/{post_id}/comment/")]
pub async fn add_comment(
    req: HttpRequest,
    user: AuthenticatedUser,
    feeds: web::Data<FeedService>,
    posts: web::Data<PostService>,
    path: web::Path<(String, i64)>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, DomainError> {
    let (username, post_id) = path.into_inner();
    let detail = feeds.post_detail(&username, post_id).await?;

    match posts.create_comment(user.id, post_id, &form.text).await {
        Ok(comment) => {
            info!(
                request_id = %request_id(&req),
                username = %user.username,
                post_id,
                comment_id = comment.id,
                "comment added"
            );
            Ok(redirect(&post_url(&username, post_id)))
        }
        Err(DomainError::Validation(errors)) => Ok(html(views::post_page(
            &detail,
            Some(&user),
            CommentFormView {
                text: &form.text,
                errors: Some(&errors),
            },
        ))),
        Err(err) => Err(err),
    }
}
