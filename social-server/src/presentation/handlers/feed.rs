use crate::application::feed_service::FeedService;
use crate::domain::error::DomainError;
use crate::infrastructure::cache::{PageCache, page_key};
use crate::presentation::dto::PageQuery;
use crate::presentation::utils::{AuthenticatedUser, html, request_id, request_target};
use crate::presentation::views;
use actix_web::{HttpRequest, HttpResponse, get, web};
use tracing::{debug, info};

/// Home page. Rendered pages are reused until they age out of the cache, so
/// new posts show up with a delay.
#[get("/")]
pub async fn index(
    req: HttpRequest,
    viewer: Option<AuthenticatedUser>,
    feeds: web::Data<FeedService>,
    cache: web::Data<PageCache>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, DomainError> {
    let key = page_key(&request_target(&req), viewer.as_ref().map(|user| user.id));
    if let Some(body) = cache.get(&key) {
        return Ok(html(body));
    }

    let page = feeds.global_feed(query.number()).await?;
    let follows_anyone = match &viewer {
        Some(user) => feeds.follows_anyone(user.id).await?,
        None => false,
    };
    let body = views::index_page(&page, viewer.as_ref(), follows_anyone);
    cache.insert(key, body.clone());

    debug!(
        request_id = %request_id(&req),
        page = page.number,
        "home page rendered"
    );

    Ok(html(body))
}

#[get("/follow/")]
pub async fn follow_index(
    req: HttpRequest,
    user: AuthenticatedUser,
    feeds: web::Data<FeedService>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, DomainError> {
    let page = feeds.followed_feed(user.id, query.number()).await?;

    info!(
        request_id = %request_id(&req),
        username = %user.username,
        total = page.total,
        "followed feed retrieved"
    );

    Ok(html(views::follow_page(&page, Some(&user))))
}

#[get("/group/{slug}/")]
pub async fn group_posts(
    viewer: Option<AuthenticatedUser>,
    feeds: web::Data<FeedService>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, DomainError> {
    let feed = feeds.group_feed(&path.into_inner(), query.number()).await?;
    Ok(html(views::group_page(&feed, viewer.as_ref())))
}

#[get("/{username}/")]
pub async fn profile(
    viewer: Option<AuthenticatedUser>,
    feeds: web::Data<FeedService>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, DomainError> {
    let feed = feeds
        .author_feed(
            &path.into_inner(),
            viewer.as_ref().map(|user| user.id),
            query.number(),
        )
        .await?;
    Ok(html(views::profile_page(&feed, viewer.as_ref())))
}
