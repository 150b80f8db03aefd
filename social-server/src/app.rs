use std::sync::Arc;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{App, Error, HttpServer, web};
use tracing::{debug, info};

use crate::application::auth_service::AuthService;
use crate::application::feed_service::FeedService;
use crate::application::follow_service::FollowService;
use crate::application::group_service::GroupService;
use crate::application::post_service::PostService;
use crate::data::Repositories;
use crate::infrastructure::cache::PageCache;
use crate::infrastructure::media::MediaStorage;
use crate::infrastructure::security::JwtKeys;
use crate::presentation::handlers;
use crate::presentation::middleware::{RequestIdMiddleware, SessionMiddleware, TimingMiddleware};

/// Everything the handlers resolve through `web::Data`, built once and shared
/// by all workers.
#[derive(Clone)]
pub struct Services {
    pub auth: web::Data<AuthService>,
    pub feeds: web::Data<FeedService>,
    pub follows: web::Data<FollowService>,
    pub posts: web::Data<PostService>,
    pub groups: web::Data<GroupService>,
    pub media: web::Data<MediaStorage>,
    pub cache: web::Data<PageCache>,
}

impl Services {
    pub fn new(repos: Repositories, keys: JwtKeys, media: MediaStorage, cache_ttl: Duration) -> Self {
        let follows = FollowService::new(Arc::clone(&repos.follows));
        Self {
            auth: web::Data::new(AuthService::new(Arc::clone(&repos.users), keys)),
            feeds: web::Data::new(FeedService::new(&repos, follows.clone())),
            posts: web::Data::new(PostService::new(&repos, media.clone())),
            groups: web::Data::new(GroupService::new(Arc::clone(&repos.groups))),
            follows: web::Data::new(follows),
            media: web::Data::new(media),
            cache: web::Data::new(PageCache::new(cache_ttl)),
        }
    }
}

/// The application with its middleware stack and routes. Fixed paths are
/// registered before the `/{username}/...` patterns that would shadow them.
pub fn build_app(
    services: Services,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(services.auth)
        .app_data(services.feeds)
        .app_data(services.follows)
        .app_data(services.posts)
        .app_data(services.groups)
        .app_data(services.media)
        .app_data(services.cache)
        .wrap(SessionMiddleware)
        .wrap(TimingMiddleware)
        .wrap(RequestIdMiddleware)
        .wrap(
            DefaultHeaders::new()
                .add(("X-Content-Type-Options", "nosniff"))
                .add(("Referrer-Policy", "same-origin"))
                .add(("X-Frame-Options", "DENY"))
                .add(("Cross-Origin-Opener-Policy", "same-origin")),
        )
        .wrap(Logger::default())
        .service(handlers::misc::health)
        .service(handlers::media::media_file)
        .service(handlers::auth::scope())
        .service(handlers::feed::index)
        .service(handlers::feed::follow_index)
        .service(handlers::feed::group_posts)
        .service(handlers::post::new_post_form)
        .service(handlers::post::create_post)
        .service(handlers::follow::profile_follow)
        .service(handlers::follow::profile_unfollow)
        .service(handlers::feed::profile)
        .service(handlers::post::post_view)
        .service(handlers::post::post_edit_form)
        .service(handlers::post::post_edit)
        .service(handlers::post::add_comment_redirect)
        .service(handlers::post::add_comment)
        .default_service(web::to(handlers::misc::not_found))
}

/// Drops expired pages once per TTL.
fn spawn_cache_sweeper(cache: web::Data<PageCache>) {
    let period = cache.ttl();
    if period.is_zero() {
        return;
    }
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "expired pages dropped");
            }
        }
    });
}

pub async fn start_http_server(services: Services, host: &str, port: u16) -> std::io::Result<()> {
    info!(host, port, "starting HTTP server");
    spawn_cache_sweeper(services.cache.clone());
    HttpServer::new(move || build_app(services.clone()))
        .bind((host, port))?
        .run()
        .await
}
