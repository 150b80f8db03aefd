use std::io::Cursor;
use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use actix_web::test::{self, TestRequest};
use social_server::app::{Services, build_app};
use social_server::data::Repositories;
use social_server::data::group_repository::GroupRepository;
use social_server::data::memory::MemoryStore;
use social_server::data::post_repository::PostRepository;
use social_server::data::user_repository::UserRepository;
use social_server::domain::group::NewGroup;
use social_server::domain::page::PageNumber;
use social_server::domain::post::{FeedFilter, NewPost};
use social_server::domain::user::{NewUser, User};
use social_server::infrastructure::media::{INVALID_IMAGE, MediaStorage};
use social_server::infrastructure::security::{JwtKeys, SESSION_COOKIE};
use tempfile::TempDir;

const BOUNDARY: &str = "----social-test-boundary";
const PASSWORD: &str = "zxnm11a!s";

struct TestEnv {
    repos: Repositories,
    services: Services,
    _media: TempDir,
}

impl TestEnv {
    fn new(cache_ttl: Duration) -> Self {
        let media = tempfile::tempdir().unwrap();
        let repos = Repositories::in_memory(MemoryStore::new());
        let services = Services::new(
            repos.clone(),
            JwtKeys::new("test-secret".into(), 1),
            MediaStorage::new(media.path()),
            cache_ttl,
        );
        Self {
            repos,
            services,
            _media: media,
        }
    }

    /// A user with a session cookie, skipping password hashing.
    async fn user(&self, username: &str) -> (User, Cookie<'static>) {
        let user = self
            .repos
            .users
            .create(NewUser::new(
                username.into(),
                format!("{username}@example.com"),
                "unusable".into(),
            ))
            .await
            .unwrap();
        self.session(user)
    }

    /// A user who can log in with [`PASSWORD`].
    async fn registered(&self, username: &str) -> (User, Cookie<'static>) {
        let user = self
            .services
            .auth
            .register(
                username.into(),
                format!("{username}@example.com"),
                PASSWORD.into(),
            )
            .await
            .unwrap();
        self.session(user)
    }

    fn session(&self, user: User) -> (User, Cookie<'static>) {
        let token = self.services.auth.issue_token(&user).unwrap();
        (user, Cookie::new(SESSION_COOKIE, token))
    }

    async fn group(&self) -> i64 {
        self.repos
            .groups
            .create(NewGroup {
                title: "test123".into(),
                slug: "test".into(),
                description: "testing".into(),
            })
            .await
            .unwrap()
            .id
    }

    async fn post(&self, author: &User, text: &str) -> i64 {
        self.repos
            .posts
            .create(NewPost {
                text: text.into(),
                author_id: author.id,
                group_id: None,
                image: None,
            })
            .await
            .unwrap()
            .id
    }
}

fn png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(3, 3, image::Rgb([10, 120, 200]))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// `(name, filename, content)` triples as a multipart/form-data body.
fn multipart(fields: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, filename, content) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
    resp.headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn body_text<B: actix_web::body::MessageBody>(resp: actix_web::dev::ServiceResponse<B>) -> String {
    String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
}

#[actix_web::test]
async fn post_with_image_is_shown_everywhere() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (_, sarah) = env.user("sarah").await;
    let group_id = env.group().await.to_string();
    let image = png();

    let (content_type, body) = multipart(&[
        ("text", None, b"fred".as_slice()),
        ("group", None, group_id.as_bytes()),
        ("image", Some("small.png"), image.as_slice()),
    ]);
    let req = TestRequest::post()
        .uri("/new")
        .cookie(sarah.clone())
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");

    for uri in ["/", "/sarah/", "/group/test/", "/sarah/1/"] {
        let req = TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        let page = body_text(resp).await;
        assert!(page.contains("fred"), "{uri}");
        assert!(page.contains("<img"), "{uri}");
    }

    let stored = env.repos.posts.find_by_id(1).await.unwrap().unwrap();
    let req = TestRequest::get()
        .uri(&format!("/media/{}", stored.image.unwrap()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "image/png");
}

#[actix_web::test]
async fn non_image_upload_is_a_form_error() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (_, sarah) = env.user("sarah").await;

    let (content_type, body) = multipart(&[
        ("text", None, b"fred".as_slice()),
        ("image", Some("notes.txt"), b"definitely not an image".as_slice()),
    ]);
    let req = TestRequest::post()
        .uri("/new")
        .cookie(sarah)
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_text(resp).await;
    assert!(page.contains(INVALID_IMAGE));
    assert!(page.contains("fred"));
    assert_eq!(env.repos.posts.count(FeedFilter::All).await.unwrap(), 0);
}

#[actix_web::test]
async fn anonymous_comment_goes_through_login() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (sarah, _) = env.registered("sarah").await;
    env.post(&sarah, "fred").await;

    let req = TestRequest::post()
        .uri("/sarah/1/comment/")
        .set_form([("text", "test_comment")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        location(&resp),
        "/auth/login/?next=%2Fsarah%2F1%2Fcomment%2F"
    );

    let req = TestRequest::get()
        .uri("/auth/login/?next=%2Fsarah%2F1%2Fcomment%2F")
        .to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert!(page.contains(r#"name="next" value="/sarah/1/comment/""#));

    let req = TestRequest::post()
        .uri("/auth/login/")
        .set_form([
            ("username", "sarah"),
            ("password", PASSWORD),
            ("next", "/sarah/1/comment/"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/sarah/1/comment/");
    let set_cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with(&format!("{SESSION_COOKIE}=")));
    assert!(set_cookie.contains("HttpOnly"));
}

#[actix_web::test]
async fn wrong_password_rerenders_login() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    env.registered("sarah").await;

    let req = TestRequest::post()
        .uri("/auth/login/")
        .set_form([("username", "sarah"), ("password", "nope"), ("next", "/")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(SET_COOKIE).is_none());
    assert!(body_text(resp).await.contains("Please enter a correct username"));
}

#[actix_web::test]
async fn signup_logs_the_new_user_in() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;

    let req = TestRequest::post()
        .uri("/auth/signup/")
        .set_form([
            ("username", "newbie"),
            ("email", "newbie@example.com"),
            ("password1", "long enough pw"),
            ("password2", "long enough pw"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(resp.headers().get(SET_COOKIE).is_some());
    assert!(env.repos.users.find_by_username("newbie").await.unwrap().is_some());

    let req = TestRequest::post()
        .uri("/auth/signup/")
        .set_form([
            ("username", "newbie"),
            ("email", "other@example.com"),
            ("password1", "long enough pw"),
            ("password2", "long enough pw"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("already exists"));
}

#[actix_web::test]
async fn route_names_are_not_available_as_usernames() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;

    for username in ["follow", "media", "auth", "group", "new", "health"] {
        let req = TestRequest::post()
            .uri("/auth/signup/")
            .set_form([
                ("username", username),
                ("email", "taken@example.com"),
                ("password1", "long enough pw"),
                ("password2", "long enough pw"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{username}");
        assert!(resp.headers().get(SET_COOKIE).is_none(), "{username}");
        assert!(body_text(resp).await.contains("already exists"), "{username}");
        assert!(
            env.repos.users.find_by_username(username).await.unwrap().is_none(),
            "{username}"
        );
    }
}

#[actix_web::test]
async fn comments_are_listed_under_the_post() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (sarah, _) = env.user("sarah").await;
    let (_, brian) = env.user("brian").await;
    env.post(&sarah, "fred").await;

    let req = TestRequest::post()
        .uri("/sarah/1/comment/")
        .cookie(brian.clone())
        .set_form([("text", "test_comment")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/sarah/1/");

    let req = TestRequest::get().uri("/sarah/1/").to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert!(page.contains("test_comment"));

    let req = TestRequest::post()
        .uri("/sarah/1/comment/")
        .cookie(brian)
        .set_form([("text", "   ")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("errorlist"));
}

#[actix_web::test]
async fn home_page_serves_stale_copy_until_ttl() {
    let env = TestEnv::new(Duration::from_millis(300));
    let app = test::init_service(build_app(env.services.clone())).await;
    let (sarah, _) = env.user("sarah").await;

    let req = TestRequest::get().uri("/").to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert!(!page.contains("cache text"));

    env.post(&sarah, "cache text").await;
    let req = TestRequest::get().uri("/").to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert!(!page.contains("cache text"));

    // Other query strings are separate entries.
    let req = TestRequest::get().uri("/?page=1").to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert!(page.contains("cache text"));

    actix_web::rt::time::sleep(Duration::from_millis(400)).await;
    let req = TestRequest::get().uri("/").to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert_eq!(page.matches("cache text").count(), 1);
}

#[actix_web::test]
async fn follow_unfollow_and_followed_feed() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (sarah, sarah_cookie) = env.user("sarah").await;
    let (brian, brian_cookie) = env.user("brian").await;
    env.post(&sarah, "favourite users").await;

    for _ in 0..2 {
        let req = TestRequest::get()
            .uri("/sarah/follow")
            .cookie(brian_cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/sarah/");
    }
    assert_eq!(env.services.follows.follower_count(sarah.id).await.unwrap(), 1);
    assert!(env.services.follows.is_following(brian.id, sarah.id).await.unwrap());

    let req = TestRequest::get()
        .uri("/follow/")
        .cookie(brian_cookie.clone())
        .to_request();
    assert!(body_text(test::call_service(&app, req).await).await.contains("favourite users"));

    let req = TestRequest::get()
        .uri("/follow/")
        .cookie(sarah_cookie.clone())
        .to_request();
    assert!(!body_text(test::call_service(&app, req).await).await.contains("favourite users"));

    let req = TestRequest::get()
        .uri("/sarah/follow")
        .cookie(sarah_cookie)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);
    assert_eq!(env.services.follows.following_count(sarah.id).await.unwrap(), 0);

    let req = TestRequest::get()
        .uri("/sarah/unfollow")
        .cookie(brian_cookie.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);
    assert_eq!(env.services.follows.follower_count(sarah.id).await.unwrap(), 0);
    let feed = env
        .services
        .feeds
        .followed_feed(brian.id, PageNumber::first())
        .await
        .unwrap();
    assert!(feed.is_empty());
}

#[actix_web::test]
async fn login_required_pages_redirect() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    env.user("sarah").await;

    for (uri, expected) in [
        ("/new", "/auth/login/?next=%2Fnew"),
        ("/follow/", "/auth/login/?next=%2Ffollow%2F"),
        ("/sarah/follow", "/auth/login/?next=%2Fsarah%2Ffollow"),
    ] {
        let req = TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(location(&resp), expected);
    }
}

#[actix_web::test]
async fn only_the_author_edits() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (sarah, sarah_cookie) = env.user("sarah").await;
    let (_, brian_cookie) = env.user("brian").await;
    env.post(&sarah, "fred").await;

    let req = TestRequest::get()
        .uri("/sarah/1/edit")
        .cookie(brian_cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/sarah/1/");

    let req = TestRequest::get()
        .uri("/sarah/1/edit")
        .cookie(sarah_cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("fred"));

    let (content_type, body) = multipart(&[
        ("text", None, b"  ".as_slice()),
        ("image", Some("notes.txt"), b"definitely not an image".as_slice()),
    ]);
    let req = TestRequest::post()
        .uri("/sarah/1/edit")
        .cookie(sarah_cookie.clone())
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_text(resp).await;
    assert!(page.contains(INVALID_IMAGE));
    assert_eq!(page.matches("errorlist").count(), 2);
    let post = env.repos.posts.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(post.text, "fred");

    let (content_type, body) = multipart(&[("text", None, b"fred, edited".as_slice())]);
    let req = TestRequest::post()
        .uri("/sarah/1/edit")
        .cookie(sarah_cookie.clone())
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/sarah/1/");

    let post = env.repos.posts.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(post.text, "fred, edited");
    assert_eq!(post.image, None);

    let image = png();
    let (content_type, body) = multipart(&[
        ("text", None, b"fred, edited".as_slice()),
        ("image", Some("small.png"), image.as_slice()),
    ]);
    let req = TestRequest::post()
        .uri("/sarah/1/edit")
        .cookie(sarah_cookie)
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let req = TestRequest::get().uri("/sarah/1/").to_request();
    let page = body_text(test::call_service(&app, req).await).await;
    assert!(page.contains("<img"));
    assert!(env.repos.posts.find_by_id(1).await.unwrap().unwrap().image.is_some());
}

#[actix_web::test]
async fn unknown_things_are_404() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let (sarah, _) = env.user("sarah").await;
    let (_, brian_cookie) = env.user("brian").await;
    env.post(&sarah, "fred").await;

    for uri in [
        "/group/missing/",
        "/ghost/",
        "/sarah/999/",
        "/brian/1/",
        "/sarah/not-a-number/",
        "/media/posts/missing.png",
        "/a/b/c/d/e",
    ] {
        let req = TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let req = TestRequest::get()
        .uri("/ghost/follow")
        .cookie(brian_cookie)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn health_reports_ok() {
    let env = TestEnv::new(Duration::ZERO);
    let app = test::init_service(build_app(env.services.clone())).await;
    let req = TestRequest::get().uri("/health").to_request();
    let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json["status"], "ok");
}
