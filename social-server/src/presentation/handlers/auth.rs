use crate::application::auth_service::AuthService;
use crate::domain::error::{DomainError, FormErrors};
use crate::infrastructure::security::SESSION_COOKIE;
use crate::presentation::dto::{LoginForm, LoginQuery, SignupForm, USERNAME_TAKEN};
use crate::presentation::utils::{html, request_id, safe_next};
use crate::presentation::views;
use actix_web::cookie::time::Duration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header::LOCATION;
use actix_web::{HttpRequest, HttpResponse, Scope, get, post, web};
use tracing::{info, warn};
use validator::Validate;

const BAD_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

pub fn scope() -> Scope {
    web::scope("/auth")
        .service(signup_form)
        .service(signup)
        .service(login_form)
        .service(login)
        .service(logout)
}

fn session_cookie(token: String, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::hours(ttl_hours))
        .finish()
}

fn logged_in(location: &str, token: String, ttl_hours: i64) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((LOCATION, location.to_string()))
        .cookie(session_cookie(token, ttl_hours))
        .finish()
}

#[get("/signup/")]
pub async fn signup_form() -> HttpResponse {
    html(views::signup_page("", "", &FormErrors::new()))
}

#[post("/signup/")]
pub async fn signup(
    req: HttpRequest,
    service: web::Data<AuthService>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse, DomainError> {
    let form = form.into_inner();
    if let Err(errors) = form.validate() {
        let errors = FormErrors::from(errors);
        return Ok(html(views::signup_page(&form.username, &form.email, &errors)));
    }

    let user = match service
        .register(form.username.clone(), form.email.clone(), form.password1)
        .await
    {
        Ok(user) => user,
        Err(DomainError::UserAlreadyExists(_)) => {
            let mut errors = FormErrors::new();
            errors.add("username", USERNAME_TAKEN);
            return Ok(html(views::signup_page(&form.username, &form.email, &errors)));
        }
        Err(err) => return Err(err),
    };

    info!(
        request_id = %request_id(&req),
        user_id = user.id,
        username = %user.username,
        "user registered"
    );

    let token = service.issue_token(&user)?;
    Ok(logged_in("/", token, service.keys().ttl_hours()))
}

#[get("/login/")]
pub async fn login_form(query: web::Query<LoginQuery>) -> HttpResponse {
    let next = safe_next(query.next.as_deref());
    html(views::login_page(&next, "", None))
}

#[post("/login/")]
pub async fn login(
    req: HttpRequest,
    service: web::Data<AuthService>,
    query: web::Query<LoginQuery>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, DomainError> {
    let form = form.into_inner();
    let next = safe_next(form.next.as_deref().or(query.next.as_deref()));

    match service.login(&form.username, &form.password).await {
        Ok((user, token)) => {
            info!(
                request_id = %request_id(&req),
                username = %user.username,
                next = %next,
                "session started"
            );
            Ok(logged_in(&next, token, service.keys().ttl_hours()))
        }
        Err(DomainError::InvalidCredentials) => {
            warn!(
                request_id = %request_id(&req),
                username = %form.username,
                "failed login"
            );
            Ok(html(views::login_page(&next, &form.username, Some(BAD_LOGIN))))
        }
        Err(err) => Err(err),
    }
}

#[get("/logout/")]
pub async fn logout() -> HttpResponse {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    HttpResponse::Found()
        .insert_header((LOCATION, "/"))
        .cookie(cookie)
        .finish()
}
