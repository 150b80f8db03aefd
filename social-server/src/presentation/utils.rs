use actix_web::dev::Payload;
use actix_web::http::header::LOCATION;
use actix_web::{FromRequest, HttpMessage, HttpRequest, HttpResponse};
use futures_util::future::{Ready, ready};

use crate::application::auth_service::AuthService;
use crate::domain::error::DomainError;
use crate::infrastructure::security::JwtKeys;
use crate::presentation::middleware::RequestId;

/// The logged-in user, placed in request extensions by the session middleware.
///
/// Extracting it from an anonymous request fails with a redirect to the login
/// page that comes back to the current URL. Use `Option<AuthenticatedUser>`
/// where anonymous access is fine.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = DomainError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(DomainError::LoginRequired {
                next: request_target(req),
            })),
        }
    }
}

pub async fn extract_user_from_token(
    token: &str,
    keys: &JwtKeys,
    auth_service: &AuthService,
) -> Result<AuthenticatedUser, DomainError> {
    let claims = keys
        .verify_token(token)
        .map_err(|_| DomainError::InvalidCredentials)?;
    let user_id = claims.user_id().ok_or(DomainError::InvalidCredentials)?;

    let user = auth_service
        .get_user(user_id)
        .await
        .map_err(|_| DomainError::InvalidCredentials)?;

    Ok(AuthenticatedUser {
        id: user.id,
        username: user.username,
    })
}

/// Path plus query string of the request.
pub fn request_target(req: &HttpRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string())
}

/// Only local absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

pub fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((LOCATION, location.to_string()))
        .finish()
}

pub fn request_id(req: &HttpRequest) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|rid| rid.0.clone())
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/sarah/1/comment/")), "/sarah/1/comment/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn target_keeps_query() {
        let req = TestRequest::get().uri("/follow/?page=2").to_http_request();
        assert_eq!(request_target(&req), "/follow/?page=2");
    }

    #[actix_web::test]
    async fn anonymous_request_needs_login() {
        let req = TestRequest::post().uri("/sarah/1/comment/").to_http_request();
        let err = AuthenticatedUser::extract(&req).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::LoginRequired { ref next } if next == "/sarah/1/comment/"
        ));
    }

    #[actix_web::test]
    async fn user_from_extensions() {
        let req = TestRequest::get().to_http_request();
        req.extensions_mut().insert(AuthenticatedUser {
            id: 7,
            username: "brian".into(),
        });
        let user = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(user.username, "brian");
    }
}
