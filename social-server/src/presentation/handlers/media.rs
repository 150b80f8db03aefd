use crate::domain::error::DomainError;
use crate::infrastructure::media::MediaStorage;
use crate::presentation::views;
use actix_web::http::StatusCode;
use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{HttpResponse, get, web};

#[get("/media/{path:.*}")]
pub async fn media_file(
    media: web::Data<MediaStorage>,
    path: web::Path<String>,
) -> Result<HttpResponse, DomainError> {
    match media.read(&path.into_inner()).await? {
        Some((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, mime))
            .insert_header((CACHE_CONTROL, "public, max-age=86400"))
            .body(bytes)),
        None => Ok(views::html_response(
            StatusCode::NOT_FOUND,
            views::not_found_page(),
        )),
    }
}
