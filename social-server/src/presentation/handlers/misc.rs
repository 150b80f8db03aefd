use crate::presentation::views;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, get};
use serde_json::json;
use tracing::debug;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    debug!(path = %req.path(), "no route matched");
    views::html_response(StatusCode::NOT_FOUND, views::not_found_page())
}
