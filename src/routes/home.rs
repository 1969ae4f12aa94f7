use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::AppResult;
use crate::gallery::Photo;
use crate::state::AppState;

pub const DEFAULT_IMAGE_URL: &str = "/static/default.svg";

const DEFAULT_IMAGE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="640" height="480" viewBox="0 0 640 480"><rect width="640" height="480" fill="#d8dee9"/><circle cx="470" cy="150" r="50" fill="#ebcb8b"/><path d="M0 400 L200 220 L340 360 L430 280 L640 440 L640 480 L0 480 Z" fill="#4c566a"/></svg>"##;

pub fn router() -> axum::Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route(DEFAULT_IMAGE_URL, get(default_image))
}

#[derive(Debug, Serialize)]
pub struct Home {
    pub image_url: String,
    pub photo: Option<Photo>,
}

/// GET / - a random public photo, or the placeholder when there is none
pub async fn index(State(state): State<AppState>) -> AppResult<Json<Home>> {
    let photo = state.gallery.random_public_photo().await?;
    let image_url = match &photo {
        Some(photo) => format!("/images/photos/{}/file", photo.id),
        None => DEFAULT_IMAGE_URL.to_string(),
    };
    Ok(Json(Home { image_url, photo }))
}

pub async fn default_image() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        DEFAULT_IMAGE,
    )
}
