use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::accounts::AccountError;
use crate::gallery::GalleryError;
use crate::media::MediaError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        match err {
            // Unreadable and unwritable look exactly like absent
            GalleryError::NotFound(what) | GalleryError::Authorization(what) => {
                AppError::NotFound(what)
            }
            GalleryError::Validation(msg) => AppError::BadRequest(msg),
            e @ (GalleryError::Ownership { .. } | GalleryError::Membership { .. }) => {
                AppError::Unprocessable(e.to_string())
            }
            GalleryError::Database(e) => AppError::Database(e),
            GalleryError::Pool(e) => AppError::Pool(e),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(msg) => AppError::BadRequest(msg),
            AccountError::Conflict(msg) => AppError::Conflict(msg),
            AccountError::NotFound(what) => AppError::NotFound(what),
            AccountError::InvalidCredentials | AccountError::Inactive => AppError::Unauthorized,
            AccountError::Gallery(e) => e.into(),
            AccountError::Hash(e) => AppError::Internal(e.to_string()),
            AccountError::Misconfigured(msg) => AppError::Internal(msg),
            AccountError::Database(e) => AppError::Database(e),
            AccountError::Pool(e) => AppError::Pool(e),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAnImage(_) | MediaError::Empty => AppError::BadRequest(err.to_string()),
            MediaError::Missing(name) => {
                tracing::warn!(file = %name, "Image file missing for stored photo");
                AppError::NotFound("image")
            }
            MediaError::Io(e) => AppError::Io(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
