use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, MaybeUser, PathParam};
use crate::gallery::domain::Fields;
use crate::gallery::service::{
    AlbumDetail, AlbumEdit, Library, NewAlbum, NewPhoto, PhotoDetail, PhotoEdit,
};
use crate::gallery::{Album, AlbumId, Photo, PhotoId};
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/images/library", get(library))
        .route(
            "/images/photos",
            get(list_photos)
                .post(upload_photo)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/images/photos/{id}", get(photo).delete(delete_photo))
        .route("/images/photos/{id}/edit", post(edit_photo))
        .route("/images/photos/{id}/file", get(photo_file))
        .route("/images/albums", get(list_albums).post(create_album))
        .route("/images/albums/{id}", get(album).delete(delete_album))
        .route("/images/albums/{id}/edit", post(edit_album))
        .route("/images/albums/{id}/photos", post(add_photos))
        .route("/images/albums/{id}/cover", post(set_cover))
}

#[derive(Deserialize)]
pub struct AddPhotosRequest {
    pub photos: Vec<PhotoId>,
}

#[derive(Deserialize)]
pub struct CoverRequest {
    pub photo: PhotoId,
}

/// GET /images/library - the user's own photos and albums
pub async fn library(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Library>> {
    Ok(Json(state.gallery.library(&user.viewer()).await?))
}

// -- Photos --

/// GET /images/photos - every photo the viewer may see
pub async fn list_photos(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
) -> AppResult<Json<Vec<Photo>>> {
    Ok(Json(state.gallery.readable_photos(&maybe_user.viewer()).await?))
}

/// POST /images/photos (multipart)
/// Fields: image (file), title, description, visibility, albums (ids,
/// repeated or comma separated)
pub async fn upload_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = UploadForm::read(multipart).await?;
    let (file_name, bytes) = form
        .image
        .ok_or_else(|| AppError::BadRequest("an image file is required".into()))?;

    let image_path = state.media.store(&file_name, &bytes).await?;
    let new = NewPhoto {
        fields: form.fields,
        image_path: image_path.clone(),
        albums: form.albums,
    };
    match state.gallery.upload_photo(&user.viewer(), new).await {
        Ok(photo) => Ok((StatusCode::CREATED, Json(photo)).into_response()),
        Err(e) => {
            state.media.remove(&image_path).await;
            Err(e.into())
        }
    }
}

/// GET /images/photos/{id}
pub async fn photo(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    PathParam(id): PathParam<PhotoId>,
) -> AppResult<Json<PhotoDetail>> {
    Ok(Json(state.gallery.photo_detail(&maybe_user.viewer(), id).await?))
}

/// POST /images/photos/{id}/edit
pub async fn edit_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<PhotoId>,
    JsonBody(edit): JsonBody<PhotoEdit>,
) -> AppResult<Json<PhotoDetail>> {
    Ok(Json(state.gallery.edit_photo(&user.viewer(), id, edit).await?))
}

/// DELETE /images/photos/{id}
pub async fn delete_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<PhotoId>,
) -> AppResult<StatusCode> {
    let photo = state.gallery.delete_photo(&user.viewer(), id).await?;
    state.media.remove(&photo.image_path).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /images/photos/{id}/file - the image bytes, after the read check
pub async fn photo_file(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    PathParam(id): PathParam<PhotoId>,
) -> AppResult<Response> {
    let photo = state.gallery.photo(&maybe_user.viewer(), id).await?;
    let (bytes, mime) = state.media.read(&photo.image_path).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        bytes,
    )
        .into_response())
}

// -- Albums --

/// GET /images/albums - every album the viewer may see
pub async fn list_albums(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
) -> AppResult<Json<Vec<Album>>> {
    Ok(Json(state.gallery.readable_albums(&maybe_user.viewer()).await?))
}

/// POST /images/albums
/// Body: { title, description, visibility, photos: [ids], cover: id }
pub async fn create_album(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(new): JsonBody<NewAlbum>,
) -> AppResult<Response> {
    let album = state.gallery.create_album(&user.viewer(), new).await?;
    Ok((StatusCode::CREATED, Json(album)).into_response())
}

/// GET /images/albums/{id}
pub async fn album(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    PathParam(id): PathParam<AlbumId>,
) -> AppResult<Json<AlbumDetail>> {
    Ok(Json(state.gallery.album_detail(&maybe_user.viewer(), id).await?))
}

/// POST /images/albums/{id}/edit
pub async fn edit_album(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<AlbumId>,
    JsonBody(edit): JsonBody<AlbumEdit>,
) -> AppResult<Json<AlbumDetail>> {
    Ok(Json(state.gallery.edit_album(&user.viewer(), id, edit).await?))
}

/// DELETE /images/albums/{id} - member photos stay
pub async fn delete_album(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<AlbumId>,
) -> AppResult<StatusCode> {
    state.gallery.delete_album(&user.viewer(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /images/albums/{id}/photos
/// Body: { photos: [ids] }; photos of other owners are skipped
pub async fn add_photos(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<AlbumId>,
    JsonBody(req): JsonBody<AddPhotosRequest>,
) -> AppResult<Json<AlbumDetail>> {
    Ok(Json(
        state
            .gallery
            .add_photos(&user.viewer(), id, &req.photos)
            .await?,
    ))
}

/// POST /images/albums/{id}/cover
/// Body: { photo: id }; the photo must be an owned member
pub async fn set_cover(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<AlbumId>,
    JsonBody(req): JsonBody<CoverRequest>,
) -> AppResult<Json<Album>> {
    Ok(Json(
        state
            .gallery
            .set_cover(&user.viewer(), id, req.photo)
            .await?,
    ))
}

/// Parsed multipart upload.
#[derive(Debug, Default)]
struct UploadForm {
    fields: Fields,
    albums: Vec<AlbumId>,
    image: Option<(String, Vec<u8>)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                form.image = Some((file_name, bytes.to_vec()));
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            form.set(&name, &value)?;
        }
        Ok(form)
    }

    fn set(&mut self, name: &str, value: &str) -> AppResult<()> {
        match name {
            "title" => self.fields.title = value.to_string(),
            "description" => self.fields.description = value.to_string(),
            "visibility" => self.fields.visibility = value.trim().parse()?,
            "albums" => {
                for id in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let id = id
                        .parse()
                        .map_err(|_| AppError::BadRequest(format!("invalid album id '{id}'")))?;
                    self.albums.push(AlbumId(id));
                }
            }
            other => tracing::debug!("Ignoring upload field '{}'", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::Visibility;

    #[test]
    fn upload_form_collects_text_fields() {
        let mut form = UploadForm::default();
        form.set("title", "Beach").unwrap();
        form.set("visibility", "public").unwrap();
        form.set("albums", "3, 4").unwrap();
        form.set("albums", "7").unwrap();
        form.set("unknown", "ignored").unwrap();

        assert_eq!(form.fields.title, "Beach");
        assert_eq!(form.fields.visibility, Visibility::Public);
        assert_eq!(form.albums, vec![AlbumId(3), AlbumId(4), AlbumId(7)]);
    }

    #[test]
    fn upload_form_rejects_bad_values() {
        let mut form = UploadForm::default();
        assert!(form.set("visibility", "friends-only").is_err());
        assert!(form.set("albums", "seven").is_err());
    }
}
