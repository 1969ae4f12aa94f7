use serde::{Deserialize, Serialize};

use crate::gallery::domain::{
    Album, AlbumId, Changes, Fields, GalleryError, Photo, PhotoId, UserId,
};
use crate::gallery::policy::{authorize, creator, permits, Capability, Viewer};
use crate::gallery::repository::DynGalleryRepository;

/// An uploaded photo ready to be recorded. The image file is already stored.
#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub fields: Fields,
    pub image_path: String,
    pub albums: Vec<AlbumId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoEdit {
    #[serde(flatten)]
    pub changes: Changes,
    #[serde(default)]
    pub albums: Vec<AlbumId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAlbum {
    #[serde(flatten)]
    pub fields: Fields,
    #[serde(default)]
    pub photos: Vec<PhotoId>,
    #[serde(default)]
    pub cover: Option<PhotoId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumEdit {
    #[serde(flatten)]
    pub changes: Changes,
    #[serde(default)]
    pub photos: Vec<PhotoId>,
    #[serde(default)]
    pub cover: Option<PhotoId>,
}

#[derive(Debug, Serialize)]
pub struct PhotoDetail {
    #[serde(flatten)]
    pub photo: Photo,
    /// Albums containing the photo that the viewer may see
    pub albums: Vec<Album>,
}

#[derive(Debug, Serialize)]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: Album,
    /// Member photos the viewer may see
    pub photos: Vec<Photo>,
}

#[derive(Debug, Serialize)]
pub struct Library {
    pub photos: Vec<Photo>,
    pub albums: Vec<Album>,
}

/// Gallery operations on behalf of a viewer. Every call checks the policy
/// before it reaches the repository.
#[derive(Clone)]
pub struct Gallery {
    repo: DynGalleryRepository,
}

impl Gallery {
    pub fn new(repo: DynGalleryRepository) -> Self {
        Self { repo }
    }

    pub async fn photo(&self, viewer: &Viewer, id: PhotoId) -> Result<Photo, GalleryError> {
        self.guarded_photo(viewer, id, Capability::Read).await
    }

    pub async fn photo_detail(
        &self,
        viewer: &Viewer,
        id: PhotoId,
    ) -> Result<PhotoDetail, GalleryError> {
        let photo = self.guarded_photo(viewer, id, Capability::Read).await?;
        self.describe_photo(viewer, photo).await
    }

    pub async fn album_detail(
        &self,
        viewer: &Viewer,
        id: AlbumId,
    ) -> Result<AlbumDetail, GalleryError> {
        let album = self.guarded_album(viewer, id, Capability::Read).await?;
        self.describe_album(viewer, album).await
    }

    pub async fn readable_photos(&self, viewer: &Viewer) -> Result<Vec<Photo>, GalleryError> {
        self.repo.readable_photos(viewer).await
    }

    pub async fn readable_albums(&self, viewer: &Viewer) -> Result<Vec<Album>, GalleryError> {
        self.repo.readable_albums(viewer).await
    }

    /// The actor's own photos and albums, whatever their visibility.
    pub async fn library(&self, actor: &Viewer) -> Result<Library, GalleryError> {
        let owner = creator(actor)?;
        Ok(Library {
            photos: self.repo.owned_photos(owner).await?,
            albums: self.repo.owned_albums(owner).await?,
        })
    }

    pub async fn random_public_photo(&self) -> Result<Option<Photo>, GalleryError> {
        self.repo.random_public_photo().await
    }

    pub async fn upload_photo(
        &self,
        actor: &Viewer,
        new: NewPhoto,
    ) -> Result<Photo, GalleryError> {
        let owner = creator(actor)?;
        let photo = self
            .repo
            .create_photo(owner, new.fields, &new.image_path, &new.albums)
            .await?;
        tracing::info!(photo = %photo.id, owner = %owner, "Photo uploaded");
        Ok(photo)
    }

    pub async fn edit_photo(
        &self,
        actor: &Viewer,
        id: PhotoId,
        edit: PhotoEdit,
    ) -> Result<PhotoDetail, GalleryError> {
        self.guarded_photo(actor, id, Capability::Edit).await?;
        let photo = self.repo.update_photo(id, edit.changes, &edit.albums).await?;
        self.describe_photo(actor, photo).await
    }

    /// Returns the deleted photo so its image file can be cleaned up.
    pub async fn delete_photo(&self, actor: &Viewer, id: PhotoId) -> Result<Photo, GalleryError> {
        let photo = self.guarded_photo(actor, id, Capability::Delete).await?;
        self.repo.delete_photo(id).await?;
        tracing::info!(photo = %id, "Photo deleted");
        Ok(photo)
    }

    pub async fn create_album(
        &self,
        actor: &Viewer,
        new: NewAlbum,
    ) -> Result<AlbumDetail, GalleryError> {
        let owner = creator(actor)?;
        let album = self
            .repo
            .create_album(owner, new.fields, &new.photos, new.cover)
            .await?;
        tracing::info!(album = %album.id, owner = %owner, "Album created");
        self.describe_album(actor, album).await
    }

    pub async fn edit_album(
        &self,
        actor: &Viewer,
        id: AlbumId,
        edit: AlbumEdit,
    ) -> Result<AlbumDetail, GalleryError> {
        self.guarded_album(actor, id, Capability::Edit).await?;
        let album = self
            .repo
            .update_album(id, edit.changes, &edit.photos, edit.cover)
            .await?;
        self.describe_album(actor, album).await
    }

    pub async fn delete_album(&self, actor: &Viewer, id: AlbumId) -> Result<(), GalleryError> {
        self.guarded_album(actor, id, Capability::Delete).await?;
        self.repo.delete_album(id).await?;
        tracing::info!(album = %id, "Album deleted");
        Ok(())
    }

    pub async fn add_photos(
        &self,
        actor: &Viewer,
        id: AlbumId,
        photos: &[PhotoId],
    ) -> Result<AlbumDetail, GalleryError> {
        let album = self.guarded_album(actor, id, Capability::Edit).await?;
        self.repo.add_photos(album.id, photos).await?;
        let album = self
            .repo
            .album(id)
            .await?
            .ok_or(GalleryError::NotFound("album"))?;
        self.describe_album(actor, album).await
    }

    pub async fn set_cover(
        &self,
        actor: &Viewer,
        id: AlbumId,
        photo: PhotoId,
    ) -> Result<Album, GalleryError> {
        self.guarded_album(actor, id, Capability::Edit).await?;
        self.repo.set_cover(id, photo).await
    }

    /// Whether `owner` may pick `photo` as a favorite.
    pub async fn visible_to(&self, owner: UserId, photo: PhotoId) -> Result<Photo, GalleryError> {
        self.guarded_photo(&Viewer::User(owner), photo, Capability::Read)
            .await
    }

    async fn guarded_photo(
        &self,
        viewer: &Viewer,
        id: PhotoId,
        capability: Capability,
    ) -> Result<Photo, GalleryError> {
        let photo = self
            .repo
            .photo(id)
            .await?
            .ok_or(GalleryError::NotFound("photo"))?;
        authorize(viewer, &photo, capability)?;
        Ok(photo)
    }

    async fn guarded_album(
        &self,
        viewer: &Viewer,
        id: AlbumId,
        capability: Capability,
    ) -> Result<Album, GalleryError> {
        let album = self
            .repo
            .album(id)
            .await?
            .ok_or(GalleryError::NotFound("album"))?;
        authorize(viewer, &album, capability)?;
        Ok(album)
    }

    async fn describe_photo(
        &self,
        viewer: &Viewer,
        photo: Photo,
    ) -> Result<PhotoDetail, GalleryError> {
        let albums = self
            .repo
            .photo_albums(photo.id)
            .await?
            .into_iter()
            .filter(|a| permits(viewer, a.owner_id, a.visibility, Capability::Read))
            .collect();
        Ok(PhotoDetail { photo, albums })
    }

    async fn describe_album(
        &self,
        viewer: &Viewer,
        album: Album,
    ) -> Result<AlbumDetail, GalleryError> {
        let photos = self
            .repo
            .album_photos(album.id)
            .await?
            .into_iter()
            .filter(|p| permits(viewer, p.owner_id, p.visibility, Capability::Read))
            .collect();
        Ok(AlbumDetail { album, photos })
    }
}
