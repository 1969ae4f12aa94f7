// Repository pattern - all gallery persistence lives here
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::gallery::domain::{
    self, Album, AlbumId, Changes, Fields, GalleryError, Photo, PhotoId, UserId,
};
use crate::gallery::policy::{Viewer, READ_FILTER};
use crate::state::DbPool;

const PHOTO_COLUMNS: &str = "id, owner_id, title, description, image_path, visibility, \
                             uploaded_at, modified_at, published_at";
const ALBUM_COLUMNS: &str = "id, owner_id, title, description, cover_id, visibility, \
                             created_at, modified_at, published_at";

#[async_trait]
pub trait GalleryRepository: Send + Sync {
    /// Insert a photo and link it into those of `albums` that share its owner
    async fn create_photo(
        &self,
        owner: UserId,
        fields: Fields,
        image_path: &str,
        albums: &[AlbumId],
    ) -> Result<Photo, GalleryError>;

    async fn photo(&self, id: PhotoId) -> Result<Option<Photo>, GalleryError>;

    /// Apply field changes, then link into `albums` (additive)
    async fn update_photo(
        &self,
        id: PhotoId,
        changes: Changes,
        albums: &[AlbumId],
    ) -> Result<Photo, GalleryError>;

    async fn delete_photo(&self, id: PhotoId) -> Result<bool, GalleryError>;

    /// Insert an album, add `photos`, then set `cover`. All or nothing.
    async fn create_album(
        &self,
        owner: UserId,
        fields: Fields,
        photos: &[PhotoId],
        cover: Option<PhotoId>,
    ) -> Result<Album, GalleryError>;

    async fn album(&self, id: AlbumId) -> Result<Option<Album>, GalleryError>;

    async fn update_album(
        &self,
        id: AlbumId,
        changes: Changes,
        photos: &[PhotoId],
        cover: Option<PhotoId>,
    ) -> Result<Album, GalleryError>;

    async fn delete_album(&self, id: AlbumId) -> Result<bool, GalleryError>;

    /// Link the given photos into the album, skipping foreign or unknown ones.
    /// Returns the ids that were newly linked.
    async fn add_photos(
        &self,
        album: AlbumId,
        photos: &[PhotoId],
    ) -> Result<Vec<PhotoId>, GalleryError>;

    async fn set_cover(&self, album: AlbumId, photo: PhotoId) -> Result<Album, GalleryError>;

    async fn album_photos(&self, album: AlbumId) -> Result<Vec<Photo>, GalleryError>;

    async fn photo_albums(&self, photo: PhotoId) -> Result<Vec<Album>, GalleryError>;

    async fn readable_photos(&self, viewer: &Viewer) -> Result<Vec<Photo>, GalleryError>;

    async fn readable_albums(&self, viewer: &Viewer) -> Result<Vec<Album>, GalleryError>;

    async fn owned_photos(&self, owner: UserId) -> Result<Vec<Photo>, GalleryError>;

    async fn owned_albums(&self, owner: UserId) -> Result<Vec<Album>, GalleryError>;

    async fn random_public_photo(&self) -> Result<Option<Photo>, GalleryError>;
}

/// SQLite implementation
pub struct SqliteGalleryRepository {
    pool: DbPool,
}

impl SqliteGalleryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GalleryRepository for SqliteGalleryRepository {
    async fn create_photo(
        &self,
        owner: UserId,
        fields: Fields,
        image_path: &str,
        albums: &[AlbumId],
    ) -> Result<Photo, GalleryError> {
        let fields = fields.validated()?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let published_at = domain::publish_stamp(None, fields.visibility, now);

        tx.execute(
            "INSERT INTO photos (owner_id, title, description, image_path, visibility,
                                 uploaded_at, modified_at, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
            params![
                owner,
                fields.title,
                fields.description,
                image_path,
                fields.visibility,
                now,
                published_at
            ],
        )?;
        let id = PhotoId(tx.last_insert_rowid());
        let photo = load_photo(&tx, id)?.ok_or(GalleryError::NotFound("photo"))?;
        link_into_albums(&tx, &photo, albums, now)?;

        tx.commit()?;
        tracing::debug!(photo = %photo.id, owner = %owner, "Photo created");
        Ok(photo)
    }

    async fn photo(&self, id: PhotoId) -> Result<Option<Photo>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(load_photo(&conn, id)?)
    }

    async fn update_photo(
        &self,
        id: PhotoId,
        changes: Changes,
        albums: &[AlbumId],
    ) -> Result<Photo, GalleryError> {
        let changes = changes.validated()?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let current = load_photo(&tx, id)?.ok_or(GalleryError::NotFound("photo"))?;
        let now = Utc::now();

        let visibility = changes.visibility.unwrap_or(current.visibility);
        let published_at = domain::publish_stamp(
            Some((current.visibility, current.published_at)),
            visibility,
            now,
        );
        tx.execute(
            "UPDATE photos
             SET title = ?1, description = ?2, visibility = ?3, published_at = ?4, modified_at = ?5
             WHERE id = ?6",
            params![
                changes.title.unwrap_or(current.title),
                changes.description.unwrap_or(current.description),
                visibility,
                published_at,
                now,
                id
            ],
        )?;
        let photo = load_photo(&tx, id)?.ok_or(GalleryError::NotFound("photo"))?;
        link_into_albums(&tx, &photo, albums, now)?;

        tx.commit()?;
        Ok(photo)
    }

    async fn delete_photo(&self, id: PhotoId) -> Result<bool, GalleryError> {
        let conn = self.pool.get()?;
        // album links cascade, covers and favorites pointing here are nulled
        let rows = conn.execute("DELETE FROM photos WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn create_album(
        &self,
        owner: UserId,
        fields: Fields,
        photos: &[PhotoId],
        cover: Option<PhotoId>,
    ) -> Result<Album, GalleryError> {
        let fields = fields.validated()?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let published_at = domain::publish_stamp(None, fields.visibility, now);

        tx.execute(
            "INSERT INTO albums (owner_id, title, description, visibility,
                                 created_at, modified_at, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
            params![
                owner,
                fields.title,
                fields.description,
                fields.visibility,
                now,
                published_at
            ],
        )?;
        let id = AlbumId(tx.last_insert_rowid());
        let album = load_album(&tx, id)?.ok_or(GalleryError::NotFound("album"))?;
        link_photos(&tx, &album, photos, now)?;
        if let Some(cover) = cover {
            assign_cover(&tx, &album, cover, now)?;
        }
        let album = load_album(&tx, id)?.ok_or(GalleryError::NotFound("album"))?;

        tx.commit()?;
        tracing::debug!(album = %album.id, owner = %owner, "Album created");
        Ok(album)
    }

    async fn album(&self, id: AlbumId) -> Result<Option<Album>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(load_album(&conn, id)?)
    }

    async fn update_album(
        &self,
        id: AlbumId,
        changes: Changes,
        photos: &[PhotoId],
        cover: Option<PhotoId>,
    ) -> Result<Album, GalleryError> {
        let changes = changes.validated()?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let current = load_album(&tx, id)?.ok_or(GalleryError::NotFound("album"))?;
        let now = Utc::now();

        let visibility = changes.visibility.unwrap_or(current.visibility);
        let published_at = domain::publish_stamp(
            Some((current.visibility, current.published_at)),
            visibility,
            now,
        );
        tx.execute(
            "UPDATE albums
             SET title = ?1, description = ?2, visibility = ?3, published_at = ?4, modified_at = ?5
             WHERE id = ?6",
            params![
                changes.title.unwrap_or(current.title),
                changes.description.unwrap_or(current.description),
                visibility,
                published_at,
                now,
                id
            ],
        )?;
        let album = load_album(&tx, id)?.ok_or(GalleryError::NotFound("album"))?;
        link_photos(&tx, &album, photos, now)?;
        if let Some(cover) = cover {
            assign_cover(&tx, &album, cover, now)?;
        }
        let album = load_album(&tx, id)?.ok_or(GalleryError::NotFound("album"))?;

        tx.commit()?;
        Ok(album)
    }

    async fn delete_album(&self, id: AlbumId) -> Result<bool, GalleryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM albums WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn add_photos(
        &self,
        album: AlbumId,
        photos: &[PhotoId],
    ) -> Result<Vec<PhotoId>, GalleryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let album = load_album(&tx, album)?.ok_or(GalleryError::NotFound("album"))?;
        let linked = link_photos(&tx, &album, photos, Utc::now())?;
        tx.commit()?;

        if linked.len() < photos.len() {
            tracing::debug!(
                album = %album.id,
                requested = photos.len(),
                linked = linked.len(),
                "Some photos were already linked or not admissible"
            );
        }
        Ok(linked)
    }

    async fn set_cover(&self, album: AlbumId, photo: PhotoId) -> Result<Album, GalleryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let current = load_album(&tx, album)?.ok_or(GalleryError::NotFound("album"))?;
        assign_cover(&tx, &current, photo, Utc::now())?;
        let updated = load_album(&tx, album)?.ok_or(GalleryError::NotFound("album"))?;
        tx.commit()?;
        Ok(updated)
    }

    async fn album_photos(&self, album: AlbumId) -> Result<Vec<Photo>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(query_photos(
            &conn,
            "WHERE id IN (SELECT photo_id FROM album_photos WHERE album_id = ?1)",
            params![album],
        )?)
    }

    async fn photo_albums(&self, photo: PhotoId) -> Result<Vec<Album>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(query_albums(
            &conn,
            "WHERE id IN (SELECT album_id FROM album_photos WHERE photo_id = ?1)",
            params![photo],
        )?)
    }

    async fn readable_photos(&self, viewer: &Viewer) -> Result<Vec<Photo>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(query_photos(
            &conn,
            &format!("WHERE {READ_FILTER}"),
            params![viewer.user_id()],
        )?)
    }

    async fn readable_albums(&self, viewer: &Viewer) -> Result<Vec<Album>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(query_albums(
            &conn,
            &format!("WHERE {READ_FILTER}"),
            params![viewer.user_id()],
        )?)
    }

    async fn owned_photos(&self, owner: UserId) -> Result<Vec<Photo>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(query_photos(&conn, "WHERE owner_id = ?1", params![owner])?)
    }

    async fn owned_albums(&self, owner: UserId) -> Result<Vec<Album>, GalleryError> {
        let conn = self.pool.get()?;
        Ok(query_albums(&conn, "WHERE owner_id = ?1", params![owner])?)
    }

    async fn random_public_photo(&self) -> Result<Option<Photo>, GalleryError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE visibility = 'public'",
            [],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Ok(None);
        }

        let offset = rand::thread_rng().gen_range(0..count);
        let photo = conn
            .query_row(
                &format!(
                    "SELECT {PHOTO_COLUMNS} FROM photos WHERE visibility = 'public'
                     ORDER BY id LIMIT 1 OFFSET ?1"
                ),
                params![offset],
                photo_from_row,
            )
            .optional()?;
        Ok(photo)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynGalleryRepository = Arc<dyn GalleryRepository>;

// -- Row mapping --

fn photo_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        image_path: row.get(4)?,
        visibility: row.get(5)?,
        uploaded_at: row.get(6)?,
        modified_at: row.get(7)?,
        published_at: row.get(8)?,
    })
}

fn album_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        cover_id: row.get(4)?,
        visibility: row.get(5)?,
        created_at: row.get(6)?,
        modified_at: row.get(7)?,
        published_at: row.get(8)?,
    })
}

fn load_photo(conn: &Connection, id: PhotoId) -> rusqlite::Result<Option<Photo>> {
    conn.query_row(
        &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"),
        params![id],
        photo_from_row,
    )
    .optional()
}

fn load_album(conn: &Connection, id: AlbumId) -> rusqlite::Result<Option<Album>> {
    conn.query_row(
        &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
        params![id],
        album_from_row,
    )
    .optional()
}

fn query_photos(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Photo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PHOTO_COLUMNS} FROM photos {filter} ORDER BY uploaded_at DESC, id DESC"
    ))?;
    let photos = stmt
        .query_map(params, photo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(photos)
}

fn query_albums(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Album>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALBUM_COLUMNS} FROM albums {filter} ORDER BY created_at DESC, id DESC"
    ))?;
    let albums = stmt
        .query_map(params, album_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(albums)
}

fn is_member(conn: &Connection, album: AlbumId, photo: PhotoId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM album_photos WHERE album_id = ?1 AND photo_id = ?2)",
        params![album, photo],
        |row| row.get(0),
    )
}

// -- Guarded join --

/// Link `ids` into `album` under the same-owner rule. Unknown and foreign
/// photos are skipped. Returns the ids newly linked.
fn link_photos(
    conn: &Connection,
    album: &Album,
    ids: &[PhotoId],
    now: DateTime<Utc>,
) -> Result<Vec<PhotoId>, GalleryError> {
    let mut candidates = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(photo) = load_photo(conn, *id)? {
            candidates.push(photo);
        }
    }

    let mut linked = Vec::new();
    for photo_id in domain::admissible(album, &candidates) {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO album_photos (album_id, photo_id) VALUES (?1, ?2)",
            params![album.id, photo_id],
        )?;
        if inserted > 0 {
            linked.push(photo_id);
        }
    }

    if !linked.is_empty() {
        conn.execute(
            "UPDATE albums SET modified_at = ?1 WHERE id = ?2",
            params![now, album.id],
        )?;
    }
    Ok(linked)
}

/// The same join from the photo's side.
fn link_into_albums(
    conn: &Connection,
    photo: &Photo,
    ids: &[AlbumId],
    now: DateTime<Utc>,
) -> Result<Vec<AlbumId>, GalleryError> {
    let mut linked = Vec::new();
    for id in ids {
        let Some(album) = load_album(conn, *id)? else {
            continue;
        };
        if !link_photos(conn, &album, &[photo.id], now)?.is_empty() {
            linked.push(album.id);
        }
    }
    Ok(linked)
}

fn assign_cover(
    conn: &Connection,
    album: &Album,
    photo: PhotoId,
    now: DateTime<Utc>,
) -> Result<(), GalleryError> {
    let photo = load_photo(conn, photo)?.ok_or(GalleryError::NotFound("photo"))?;
    let member = is_member(conn, album.id, photo.id)?;
    domain::check_cover(album, &photo, member)?;

    conn.execute(
        "UPDATE albums SET cover_id = ?1, modified_at = ?2 WHERE id = ?3",
        params![photo.id, now, album.id],
    )?;
    Ok(())
}
