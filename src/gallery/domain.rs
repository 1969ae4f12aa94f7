// Gallery domain - photos, albums and the rules that bind them.
// Nothing in here touches the database.
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use crate::db::models::{AlbumId, PhotoId, UserId};

const MAX_TITLE_LEN: usize = 255;

/// Who besides the owner may see a photo or album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Shared => "shared",
            Visibility::Public => "public",
        }
    }

    pub fn is_published(&self) -> bool {
        !matches!(self, Visibility::Private)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = GalleryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "shared" => Ok(Visibility::Shared),
            "public" => Ok(Visibility::Public),
            other => Err(GalleryError::Validation(format!(
                "unknown visibility '{other}'"
            ))),
        }
    }
}

impl ToSql for Visibility {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Visibility {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: GalleryError| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Photo {
    pub id: PhotoId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    /// File name inside the uploads directory
    pub image_path: String,
    pub visibility: Visibility,
    pub uploaded_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Album {
    pub id: AlbumId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub cover_id: Option<PhotoId>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A resource with exactly one owner, fixed at creation.
pub trait Owned {
    /// Resource name used in "not found" errors
    const KIND: &'static str;

    fn owner_id(&self) -> UserId;
    fn visibility(&self) -> Visibility;
}

impl Owned for Photo {
    const KIND: &'static str = "photo";

    fn owner_id(&self) -> UserId {
        self.owner_id
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

impl Owned for Album {
    const KIND: &'static str = "album";

    fn owner_id(&self) -> UserId {
        self.owner_id
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

/// Editable fields of a new photo or album.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Fields {
    pub title: String,
    pub description: String,
    pub visibility: Visibility,
}

impl Fields {
    pub fn validated(self) -> Result<Self, GalleryError> {
        Ok(Self {
            title: validate_title(&self.title)?,
            description: self.description.trim().to_string(),
            visibility: self.visibility,
        })
    }
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Changes {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

impl Changes {
    pub fn validated(self) -> Result<Self, GalleryError> {
        Ok(Self {
            title: self.title.as_deref().map(validate_title).transpose()?,
            description: self.description.map(|d| d.trim().to_string()),
            visibility: self.visibility,
        })
    }
}

pub fn validate_title(title: &str) -> Result<String, GalleryError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(GalleryError::Validation("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(GalleryError::Validation(format!(
            "title must be {MAX_TITLE_LEN} characters or less"
        )));
    }
    Ok(title.to_string())
}

/// Publish timestamp after a visibility change.
///
/// `previous` is the stored visibility and stamp, or `None` for a resource
/// being created. Leaving private stamps `now`; staying published keeps the
/// first stamp; going back to private clears it.
pub fn publish_stamp(
    previous: Option<(Visibility, Option<DateTime<Utc>>)>,
    next: Visibility,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !next.is_published() {
        return None;
    }
    match previous {
        Some((was, stamp)) if was.is_published() => stamp.or(Some(now)),
        _ => Some(now),
    }
}

pub fn same_owner(album: &Album, photo: &Photo) -> bool {
    album.owner_id == photo.owner_id
}

/// Photos from `candidates` that may join `album`. Foreign photos are
/// dropped rather than rejected.
pub fn admissible<'a>(
    album: &Album,
    candidates: impl IntoIterator<Item = &'a Photo>,
) -> Vec<PhotoId> {
    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|photo| same_owner(album, photo))
        .filter(|photo| seen.insert(photo.id))
        .map(|photo| photo.id)
        .collect()
}

/// A cover must share the album's owner and already be one of its photos.
pub fn check_cover(album: &Album, photo: &Photo, is_member: bool) -> Result<(), GalleryError> {
    if !same_owner(album, photo) {
        return Err(GalleryError::Ownership {
            album: album.id,
            photo: photo.id,
        });
    }
    if !is_member {
        return Err(GalleryError::Membership {
            album: album.id,
            photo: photo.id,
        });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("photo {photo} does not belong to the owner of album {album}")]
    Ownership { album: AlbumId, photo: PhotoId },

    #[error("photo {photo} is not in album {album}")]
    Membership { album: AlbumId, photo: PhotoId },

    #[error("{0} not permitted")]
    Authorization(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn photo(id: i64, owner: i64) -> Photo {
        let now = Utc::now();
        Photo {
            id: PhotoId(id),
            owner_id: UserId(owner),
            title: format!("photo {id}"),
            description: String::new(),
            image_path: format!("{id}.jpg"),
            visibility: Visibility::Private,
            uploaded_at: now,
            modified_at: now,
            published_at: None,
        }
    }

    fn album(id: i64, owner: i64) -> Album {
        let now = Utc::now();
        Album {
            id: AlbumId(id),
            owner_id: UserId(owner),
            title: format!("album {id}"),
            description: String::new(),
            cover_id: None,
            visibility: Visibility::Private,
            created_at: now,
            modified_at: now,
            published_at: None,
        }
    }

    #[test]
    fn visibility_parses_and_defaults_to_private() {
        assert_eq!(Visibility::default(), Visibility::Private);
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!(" Shared ".parse::<Visibility>().unwrap(), Visibility::Shared);
        assert!(matches!(
            "friends".parse::<Visibility>(),
            Err(GalleryError::Validation(_))
        ));
    }

    #[test]
    fn admissible_skips_foreign_and_duplicate_photos() {
        let trip = album(1, 10);
        let photos = [photo(1, 10), photo(2, 20), photo(3, 10), photo(1, 10)];
        assert_eq!(admissible(&trip, &photos), vec![PhotoId(1), PhotoId(3)]);
        assert!(admissible(&trip, &[photo(4, 20)]).is_empty());
    }

    #[test]
    fn check_cover_rejects_foreign_photo_before_membership() {
        let trip = album(1, 10);
        let theirs = photo(2, 20);
        let err = check_cover(&trip, &theirs, false).unwrap_err();
        assert!(matches!(err, GalleryError::Ownership { .. }));
    }

    #[test]
    fn check_cover_rejects_non_member() {
        let trip = album(1, 10);
        let mine = photo(1, 10);
        let err = check_cover(&trip, &mine, false).unwrap_err();
        assert!(matches!(err, GalleryError::Membership { .. }));
        assert!(check_cover(&trip, &mine, true).is_ok());
    }

    #[test]
    fn publish_stamp_follows_visibility_transitions() {
        let earlier = Utc::now() - Duration::days(3);
        let now = Utc::now();

        // created private / public
        assert_eq!(publish_stamp(None, Visibility::Private, now), None);
        assert_eq!(publish_stamp(None, Visibility::Public, now), Some(now));

        // private -> shared stamps now
        assert_eq!(
            publish_stamp(Some((Visibility::Private, None)), Visibility::Shared, now),
            Some(now)
        );
        // shared -> public keeps the first stamp
        assert_eq!(
            publish_stamp(
                Some((Visibility::Shared, Some(earlier))),
                Visibility::Public,
                now
            ),
            Some(earlier)
        );
        // public -> private clears
        assert_eq!(
            publish_stamp(
                Some((Visibility::Public, Some(earlier))),
                Visibility::Private,
                now
            ),
            None
        );
    }

    #[test]
    fn fields_validation_trims_and_requires_title() {
        let fields = Fields {
            title: "  Trip  ".into(),
            description: " beach ".into(),
            visibility: Visibility::Public,
        }
        .validated()
        .unwrap();
        assert_eq!(fields.title, "Trip");
        assert_eq!(fields.description, "beach");

        assert!(Fields::default().validated().is_err());
        assert!(validate_title(&"x".repeat(256)).is_err());
        assert!(validate_title(&"x".repeat(255)).is_ok());
    }

    #[test]
    fn changes_validation_only_checks_present_fields() {
        assert!(Changes::default().validated().is_ok());
        let bad = Changes {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert!(bad.validated().is_err());
    }
}
