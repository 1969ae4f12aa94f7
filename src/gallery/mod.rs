pub mod domain;
pub mod policy;
pub mod repository;
pub mod service;

pub use domain::{Album, AlbumId, GalleryError, Photo, PhotoId, Visibility};
pub use policy::{Capability, Viewer};
pub use repository::{DynGalleryRepository, GalleryRepository, SqliteGalleryRepository};
pub use service::Gallery;
