use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::{Accounts, SqliteAccountRepository};
use crate::config::Config;
use crate::gallery::{Gallery, SqliteGalleryRepository};
use crate::media::MediaStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub gallery: Gallery,
    pub accounts: Accounts,
    pub media: MediaStore,
}

impl AppState {
    /// Wire the SQLite repositories and upload store over one pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let gallery = Gallery::new(Arc::new(SqliteGalleryRepository::new(db.clone())));
        let accounts = Accounts::new(
            Arc::new(SqliteAccountRepository::new(db.clone())),
            gallery.clone(),
            config.auth.clone(),
        );
        let media = MediaStore::new(config.uploads_path());
        Self {
            db,
            config,
            gallery,
            accounts,
            media,
        }
    }
}
