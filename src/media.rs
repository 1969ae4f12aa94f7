// Uploaded image files on disk
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("'{0}' is not an image")]
    NotAnImage(String),

    #[error("uploaded file is empty")]
    Empty,

    #[error("'{0}' is missing from the uploads directory")]
    Missing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image files under the uploads directory, addressed by generated name.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write an upload under a fresh `{uuid}.{ext}` name and return that name.
    /// The original filename only contributes its extension.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        let ext = image_extension(original_name)
            .ok_or_else(|| MediaError::NotAnImage(original_name.to_string()))?;

        let name = format!("{}.{}", uuid::Uuid::now_v7(), ext);
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&name), bytes).await?;
        tracing::debug!(file = %name, size = bytes.len(), "Stored upload");
        Ok(name)
    }

    /// Read a stored file, with its content type.
    pub async fn read(&self, name: &str) -> Result<(Vec<u8>, String), MediaError> {
        let path = self.locate(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::Missing(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        Ok((bytes, mime.as_ref().to_string()))
    }

    /// Best effort; a file that is already gone is not an error.
    pub async fn remove(&self, name: &str) {
        let path = match self.locate(name) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(file = %name, "Refusing to remove upload: {}", e);
                return;
            }
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(file = %name, "Failed to remove upload: {}", e),
        }
    }

    fn locate(&self, name: &str) -> Result<PathBuf, MediaError> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && !name.starts_with('.');
        if !plain {
            return Err(MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid upload name '{name}'"),
            )));
        }
        Ok(self.root.join(name))
    }
}

/// Lowercased extension of `filename` if it names an image type.
pub fn image_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    let is_image = mime_guess::from_ext(&ext)
        .first()
        .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE);
    is_image.then_some(ext)
}
