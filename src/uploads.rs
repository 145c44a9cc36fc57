//! Poster image storage on the local filesystem.
//!
//! Files land flat in one directory under generated names:
//! ```text
//! {root}/
//!   movie_{32 hex digits}{.ext}
//! ```
//! Callers get back a reference such as `/uploads/movie_…png`, which is what the
//! movie row stores and what the HTTP layer serves.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// URL prefix under which stored posters are served.
pub const UPLOADS_ROUTE: &str = "/uploads";

const FILE_PREFIX: &str = "movie_";
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("uploaded file is empty")]
    Empty,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An uploaded file as received from the client.
#[derive(Clone, Debug, Default)]
pub struct PosterUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PosterUpload {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct PosterStore {
    root: PathBuf,
}

impl PosterStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the upload under a fresh name and return its reference path.
    ///
    /// Content is stored as-is; neither the media type nor the size is checked here.
    pub async fn store(&self, upload: &PosterUpload) -> Result<String, UploadError> {
        if upload.is_empty() {
            return Err(UploadError::Empty);
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| UploadError::Io { path: self.root.clone(), source })?;

        let file_name =
            format!("{FILE_PREFIX}{}{}", Uuid::new_v4().simple(), extension_of(&upload.file_name));
        let path = self.root.join(&file_name);

        fs::write(&path, &upload.bytes)
            .await
            .map_err(|source| UploadError::Io { path: path.clone(), source })?;

        debug!(
            original = %upload.file_name,
            stored = %file_name,
            bytes = upload.bytes.len(),
            "stored poster"
        );

        Ok(format!("{UPLOADS_ROUTE}/{file_name}"))
    }

    /// Map a reference returned by [`PosterStore::store`] back to its file.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.strip_prefix(UPLOADS_ROUTE)?.strip_prefix('/')?;
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        Some(self.root.join(name))
    }
}

/// Extension of the client's file name including the dot, or empty.
fn extension_of(file_name: &str) -> String {
    // Browsers may send Windows paths.
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    match Path::new(base).extension().and_then(|e| e.to_str()) {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        },
        _ => String::new(),
    }
}
