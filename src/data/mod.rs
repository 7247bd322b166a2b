//! Dataset sources and test-set sampling.
//!
//! The full test-day dataset and the actual yields are read either from a
//! local directory or from a blob container. Generated subsets are always
//! written locally (served by `/download/{filename}`) and also uploaded when
//! a container is configured.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::AppError;

pub mod blob;
pub mod sample;

pub use blob::BlobClient;
pub use sample::select_lactations;

/// Route prefix for locally served generated files.
pub const DOWNLOAD_ROUTE: &str = "/api/v1/download";

/// Where input datasets come from.
#[derive(Debug, Clone)]
pub enum DataSource {
    Local(PathBuf),
    Blob(BlobClient),
}

/// Links for one published test-set file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub filename: String,
    /// Service-relative link (`/api/v1/download/...`).
    pub local_link: String,
    /// Blob URL when uploaded, otherwise the local link.
    pub stored_url: String,
}

impl DataSource {
    /// Read a named input. `Ok(None)` when it does not exist.
    pub async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>, AppError> {
        match self {
            DataSource::Local(dir) => {
                let path = dir.join(name);
                match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(AppError::storage(format!("Failed to read '{}': {e}", path.display()))),
                }
            }
            DataSource::Blob(client) => client.get(name).await,
        }
    }

    /// Read a named input that must exist.
    pub async fn fetch_required(&self, name: &str) -> Result<Vec<u8>, AppError> {
        self.fetch(name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Dataset '{name}' not found.")))
    }

    /// Save a generated file under `generated_dir`, and upload it to the blob
    /// container when this source is one.
    pub async fn publish(&self, generated_dir: &Path, filename: &str, bytes: Vec<u8>) -> Result<PublishedFile, AppError> {
        let path = generated_dir.join(filename);
        let local = path.clone();
        let data = bytes.clone();
        tokio::task::spawn_blocking(move || crate::io::write_file(&local, &data))
            .await
            .map_err(|e| AppError::storage(format!("File write task failed: {e}")))??;
        info!(path = %path.display(), "Wrote generated test set");

        let local_link = format!("{DOWNLOAD_ROUTE}/{filename}");
        let stored_url = match self {
            DataSource::Local(_) => local_link.clone(),
            DataSource::Blob(client) => match client.put(filename, bytes, "text/csv").await {
                Ok(()) => client.public_url(filename),
                Err(e) => {
                    warn!(error = %e, filename, "Blob upload failed; keeping the local copy only");
                    local_link.clone()
                }
            },
        };

        Ok(PublishedFile {
            filename: filename.to_string(),
            local_link,
            stored_url,
        })
    }
}

/// Resolve a download name inside `dir`, rejecting anything that is not a
/// plain file name.
pub fn resolve_download(dir: &Path, filename: &str) -> Result<PathBuf, AppError> {
    let valid = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\'])
        && !filename.contains("..");
    if !valid {
        return Err(AppError::invalid_input(format!("Invalid file name '{filename}'.")));
    }
    Ok(dir.join(filename))
}
