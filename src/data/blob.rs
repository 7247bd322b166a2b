//! Minimal blob container client (REST over `reqwest`).
//!
//! Only the two calls the service needs: download a named blob and upload a
//! block blob. Credentials are a SAS query string appended to each request.

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct BlobClient {
    client: Client,
    container_url: String,
    sas_token: Option<String>,
}

impl BlobClient {
    pub fn new(container_url: impl Into<String>, sas_token: Option<String>) -> Self {
        let container_url = container_url.into().trim_end_matches('/').to_string();
        let sas_token = sas_token
            .map(|t| t.trim_start_matches('?').to_string())
            .filter(|t| !t.is_empty());
        Self {
            client: Client::new(),
            container_url,
            sas_token,
        }
    }

    /// URL of a blob without credentials.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.container_url, name)
    }

    fn signed_url(&self, name: &str) -> String {
        match &self.sas_token {
            Some(sas) => format!("{}?{sas}", self.public_url(name)),
            None => self.public_url(name),
        }
    }

    /// Download a blob. `Ok(None)` when the container has no such blob.
    pub async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, AppError> {
        debug!(blob = name, "Blob download");
        let resp = self
            .client
            .get(self.signed_url(name))
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("Blob request for '{name}' failed: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AppError::upstream(format!(
                "Blob request for '{name}' failed with status {}.",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AppError::upstream(format!("Failed to read blob '{name}': {e}")))?;
        Ok(Some(bytes.to_vec()))
    }

    /// Upload (overwrite) a block blob.
    pub async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        debug!(blob = name, len = bytes.len(), "Blob upload");
        let resp = self
            .client
            .put(self.signed_url(name))
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("Blob upload of '{name}' failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::upstream(format!(
                "Blob upload of '{name}' failed with status {}.",
                resp.status()
            )));
        }
        Ok(())
    }
}
