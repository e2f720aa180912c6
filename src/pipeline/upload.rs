//! Upload-and-reference transport: hand the photo to the provider's file
//! store and point the vision request at the stored copy.
//!
//! The lifecycle per request is:
//!
//! ```text
//! bytes ──▶ temp file ──▶ upload(path, mime) ──▶ handle ──▶ vision call
//!             │                                     │
//!             └─ removed on drop                    └─ delete(handle), best-effort
//! ```
//!
//! Deleting the stored copy is best-effort: a failure is logged and never
//! turns a finished note into an error.

use crate::error::NotesError;
use crate::output::NoteRequest;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable holding the file-store API key.
pub const FILE_STORE_KEY_VAR: &str = "GEMINI_API_KEY";

/// Handle to a file held by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    /// Provider resource name, e.g. "files/abc123".
    pub name: String,
    /// URI to reference the file from a completion request.
    pub uri: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

/// A provider-side file store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload the file at `path` and return its handle.
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, NotesError>;

    /// Delete a previously uploaded file.
    async fn delete(&self, file: &UploadedFile) -> Result<(), NotesError>;
}

/// Gemini-style files API (`/upload/v1beta/files`, `/v1beta/{name}`).
pub struct GeminiFileStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

impl GeminiFileStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a store using the key in [`FILE_STORE_KEY_VAR`].
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, NotesError> {
        match std::env::var(FILE_STORE_KEY_VAR) {
            Ok(key) if !key.is_empty() => Ok(Self::new(base_url, key)),
            _ => Err(NotesError::MissingCredential {
                var: FILE_STORE_KEY_VAR.to_string(),
            }),
        }
    }
}

#[async_trait]
impl FileStore for GeminiFileStore {
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, NotesError> {
        let fail = |reason: String| NotesError::UploadFailed { reason };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| fail(format!("cannot read {}: {e}", path.display())))?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "note".to_string());

        let metadata = serde_json::json!({ "file": { "display_name": display_name } });
        let metadata_part = Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|e| fail(e.to_string()))?;
        let file_part = Part::bytes(bytes)
            .file_name(display_name)
            .mime_str(mime_type)
            .map_err(|e| fail(e.to_string()))?;
        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let response = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "multipart")
            .multipart(form)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        if !status.is_success() {
            return Err(fail(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let parsed: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| fail(format!("unexpected upload response: {e}")))?;
        info!("Uploaded {} as {}", path.display(), parsed.file.name);
        Ok(parsed.file)
    }

    async fn delete(&self, file: &UploadedFile) -> Result<(), NotesError> {
        let response = self
            .client
            .delete(format!("{}/v1beta/{}", self.base_url, file.name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| NotesError::Internal(format!("delete {}: {e}", file.name)))?;

        if !response.status().is_success() {
            return Err(NotesError::Internal(format!(
                "delete {}: HTTP {}",
                file.name,
                response.status()
            )));
        }
        debug!("Deleted provider file {}", file.name);
        Ok(())
    }
}

/// Copy the request's image to a temp file and upload it.
///
/// The temp file is removed when this function returns, whether the upload
/// succeeded or not.
pub async fn upload_image(
    store: &dyn FileStore,
    request: &NoteRequest,
) -> Result<UploadedFile, NotesError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("note-")
        .suffix(&format!(".{}", request.extension()))
        .tempfile()
        .map_err(|e| NotesError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(&request.image_bytes)
        .map_err(|e| NotesError::Internal(format!("tempfile write: {e}")))?;

    // `tmp` is dropped (and the file deleted) when this returns
    store.upload(tmp.path(), &request.mime_type).await
}

/// Delete an uploaded file, logging instead of failing.
pub async fn delete_quietly(store: &dyn FileStore, file: &UploadedFile) {
    if let Err(e) = store.delete(file).await {
        warn!("Could not delete provider file {}: {}", file.name, e);
    }
}
