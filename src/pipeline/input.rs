//! Input resolution: turn a user-supplied image into a [`NoteRequest`].
//!
//! The format is sniffed from the bytes, not the file name. Phone cameras
//! and browsers routinely hand over `.jpg` files that are really PNG (and the
//! reverse), and the MIME type in the data URL must match the payload or the
//! provider rejects the request.

use crate::error::NotesError;
use crate::output::NoteRequest;
use crate::prompts::NoteStyle;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read an image file and build a request for `style`.
pub async fn load_image(path: impl AsRef<Path>, style: NoteStyle) -> Result<NoteRequest, NotesError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => NotesError::ImageNotFound {
            path: path.to_path_buf(),
        },
        _ => NotesError::ImageReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let name = display_name(path);
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    request_from_bytes(bytes, &name, style)
}

/// Build a request from in-memory bytes (camera capture, HTTP upload).
pub fn request_from_bytes(
    bytes: Vec<u8>,
    name: &str,
    style: NoteStyle,
) -> Result<NoteRequest, NotesError> {
    let mime = sniff_mime(&bytes).map_err(|detail| NotesError::UnsupportedImage {
        name: name.to_string(),
        detail,
    })?;
    Ok(NoteRequest::new(bytes, mime, style).with_source_name(name))
}

/// Detect the MIME type of `bytes`, accepting only JPEG and PNG.
pub fn sniff_mime(bytes: &[u8]) -> Result<&'static str, String> {
    if bytes.is_empty() {
        return Err("file is empty".to_string());
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(ImageFormat::Png) => Ok("image/png"),
        Ok(other) => Err(format!("{other:?} images are not supported")),
        Err(_) => Err("not a recognised image format".to_string()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
