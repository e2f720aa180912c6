//! Values that flow through the pipeline: the submitted photo, the generated
//! note, and the rendered PDF.

use crate::error::NotesError;
use crate::pipeline::vision::GENERATION_ERROR_PLACEHOLDER;
use crate::prompts::NoteStyle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One photographed or uploaded note, ready to be sent to the model.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRequest {
    /// Raw image bytes (JPEG or PNG).
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    /// MIME type matching `image_bytes`, e.g. "image/jpeg".
    pub mime_type: String,
    /// Requested note style.
    pub style: NoteStyle,
    /// Display name of the source (file name or "camera").
    pub source_name: String,
}

impl NoteRequest {
    pub fn new(image_bytes: Vec<u8>, mime_type: impl Into<String>, style: NoteStyle) -> Self {
        Self {
            image_bytes,
            mime_type: mime_type.into(),
            style,
            source_name: "camera".to_string(),
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// File extension matching the MIME type, used for temp-file copies.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            _ => "jpg",
        }
    }
}

impl fmt::Debug for NoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteRequest")
            .field("image_bytes", &format_args!("<{} bytes>", self.image_bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("style", &self.style)
            .field("source_name", &self.source_name)
            .finish()
    }
}

/// Markdown produced by one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedNote {
    pub markdown_text: String,
    pub source_request: NoteRequest,
}

impl GeneratedNote {
    /// True when the provider failed and the text is the error placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.markdown_text == GENERATION_ERROR_PLACEHOLDER
    }

    /// True when there is something worth rendering.
    pub fn has_content(&self) -> bool {
        !self.markdown_text.trim().is_empty()
    }
}

/// Which renderer produced a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    /// Remote LaTeX engine (first choice).
    Primary,
    /// Remote HTML engine, tried once after a primary failure.
    Fallback,
    /// In-process renderer.
    Local,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Primary => "primary",
            Engine::Fallback => "fallback",
            Engine::Local => "local",
        })
    }
}

/// PDF bytes derived from a note's markdown.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    #[serde(skip)]
    pub pdf_bytes: Vec<u8>,
    pub engine_used: Engine,
}

impl RenderedArtifact {
    /// True when the bytes start with the PDF header.
    pub fn looks_like_pdf(&self) -> bool {
        is_pdf(&self.pdf_bytes)
    }

    /// Write the PDF to `path`.
    ///
    /// Uses atomic write (temp file + rename) so a failed write never leaves
    /// a truncated PDF behind.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), NotesError> {
        let path = path.as_ref();
        let fail = |source| NotesError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(fail)?;
            }
        }

        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &self.pdf_bytes)
            .await
            .map_err(fail)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
        Ok(())
    }
}

impl fmt::Debug for RenderedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedArtifact")
            .field("pdf_bytes", &format_args!("<{} bytes>", self.pdf_bytes.len()))
            .field("engine_used", &self.engine_used)
            .finish()
    }
}

/// Check the `%PDF-` magic header.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}
