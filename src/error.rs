//! Error types for the better-notes library.
//!
//! A single enum covers every failure the library reports, grouped by the
//! stage that produces it:
//!
//! * **Input** errors (no image, unreadable file, unsupported format) halt a
//!   submission before any network call is made.
//! * **Configuration** errors (no provider, no credential) are raised when the
//!   pipeline is built, so a misconfigured process fails before the user has
//!   photographed anything.
//! * **Render** errors come out of the markdown-to-PDF stage once the single
//!   fallback attempt has been spent.
//!
//! Vision-provider failures ([`NotesError::LlmApiError`]) never reach the
//! caller of a submission: they are logged and replaced by
//! [`crate::pipeline::vision::GENERATION_ERROR_PLACEHOLDER`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the better-notes library.
#[derive(Debug, Error)]
pub enum NotesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Image file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// The image file exists but could not be read.
    #[error("Failed to read image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a JPEG or PNG image.
    #[error("Unsupported image '{name}': {detail}\nUpload a .jpg, .jpeg or .png picture.")]
    UnsupportedImage { name: String, detail: String },

    /// A submission was attempted without a freshly selected image.
    #[error("No picture submitted. Upload a picture of your notes or take one first.")]
    MissingImage,

    /// A download was requested before any note was generated.
    #[error("Nothing to download yet. Submit a picture of your notes first.")]
    NothingGenerated,

    // ── Configuration errors ──────────────────────────────────────────────
    /// The configured LLM provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A required secret is absent from the environment.
    #[error("Missing credential: set {var} or pass an API key explicitly.")]
    MissingCredential { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The vision provider returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Provider file-store errors ────────────────────────────────────────
    /// Uploading the image to the provider file store failed.
    #[error("Failed to upload image to the provider file store: {reason}")]
    UploadFailed { reason: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The renderer could not produce a PDF.
    #[error("PDF rendering failed ({engine}): {detail}")]
    RenderFailed { engine: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NotesError {
    /// True for errors caused by missing or bad user input rather than by a
    /// service or the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            NotesError::ImageNotFound { .. }
                | NotesError::ImageReadFailed { .. }
                | NotesError::UnsupportedImage { .. }
                | NotesError::MissingImage
                | NotesError::NothingGenerated
        )
    }
}
