//! Image encoding: note bytes → the image part of a vision request.
//!
//! Two transports exist. Inline embeds the photo as a base64 data URL in the
//! JSON body; it needs no extra round trips but inflates the payload by a
//! third. Upload sends the file to the provider's store first and references
//! it by URI (see [`crate::pipeline::upload`]).

use crate::output::NoteRequest;
use crate::pipeline::upload::UploadedFile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// The image part of a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Base64 payload sent inside the request body.
    Inline { base64: String, mime_type: String },
    /// A file already held by the provider.
    Uploaded(UploadedFile),
}

impl ImageRef {
    /// Convert to the provider crate's image type.
    ///
    /// `detail: "high"` keeps small handwriting legible to GPT-4-class
    /// models, which otherwise downsample to a single 512 px tile.
    pub fn to_image_data(&self) -> ImageData {
        match self {
            ImageRef::Inline { base64, mime_type } => {
                ImageData::new(base64.clone(), mime_type.clone()).with_detail("high")
            }
            ImageRef::Uploaded(file) => ImageData::from_url(file.uri.clone()),
        }
    }
}

/// Encode the request's image as an inline base64 reference.
pub fn encode_inline(request: &NoteRequest) -> ImageRef {
    let b64 = STANDARD.encode(&request.image_bytes);
    debug!(
        "Encoded {} → {} bytes base64",
        request.source_name,
        b64.len()
    );
    ImageRef::Inline {
        base64: b64,
        mime_type: request.mime_type.clone(),
    }
}
