//! Pipeline stages for photo-to-note conversion.
//!
//! Each submodule implements one transformation step, so every stage can be
//! tested alone and the image transport or PDF backend can be swapped without
//! touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode / upload ──▶ vision ──▶ postprocess ──▶ render
//! (bytes)   (inline | handle)   (VLM)      (cleanup)       (remote | html+typeset)
//! ```
//!
//! 1. [`input`]  — read the photo and accept only JPEG/PNG
//! 2. [`encode`] / [`upload`] — hand the image to the provider, inline as
//!    base64 or as a file-store handle that is deleted afterwards
//! 3. [`vision`] — one chat turn with the style prompt; failures become a
//!    placeholder text
//! 4. [`postprocess`] — unwrap a ```` ```markdown ```` fence and normalise CRLF;
//!    the rest of the model's markdown is kept verbatim
//! 5. [`render`] — markdown to PDF, through the render service or locally via
//!    [`html`] and [`typeset`]

pub mod encode;
pub mod html;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod typeset;
pub mod upload;
pub mod vision;
