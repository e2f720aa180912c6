//! # better-notes
//!
//! Turn a photo of handwritten notes into clean Markdown and a PDF using
//! Vision Language Models (VLMs).
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo (JPEG/PNG)
//!  │
//!  ├─ 1. Input    read bytes, accept only JPEG/PNG
//!  ├─ 2. Prompt   pick the instruction text for the chosen style
//!  ├─ 3. Vision   one chat turn: prompt + image (inline base64 or uploaded)
//!  ├─ 4. Polish   deterministic markdown cleanup
//!  └─ 5. Render   render service (pdflatex, then wkhtmltopdf) or local PDF
//! ```
//!
//! A [`Session`] sits on top and caches the last note so that downloading
//! again re-renders without paying for another model call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use better_notes::{load_image, NoteStyle, NotesConfig, NotesPipeline, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let pipeline = NotesPipeline::from_config(NotesConfig::default())?;
//!
//!     let mut session = Session::with_style(NoteStyle::SolveExercises);
//!     session.select_image(Some(load_image("homework.jpg", NoteStyle::SolveExercises).await?));
//!
//!     let (session, pdf) = pipeline.submit(session).await;
//!     pdf?.write_to("homework.pdf").await?;
//!     println!("{}", session.note().map(|n| n.markdown_text.as_str()).unwrap_or(""));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `better-notes` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! better-notes = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod notes;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ImageTransport, NotesConfig, NotesConfigBuilder, RendererKind};
pub use error::NotesError;
pub use notes::{resolve_provider, NotesPipeline};
pub use output::{Engine, GeneratedNote, NoteRequest, RenderedArtifact};
pub use pipeline::input::{load_image, request_from_bytes};
pub use pipeline::render::{LocalRenderer, PdfRenderer, RemoteRenderer};
pub use pipeline::upload::{FileStore, GeminiFileStore, UploadedFile};
pub use pipeline::vision::{VisionClient, VisionModel, GENERATION_ERROR_PLACEHOLDER};
pub use progress::{NoopProgressCallback, NotesProgressCallback, ProgressCallback};
pub use prompts::{prompt_for, NoteStyle, Sampling};
pub use session::{PhotoState, Session, SessionPhase};
pub use stream::pace_words;
