//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn NotesProgressCallback>`] via
//! [`crate::config::NotesConfigBuilder::progress_callback`] to be told when
//! the vision call starts and ends and which render engine is being tried.
//! Both outbound calls can block for many seconds, so a UI shell needs these
//! hooks to show that something is happening.
//!
//! # Example
//!
//! ```rust
//! use better_notes::{NotesConfig, NotesProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     attempts: AtomicUsize,
//! }
//!
//! impl NotesProgressCallback for CountingCallback {
//!     fn on_render_attempt(&self, engine: &str) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("rendering with {engine}");
//!     }
//! }
//!
//! let config = NotesConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { attempts: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::prompts::NoteStyle;
use std::sync::Arc;

/// Called by the pipeline as a submission moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait NotesProgressCallback: Send + Sync {
    /// Called just before the vision request is sent.
    fn on_generation_start(&self, style: NoteStyle) {
        let _ = style;
    }

    /// Called when the vision step has produced text.
    ///
    /// # Arguments
    /// * `markdown_len` — byte length of the markdown
    /// * `failed`       — true when the provider failed and the placeholder was used
    fn on_generation_complete(&self, markdown_len: usize, failed: bool) {
        let _ = (markdown_len, failed);
    }

    /// Called before each render request, once per engine tried.
    fn on_render_attempt(&self, engine: &str) {
        let _ = engine;
    }

    /// Called when a PDF has been produced.
    fn on_render_complete(&self, engine: &str, pdf_len: usize) {
        let _ = (engine, pdf_len);
    }

    /// Called when rendering failed for good.
    fn on_render_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl NotesProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::NotesConfig`].
pub type ProgressCallback = Arc<dyn NotesProgressCallback>;
