//! Configuration for the note pipeline.
//!
//! All behaviour is controlled through [`NotesConfig`], built via its
//! [`NotesConfigBuilder`]. The builder lets callers set only what they care
//! about and rely on the documented defaults for the rest.

use crate::error::NotesError;
use crate::pipeline::html::DEFAULT_STYLESHEET;
use crate::progress::ProgressCallback;
use crate::prompts::{NoteStyle, Sampling};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default markdown-to-PDF web service.
pub const DEFAULT_RENDER_ENDPOINT: &str = "https://md-to-pdf.fly.dev";

/// Default base URL of the provider file store used by [`ImageTransport::Upload`].
pub const DEFAULT_FILE_STORE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for generating and rendering notes.
///
/// # Example
/// ```rust
/// use better_notes::{NotesConfig, RendererKind};
///
/// let config = NotesConfig::builder()
///     .model("gpt-4.1-mini")
///     .renderer(RendererKind::Local)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 3072);
/// ```
#[derive(Clone)]
pub struct NotesConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Temperature override. If None, the style's own default applies.
    pub temperature: Option<f32>,

    /// Nucleus-sampling override. If None, the style's own default applies.
    pub top_p: Option<f32>,

    /// Maximum tokens the model may generate for one note. Default: 3072.
    pub max_tokens: usize,

    /// How the image reaches the provider. Default: inline base64.
    pub image_transport: ImageTransport,

    /// Which markdown-to-PDF strategy to use. Default: remote.
    pub renderer: RendererKind,

    /// Render service URL for [`RendererKind::Remote`].
    pub render_endpoint: String,

    /// Engine requested first. LaTeX-based, needed for formulas. Default: "pdflatex".
    pub primary_engine: String,

    /// Engine requested once after a primary failure. Default: "wkhtmltopdf".
    pub fallback_engine: String,

    /// Stylesheet sent with the fallback request and embedded in local HTML.
    pub stylesheet: String,

    /// Reject fallback responses that are not a PDF. Default: true.
    ///
    /// When false, whatever body the fallback engine returns is handed back
    /// as the PDF, error payloads included.
    pub validate_pdf: bool,

    /// Optional timeout for each render request. Default: none.
    pub render_timeout_secs: Option<u64>,

    /// Base URL of the provider file store.
    pub file_store_url: String,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: None,
            top_p: None,
            max_tokens: 3072,
            image_transport: ImageTransport::default(),
            renderer: RendererKind::default(),
            render_endpoint: DEFAULT_RENDER_ENDPOINT.to_string(),
            primary_engine: "pdflatex".to_string(),
            fallback_engine: "wkhtmltopdf".to_string(),
            stylesheet: DEFAULT_STYLESHEET.to_string(),
            validate_pdf: true,
            render_timeout_secs: None,
            file_store_url: DEFAULT_FILE_STORE_URL.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for NotesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotesConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("image_transport", &self.image_transport)
            .field("renderer", &self.renderer)
            .field("render_endpoint", &self.render_endpoint)
            .field("primary_engine", &self.primary_engine)
            .field("fallback_engine", &self.fallback_engine)
            .field("validate_pdf", &self.validate_pdf)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .finish()
    }
}

impl NotesConfig {
    /// Create a new builder for `NotesConfig`.
    pub fn builder() -> NotesConfigBuilder {
        NotesConfigBuilder {
            config: Self::default(),
        }
    }

    /// Sampling for `style`, with any configured overrides applied.
    pub fn sampling_for(&self, style: NoteStyle) -> Sampling {
        let base = style.sampling();
        Sampling {
            temperature: self.temperature.unwrap_or(base.temperature),
            top_p: self.top_p.unwrap_or(base.top_p),
        }
    }
}

/// Builder for [`NotesConfig`].
pub struct NotesConfigBuilder {
    config: NotesConfig,
}

impl NotesConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = Some(p.clamp(0.0, 1.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn image_transport(mut self, transport: ImageTransport) -> Self {
        self.config.image_transport = transport;
        self
    }

    pub fn renderer(mut self, kind: RendererKind) -> Self {
        self.config.renderer = kind;
        self
    }

    pub fn render_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.render_endpoint = url.into();
        self
    }

    pub fn primary_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.primary_engine = engine.into();
        self
    }

    pub fn fallback_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.fallback_engine = engine.into();
        self
    }

    pub fn stylesheet(mut self, css: impl Into<String>) -> Self {
        self.config.stylesheet = css.into();
        self
    }

    pub fn validate_pdf(mut self, v: bool) -> Self {
        self.config.validate_pdf = v;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = Some(secs);
        self
    }

    pub fn file_store_url(mut self, url: impl Into<String>) -> Self {
        self.config.file_store_url = url.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<NotesConfig, NotesError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(NotesError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.renderer == RendererKind::Remote && !is_http_url(&c.render_endpoint) {
            return Err(NotesError::InvalidConfig(format!(
                "render endpoint must be an HTTP/HTTPS URL, got '{}'",
                c.render_endpoint
            )));
        }
        if c.primary_engine.trim().is_empty() || c.fallback_engine.trim().is_empty() {
            return Err(NotesError::InvalidConfig(
                "render engine names must not be empty".into(),
            ));
        }
        if c.image_transport == ImageTransport::Upload && !is_http_url(&c.file_store_url) {
            return Err(NotesError::InvalidConfig(format!(
                "file store URL must be an HTTP/HTTPS URL, got '{}'",
                c.file_store_url
            )));
        }
        if let Some(ref provider) = c.provider {
            check_upload_provider(c.image_transport, provider.name())?;
        } else if let Some(ref name) = c.provider_name {
            check_upload_provider(c.image_transport, name)?;
        }
        Ok(self.config)
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Uploaded images live in the Gemini file store, and only a Gemini model
/// can fetch them by URI.
pub(crate) fn check_upload_provider(transport: ImageTransport, provider: &str) -> Result<(), NotesError> {
    if transport != ImageTransport::Upload {
        return Ok(());
    }
    match provider.to_lowercase().as_str() {
        "gemini" | "google" | "vertex" | "vertexai" => Ok(()),
        other => Err(NotesError::InvalidConfig(format!(
            "upload transport requires the gemini provider, got '{other}'; use inline transport instead"
        ))),
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the note image is handed to the vision provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageTransport {
    /// Base64 data URL embedded in the request body. (default)
    #[default]
    Inline,
    /// Upload to the provider file store and reference it by handle.
    /// The uploaded file is deleted after the request.
    Upload,
}

/// Markdown-to-PDF strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RendererKind {
    /// Remote render service with a primary and a fallback engine. (default)
    #[default]
    Remote,
    /// In-process HTML + PDF generation. No fallback.
    Local,
}
