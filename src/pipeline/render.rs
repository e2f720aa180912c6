//! Markdown → PDF rendering.
//!
//! Two strategies sit behind [`PdfRenderer`]:
//!
//! * [`RemoteRenderer`] posts the markdown to a render web service, asking for
//!   the LaTeX engine first (formulas come out right) and falling back once to
//!   the HTML engine, with a stylesheet, when the first attempt is refused.
//! * [`LocalRenderer`] never leaves the process: markdown is typeset straight
//!   to PDF on the blocking thread pool. The styled HTML document is a
//!   separate export, [`LocalRenderer::html`], and plays no part in the PDF.
//!
//! ## Fallback response handling
//!
//! The primary attempt is judged on HTTP status alone. The fallback response
//! is the last chance, so by default its status and `%PDF-` magic are both
//! checked; with `validate_pdf` disabled the body is returned as-is.

use crate::config::{NotesConfig, RendererKind};
use crate::error::NotesError;
use crate::output::{is_pdf, Engine, RenderedArtifact};
use crate::pipeline::{html, typeset};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns markdown into a PDF.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, markdown: &str) -> Result<RenderedArtifact, NotesError>;
}

/// Longest slice of an error body quoted in a [`NotesError::RenderFailed`].
const BODY_EXCERPT_CHARS: usize = 200;

/// Render through the markdown-to-PDF web service.
pub struct RemoteRenderer {
    client: reqwest::Client,
    endpoint: String,
    primary_engine: String,
    fallback_engine: String,
    stylesheet: String,
    validate_pdf: bool,
    progress: ProgressCallback,
}

impl RemoteRenderer {
    /// Build a renderer for `endpoint` using the engine names, stylesheet and
    /// validation policy from `config`.
    pub fn new(endpoint: impl Into<String>, config: &NotesConfig) -> Result<Self, NotesError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.render_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| NotesError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            primary_engine: config.primary_engine.clone(),
            fallback_engine: config.fallback_engine.clone(),
            stylesheet: config.stylesheet.clone(),
            validate_pdf: config.validate_pdf,
            progress: progress_or_noop(config),
        })
    }

    async fn post(&self, form: &[(&str, &str)], engine: &str) -> Result<reqwest::Response, NotesError> {
        self.progress.on_render_attempt(engine);
        self.client
            .post(&self.endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| NotesError::RenderFailed {
                engine: engine.to_string(),
                detail: format!("request to {} failed: {}", self.endpoint, e),
            })
    }

    async fn body(response: reqwest::Response, engine: &str) -> Result<Vec<u8>, NotesError> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| NotesError::RenderFailed {
                engine: engine.to_string(),
                detail: format!("failed to read response body: {}", e),
            })
    }

    fn finish(&self, pdf_bytes: Vec<u8>, engine_used: Engine, engine: &str) -> RenderedArtifact {
        info!("Rendered {} bytes of PDF with {}", pdf_bytes.len(), engine);
        self.progress.on_render_complete(engine, pdf_bytes.len());
        RenderedArtifact {
            pdf_bytes,
            engine_used,
        }
    }

    async fn render_inner(&self, markdown: &str) -> Result<RenderedArtifact, NotesError> {
        let primary = self.primary_engine.as_str();
        debug!("Rendering {} bytes of markdown with {}", markdown.len(), primary);

        let response = self
            .post(&[("markdown", markdown), ("engine", primary)], primary)
            .await?;
        let status = response.status();
        if status.is_success() {
            let bytes = Self::body(response, primary).await?;
            return Ok(self.finish(bytes, Engine::Primary, primary));
        }
        warn!("{} render returned {}, retrying with {}", primary, status, self.fallback_engine);

        let fallback = self.fallback_engine.as_str();
        let response = self
            .post(
                &[
                    ("markdown", markdown),
                    ("engine", fallback),
                    ("css", self.stylesheet.as_str()),
                ],
                fallback,
            )
            .await?;
        let status = response.status();
        let bytes = Self::body(response, fallback).await?;

        if self.validate_pdf {
            if !status.is_success() {
                return Err(NotesError::RenderFailed {
                    engine: fallback.to_string(),
                    detail: format!("HTTP {}: {}", status.as_u16(), excerpt(&bytes)),
                });
            }
            if !is_pdf(&bytes) {
                return Err(NotesError::RenderFailed {
                    engine: fallback.to_string(),
                    detail: format!("response is not a PDF: {}", excerpt(&bytes)),
                });
            }
        }
        Ok(self.finish(bytes, Engine::Fallback, fallback))
    }
}

#[async_trait]
impl PdfRenderer for RemoteRenderer {
    async fn render(&self, markdown: &str) -> Result<RenderedArtifact, NotesError> {
        let result = self.render_inner(markdown).await;
        if let Err(e) = &result {
            self.progress.on_render_error(&e.to_string());
        }
        result
    }
}

/// Render in-process with the built-in typesetter.
pub struct LocalRenderer {
    stylesheet: String,
    progress: ProgressCallback,
}

impl LocalRenderer {
    pub fn new(config: &NotesConfig) -> Self {
        Self {
            stylesheet: config.stylesheet.clone(),
            progress: progress_or_noop(config),
        }
    }

    /// Standalone HTML export of `markdown` with the configured stylesheet
    /// and MathJax. Not used when rendering the PDF.
    pub fn html(&self, markdown: &str) -> String {
        html::markdown_to_html(markdown, &self.stylesheet)
    }
}

#[async_trait]
impl PdfRenderer for LocalRenderer {
    async fn render(&self, markdown: &str) -> Result<RenderedArtifact, NotesError> {
        self.progress.on_render_attempt("local");
        debug!("Typesetting {} bytes of markdown locally", markdown.len());

        let md = markdown.to_string();
        let result = tokio::task::spawn_blocking(move || typeset::typeset(&md))
            .await
            .map_err(|e| NotesError::Internal(format!("Typeset task panicked: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(pdf_bytes) => {
                info!("Typeset {} bytes of PDF locally", pdf_bytes.len());
                self.progress.on_render_complete("local", pdf_bytes.len());
                Ok(RenderedArtifact {
                    pdf_bytes,
                    engine_used: Engine::Local,
                })
            }
            Err(e) => {
                self.progress.on_render_error(&e.to_string());
                Err(e)
            }
        }
    }
}

/// Build the renderer selected by `config.renderer`.
pub fn renderer_from_config(config: &NotesConfig) -> Result<Arc<dyn PdfRenderer>, NotesError> {
    Ok(match config.renderer {
        RendererKind::Remote => Arc::new(RemoteRenderer::new(config.render_endpoint.clone(), config)?),
        RendererKind::Local => Arc::new(LocalRenderer::new(config)),
    })
}

fn progress_or_noop(config: &NotesConfig) -> ProgressCallback {
    config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.chars().count() > BODY_EXCERPT_CHARS {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}…", cut)
    } else {
        trimmed.to_string()
    }
}
