//! Note pipeline orchestration.
//!
//! [`NotesPipeline`] wires the stages together:
//!
//! ```text
//! style ──▶ prompt ──┐
//!                    ├──▶ vision ──▶ markdown ──▶ renderer ──▶ PDF
//! photo ──▶ image ───┘
//! ```
//!
//! and exposes them through two session handlers, [`NotesPipeline::submit`]
//! and [`NotesPipeline::download`]. Both take the [`Session`] by value and
//! return it next to their result, so the caller always gets the updated
//! state back even when the call failed.

use crate::config::{check_upload_provider, ImageTransport, NotesConfig};
use crate::error::NotesError;
use crate::output::{GeneratedNote, NoteRequest, RenderedArtifact};
use crate::pipeline::render::{renderer_from_config, PdfRenderer};
use crate::pipeline::upload::{FileStore, GeminiFileStore};
use crate::pipeline::vision::{LlmVisionModel, VisionClient, VisionModel};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::prompt_for;
use crate::session::Session;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Environment pair naming a provider and model for the whole process.
pub const PROVIDER_ENV_VAR: &str = "NOTES_LLM_PROVIDER";
pub const MODEL_ENV_VAR: &str = "NOTES_MODEL";

/// The photo → markdown → PDF pipeline.
pub struct NotesPipeline {
    config: NotesConfig,
    vision: VisionClient,
    renderer: Arc<dyn PdfRenderer>,
    progress: ProgressCallback,
}

impl NotesPipeline {
    /// Build the pipeline from `config`: resolve the LLM provider, open the
    /// file store when the upload transport is selected, and pick the
    /// renderer.
    ///
    /// All configuration errors surface here, before any photo is sent.
    pub fn from_config(config: NotesConfig) -> Result<Self, NotesError> {
        let provider = resolve_provider(&config)?;
        info!(
            "LLM provider resolved (requested: {}, model: {})",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("provider default")
        );
        check_upload_provider(config.image_transport, provider.name())?;
        let model: Arc<dyn VisionModel> = Arc::new(LlmVisionModel::new(provider));

        let store: Option<Arc<dyn FileStore>> = match config.image_transport {
            ImageTransport::Inline => None,
            ImageTransport::Upload => Some(Arc::new(GeminiFileStore::from_env(
                config.file_store_url.clone(),
            )?)),
        };
        let renderer = renderer_from_config(&config)?;

        Ok(Self::with_components(config, model, store, renderer))
    }

    /// Assemble a pipeline from already-built parts.
    pub fn with_components(
        config: NotesConfig,
        model: Arc<dyn VisionModel>,
        file_store: Option<Arc<dyn FileStore>>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        let mut vision = VisionClient::new(model).max_tokens(config.max_tokens);
        if let Some(store) = file_store {
            vision = vision.with_file_store(store);
        }
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            config,
            vision,
            renderer,
            progress,
        }
    }

    pub fn config(&self) -> &NotesConfig {
        &self.config
    }

    /// Run the vision step for `request` with its style's prompt.
    ///
    /// Never fails; a provider failure yields the placeholder note.
    pub async fn generate(&self, request: NoteRequest) -> GeneratedNote {
        let style = request.style;
        self.progress.on_generation_start(style);

        let markdown_text = self
            .vision
            .generate_note(&request, prompt_for(style), self.config.sampling_for(style))
            .await;
        let note = GeneratedNote {
            markdown_text,
            source_request: request,
        };
        self.progress
            .on_generation_complete(note.markdown_text.len(), note.is_placeholder());
        note
    }

    /// Generate a note from the session's armed photo and render it.
    ///
    /// Fails with [`NotesError::MissingImage`] before any network call when
    /// no photo is armed. Calls the model once and the renderer at most once.
    pub async fn submit(&self, mut session: Session) -> (Session, Result<RenderedArtifact, NotesError>) {
        let request = match session.take_submission() {
            Ok(r) => r,
            Err(e) => return (session, Err(e)),
        };
        info!("Submitting {} as {}", request.source_name, request.style);

        let note = self.generate(request).await;
        if !note.has_content() {
            warn!("Model returned an empty note; nothing to render");
            session.record_note(note);
            return (session, Err(NotesError::NothingGenerated));
        }
        let markdown = note.markdown_text.clone();
        session.record_note(note);

        let result = self.renderer.render(&markdown).await;
        session.record_render(&result);
        (session, result)
    }

    /// Render the cached note again without calling the model.
    pub async fn download(&self, mut session: Session) -> (Session, Result<RenderedArtifact, NotesError>) {
        let markdown = match session.note() {
            Some(note) if note.has_content() => note.markdown_text.clone(),
            _ => return (session, Err(NotesError::NothingGenerated)),
        };

        let result = self.renderer.render(&markdown).await;
        session.record_render(&result);
        (session, result)
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, NotesError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        NotesError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, most specific source first:
///
/// 1. a pre-built provider in the config;
/// 2. `provider_name` (+ `model`, default [`DEFAULT_MODEL`]);
/// 3. [`PROVIDER_ENV_VAR`] + [`MODEL_ENV_VAR`], when both are non-empty;
/// 4. a provider whose API key is set, so that `model` is honoured (OpenAI
///    first, then Anthropic or Gemini when a model was requested);
/// 5. `ProviderFactory::from_env()` auto-detection from API key variables.
pub fn resolve_provider(config: &NotesConfig) -> Result<Arc<dyn LLMProvider>, NotesError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (std::env::var(PROVIDER_ENV_VAR), std::env::var(MODEL_ENV_VAR)) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let has_key = |var: &str| std::env::var(var).is_ok_and(|v| !v.is_empty());
    if let Some((name, model)) = keyed_provider(config.model.as_deref(), has_key) {
        return create_vision_provider(name, &model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| NotesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision-capable LLM provider could be detected from the environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Pick a provider by API key when auto-detection would lose the model.
///
/// An OpenAI key always wins and falls back to [`DEFAULT_MODEL`]. The other
/// vendors are only chosen here when a model was requested; otherwise
/// `ProviderFactory::from_env()` picks their default.
fn keyed_provider(model: Option<&str>, has_key: impl Fn(&str) -> bool) -> Option<(&'static str, String)> {
    if has_key("OPENAI_API_KEY") {
        return Some(("openai", model.unwrap_or(DEFAULT_MODEL).to_string()));
    }
    let model = model?;
    [("anthropic", "ANTHROPIC_API_KEY"), ("gemini", "GEMINI_API_KEY")]
        .into_iter()
        .find(|&(_, var)| has_key(var))
        .map(|(name, _)| (name, model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Engine;
    use crate::pipeline::encode::ImageRef;
    use crate::pipeline::vision::{VisionOptions, GENERATION_ERROR_PLACEHOLDER};
    use crate::prompts::{NoteStyle, SOLVE_EXERCISES_PROMPT};
    use crate::session::SessionPhase;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeModel {
        reply: Result<String, String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("quota exceeded".into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VisionModel for FakeModel {
        async fn complete(&self, prompt: &str, _: &ImageRef, _: &VisionOptions) -> Result<String, NotesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|message| NotesError::LlmApiError { message })
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PdfRenderer for FakeRenderer {
        async fn render(&self, markdown: &str) -> Result<RenderedArtifact, NotesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(markdown.to_string());
            Ok(RenderedArtifact {
                pdf_bytes: b"%PDF-1.4".to_vec(),
                engine_used: Engine::Primary,
            })
        }
    }

    fn pipeline(model: Arc<FakeModel>, renderer: Arc<FakeRenderer>) -> NotesPipeline {
        let config = NotesConfig::builder().build().unwrap();
        NotesPipeline::with_components(config, model, None, renderer)
    }

    fn armed(style: NoteStyle) -> Session {
        let mut s = Session::with_style(style);
        s.select_image(Some(NoteRequest::new(
            vec![0xFF, 0xD8, 0xFF, 0xE0],
            "image/jpeg",
            style,
        )));
        s
    }

    #[test]
    fn openai_key_keeps_requested_model() {
        let keys = |var: &str| var == "OPENAI_API_KEY" || var == "ANTHROPIC_API_KEY";
        assert_eq!(
            keyed_provider(Some("gpt-4o"), keys),
            Some(("openai", "gpt-4o".to_string()))
        );
        assert_eq!(
            keyed_provider(None, keys),
            Some(("openai", DEFAULT_MODEL.to_string()))
        );
    }

    #[test]
    fn model_without_openai_key_goes_to_keyed_vendor() {
        let gemini_only = |var: &str| var == "GEMINI_API_KEY";
        assert_eq!(
            keyed_provider(Some("gemini-2.0-flash"), gemini_only),
            Some(("gemini", "gemini-2.0-flash".to_string()))
        );
        assert_eq!(keyed_provider(None, gemini_only), None);
        assert_eq!(keyed_provider(Some("gpt-4o"), |_: &str| false), None);
    }

    #[tokio::test]
    async fn submit_without_photo_makes_no_calls() {
        let model = FakeModel::replying("x\n");
        let renderer = Arc::new(FakeRenderer::default());
        let p = pipeline(model.clone(), renderer.clone());

        let (_, result) = p.submit(Session::new()).await;
        assert!(matches!(result, Err(NotesError::MissingImage)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn solve_exercises_renders_model_markdown_once() {
        let md = "## Part A\n\n$2x = 4$ so **x = 2**";
        let model = FakeModel::replying(md);
        let renderer = Arc::new(FakeRenderer::default());
        let p = pipeline(model.clone(), renderer.clone());

        let (session, result) = p.submit(armed(NoteStyle::SolveExercises)).await;
        assert!(result.is_ok());
        assert_eq!(session.phase(), SessionPhase::Rendered);
        assert_eq!(model.prompts.lock().unwrap().as_slice(), [SOLVE_EXERCISES_PROMPT]);
        assert_eq!(renderer.seen.lock().unwrap().as_slice(), [md]);
        assert!(session.downloadable().is_some());
    }

    #[tokio::test]
    async fn download_again_reuses_cached_markdown() {
        let model = FakeModel::replying("# Notes\n");
        let renderer = Arc::new(FakeRenderer::default());
        let p = pipeline(model.clone(), renderer.clone());

        let (session, _) = p.submit(armed(NoteStyle::Rewrite)).await;
        let (session, result) = p.download(session).await;
        let (_, again) = p.download(session).await;

        assert!(result.is_ok() && again.is_ok());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn download_before_generation_is_refused() {
        let renderer = Arc::new(FakeRenderer::default());
        let p = pipeline(FakeModel::replying("x\n"), renderer.clone());
        let (_, result) = p.download(armed(NoteStyle::Parody)).await;
        assert!(matches!(result, Err(NotesError::NothingGenerated)));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resubmitting_same_photo_is_refused() {
        let model = FakeModel::replying("# Notes\n");
        let p = pipeline(model.clone(), Arc::new(FakeRenderer::default()));

        let (session, _) = p.submit(armed(NoteStyle::Rewrite)).await;
        let (mut session, second) = p.submit(session).await;
        assert!(matches!(second, Err(NotesError::MissingImage)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        session.change_style(NoteStyle::DefineTerms);
        let (_, third) = p.submit(session).await;
        assert!(third.is_ok());
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_failure_still_renders_placeholder() {
        let renderer = Arc::new(FakeRenderer::default());
        let p = pipeline(FakeModel::failing(), renderer.clone());

        let (session, result) = p.submit(armed(NoteStyle::Rewrite)).await;
        assert!(result.is_ok());
        assert!(session.note().unwrap().is_placeholder());
        assert_eq!(renderer.seen.lock().unwrap()[0], GENERATION_ERROR_PLACEHOLDER);
    }

    #[tokio::test]
    async fn empty_model_output_is_not_rendered() {
        let renderer = Arc::new(FakeRenderer::default());
        let p = pipeline(FakeModel::replying("   \n"), renderer.clone());

        let (session, result) = p.submit(armed(NoteStyle::Rewrite)).await;
        assert!(matches!(result, Err(NotesError::NothingGenerated)));
        assert_eq!(session.phase(), SessionPhase::Generated);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }
}
