//! Integration tests for the note pipeline.
//!
//! The vision model is faked through the `VisionModel` trait; the render
//! service and the provider file store are stood up with wiremock. Nothing
//! here needs an API key or network access.

use async_trait::async_trait;
use better_notes::pipeline::encode::ImageRef;
use better_notes::pipeline::render::renderer_from_config;
use better_notes::pipeline::vision::VisionOptions;
use better_notes::{
    load_image, Engine, FileStore, GeminiFileStore, NoteStyle, NotesConfig, NotesError,
    NotesPipeline, NotesProgressCallback, PhotoState, RendererKind, Session, SessionPhase,
    VisionModel, GENERATION_ERROR_PLACEHOLDER,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

struct FakeModel {
    reply: Option<String>,
    calls: AtomicUsize,
    options: Mutex<Vec<VisionOptions>>,
}

impl FakeModel {
    fn new(reply: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
            options: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl VisionModel for FakeModel {
    async fn complete(
        &self,
        _prompt: &str,
        _image: &ImageRef,
        options: &VisionOptions,
    ) -> Result<String, NotesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(*options);
        self.reply.clone().ok_or_else(|| NotesError::LlmApiError {
            message: "connection reset".into(),
        })
    }
}

#[derive(Default)]
struct EngineLog {
    engines: Mutex<Vec<String>>,
}

impl NotesProgressCallback for EngineLog {
    fn on_render_attempt(&self, engine: &str) {
        self.engines.lock().unwrap().push(engine.to_string());
    }
}

/// Matches a form-encoded body whose decoded fields are exactly `fields`.
struct FormFields(Vec<(&'static str, String)>);

impl Match for FormFields {
    fn matches(&self, request: &Request) -> bool {
        let query = String::from_utf8_lossy(&request.body);
        let Ok(url) = reqwest::Url::parse(&format!("http://form.test/?{query}")) else {
            return false;
        };
        let got: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let want: Vec<(String, String)> = self
            .0
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        got == want
    }
}

fn write_jpeg(dir: &Path) -> PathBuf {
    let path = dir.join("notes.jpg");
    image::RgbImage::from_pixel(8, 8, image::Rgb([245, 240, 230]))
        .save(&path)
        .unwrap();
    path
}

fn write_png(dir: &Path) -> PathBuf {
    let path = dir.join("notes.png");
    image::RgbImage::from_pixel(8, 8, image::Rgb([250, 250, 250]))
        .save(&path)
        .unwrap();
    path
}

async fn session_with_photo(dir: &Path, style: NoteStyle) -> Session {
    let request = load_image(write_png(dir), style).await.unwrap();
    let mut session = Session::with_style(style);
    session.select_image(Some(request));
    session
}

// ── Remote rendering ─────────────────────────────────────────────────────────

#[tokio::test]
async fn solve_exercises_goes_to_pdflatex_first() {
    let reply = "## Part A\n...";
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(FormFields(vec![
            ("markdown", reply.to_string()),
            ("engine", "pdflatex".to_string()),
        ]))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.5 latex".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let log = Arc::new(EngineLog::default());
    let config = NotesConfig::builder()
        .render_endpoint(server.uri())
        .progress_callback(log.clone())
        .build()
        .unwrap();
    let model = FakeModel::new(Some(reply));
    let renderer = renderer_from_config(&config).unwrap();
    let pipeline = NotesPipeline::with_components(config, model.clone(), None, renderer);

    let dir = tempfile::tempdir().unwrap();
    let request = load_image(write_jpeg(dir.path()), NoteStyle::SolveExercises)
        .await
        .unwrap();
    assert_eq!(request.mime_type, "image/jpeg");
    let mut session = Session::with_style(NoteStyle::SolveExercises);
    session.select_image(Some(request));
    let (session, result) = pipeline.submit(session).await;

    let artifact = result.unwrap();
    assert_eq!(artifact.engine_used, Engine::Primary);
    assert_eq!(artifact.pdf_bytes, b"%PDF-1.5 latex");
    assert_eq!(*log.engines.lock().unwrap(), vec!["pdflatex".to_string()]);
    assert_eq!(session.photo(), PhotoState::NotDone);
    assert_eq!(session.note().unwrap().markdown_text, reply);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        model.options.lock().unwrap()[0].sampling,
        NoteStyle::SolveExercises.sampling()
    );
}

#[tokio::test]
async fn download_again_falls_back_without_calling_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("engine=pdflatex"))
        .respond_with(ResponseTemplate::new(500).set_body_string("! Undefined control sequence"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("engine=wkhtmltopdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 html".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let config = NotesConfig::builder()
        .render_endpoint(server.uri())
        .build()
        .unwrap();
    let model = FakeModel::new(Some("# Photosynthesis\n\nLight in, sugar out.\n"));
    let renderer = renderer_from_config(&config).unwrap();
    let pipeline = NotesPipeline::with_components(config, model.clone(), None, renderer);

    let dir = tempfile::tempdir().unwrap();
    let session = session_with_photo(dir.path(), NoteStyle::Rewrite).await;
    let (session, first) = pipeline.submit(session).await;
    let (session, second) = pipeline.download(session).await;

    assert_eq!(first.unwrap().engine_used, Engine::Fallback);
    assert_eq!(second.unwrap().pdf_bytes, b"%PDF-1.4 html");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.phase(), SessionPhase::Rendered);
}

#[tokio::test]
async fn render_failure_keeps_the_note() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let config = NotesConfig::builder()
        .render_endpoint(server.uri())
        .build()
        .unwrap();
    let renderer = renderer_from_config(&config).unwrap();
    let pipeline =
        NotesPipeline::with_components(config, FakeModel::new(Some("# Notes\n")), None, renderer);

    let dir = tempfile::tempdir().unwrap();
    let session = session_with_photo(dir.path(), NoteStyle::Rewrite).await;
    let (session, result) = pipeline.submit(session).await;

    assert!(matches!(result, Err(NotesError::RenderFailed { .. })));
    assert_eq!(session.phase(), SessionPhase::RenderFailed);
    assert_eq!(session.note().unwrap().markdown_text, "# Notes\n");
    assert!(session.downloadable().is_none());
}

// ── Local rendering ──────────────────────────────────────────────────────────

#[tokio::test]
async fn local_renderer_writes_a_loadable_pdf() {
    let config = NotesConfig::builder()
        .renderer(RendererKind::Local)
        .build()
        .unwrap();
    let md = "| Term | Definition |\n| --- | --- |\n| Osmosis | Water moving across a membrane |\n";
    let renderer = renderer_from_config(&config).unwrap();
    let pipeline = NotesPipeline::with_components(config, FakeModel::new(Some(md)), None, renderer);

    let dir = tempfile::tempdir().unwrap();
    let session = session_with_photo(dir.path(), NoteStyle::DefineTerms).await;
    let (_, result) = pipeline.submit(session).await;
    let artifact = result.unwrap();
    assert_eq!(artifact.engine_used, Engine::Local);

    let out = dir.path().join("out/terms.pdf");
    artifact.write_to(&out).await.unwrap();
    let doc = lopdf::Document::load(&out).unwrap();
    assert!(!doc.get_pages().is_empty());
}

#[tokio::test]
async fn provider_failure_renders_placeholder_locally() {
    let config = NotesConfig::builder()
        .renderer(RendererKind::Local)
        .build()
        .unwrap();
    let renderer = renderer_from_config(&config).unwrap();
    let model = FakeModel::new(None);
    let pipeline = NotesPipeline::with_components(config, model.clone(), None, renderer);

    let dir = tempfile::tempdir().unwrap();
    let session = session_with_photo(dir.path(), NoteStyle::Parody).await;
    let (session, result) = pipeline.submit(session).await;

    assert!(result.is_ok());
    assert_eq!(session.note().unwrap().markdown_text, GENERATION_ERROR_PLACEHOLDER);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

// ── Upload transport ─────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_transport_uploads_and_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": {
                "name": "files/abc123",
                "uri": format!("{}/v1beta/files/abc123", server.uri()),
                "mimeType": "image/png"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/v1beta/files/abc123$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = NotesConfig::builder()
        .renderer(RendererKind::Local)
        .build()
        .unwrap();
    let store: Arc<dyn FileStore> = Arc::new(GeminiFileStore::new(server.uri(), "test-key"));
    let renderer = renderer_from_config(&config).unwrap();
    let pipeline = NotesPipeline::with_components(
        config,
        FakeModel::new(Some("# Uploaded\n")),
        Some(store),
        renderer,
    );

    let dir = tempfile::tempdir().unwrap();
    let session = session_with_photo(dir.path(), NoteStyle::Rewrite).await;
    let (_, result) = pipeline.submit(session).await;
    assert!(result.is_ok());
}

// ── Input errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_photo_file_is_reported() {
    let err = load_image("/definitely/not/here.jpg", NoteStyle::Rewrite)
        .await
        .unwrap_err();
    assert!(matches!(err, NotesError::ImageNotFound { .. }));
    assert!(err.is_input_error());
}

#[tokio::test]
async fn non_image_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.jpg");
    std::fs::write(&path, b"%PDF-1.4 not a photo").unwrap();
    let err = load_image(&path, NoteStyle::Rewrite).await.unwrap_err();
    assert!(matches!(err, NotesError::UnsupportedImage { .. }));
}
