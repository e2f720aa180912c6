//! VLM interaction: send the note photo plus the style prompt, get markdown.
//!
//! The request is one user turn holding the instruction text and the image,
//! with fixed sampling parameters and no provider-side streaming.
//!
//! ## Failure policy
//!
//! There is no retry. Any transport or provider error is logged and replaced
//! by [`GENERATION_ERROR_PLACEHOLDER`], so the rest of the pipeline still runs
//! and the user sees a message instead of a crash.

use crate::config::ImageTransport;
use crate::error::NotesError;
use crate::output::NoteRequest;
use crate::pipeline::encode::{encode_inline, ImageRef};
use crate::pipeline::postprocess;
use crate::pipeline::upload::{delete_quietly, upload_image, FileStore};
use crate::prompts::Sampling;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Text returned in place of a note when the provider call fails.
pub const GENERATION_ERROR_PLACEHOLDER: &str = "Error generating response.";

/// Per-request generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionOptions {
    pub sampling: Sampling,
    pub max_tokens: usize,
}

/// A vision-capable chat model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send one user turn (`prompt` + `image`) and return the completion text.
    async fn complete(
        &self,
        prompt: &str,
        image: &ImageRef,
        options: &VisionOptions,
    ) -> Result<String, NotesError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn complete(
        &self,
        prompt: &str,
        image: &ImageRef,
        options: &VisionOptions,
    ) -> Result<String, NotesError> {
        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![image.to_image_data()],
        )];
        let completion = build_options(options);

        let response = self
            .provider
            .chat(&messages, Some(&completion))
            .await
            .map_err(|e| NotesError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the request options.
fn build_options(options: &VisionOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(options.sampling.temperature),
        top_p: Some(options.sampling.top_p),
        max_tokens: Some(options.max_tokens),
        ..Default::default()
    }
}

/// Packages a note image and prompt into a vision request.
pub struct VisionClient {
    model: Arc<dyn VisionModel>,
    file_store: Option<Arc<dyn FileStore>>,
    max_tokens: usize,
}

impl VisionClient {
    /// Client using the inline base64 transport.
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self {
            model,
            file_store: None,
            max_tokens: 3072,
        }
    }

    /// Switch to the upload-and-reference transport.
    pub fn with_file_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.file_store = Some(store);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn transport(&self) -> ImageTransport {
        if self.file_store.is_some() {
            ImageTransport::Upload
        } else {
            ImageTransport::Inline
        }
    }

    /// Generate a note for `request` using `prompt`.
    ///
    /// Never fails: provider errors yield [`GENERATION_ERROR_PLACEHOLDER`].
    pub async fn generate_note(&self, request: &NoteRequest, prompt: &str, sampling: Sampling) -> String {
        let start = Instant::now();
        let options = VisionOptions {
            sampling,
            max_tokens: self.max_tokens,
        };

        let result = match &self.file_store {
            None => {
                let image = encode_inline(request);
                self.model.complete(prompt, &image, &options).await
            }
            Some(store) => self.complete_uploaded(store.as_ref(), request, prompt, &options).await,
        };

        match result {
            Ok(text) => {
                info!(
                    "Generated {} note: {} chars in {:?}",
                    request.style,
                    text.len(),
                    start.elapsed()
                );
                postprocess::clean_markdown(&text)
            }
            Err(e) => {
                warn!("Vision request for {} failed: {}", request.source_name, e);
                GENERATION_ERROR_PLACEHOLDER.to_string()
            }
        }
    }

    async fn complete_uploaded(
        &self,
        store: &dyn FileStore,
        request: &NoteRequest,
        prompt: &str,
        options: &VisionOptions,
    ) -> Result<String, NotesError> {
        let file = upload_image(store, request).await?;
        let image = ImageRef::Uploaded(file.clone());
        let result = self.model.complete(prompt, &image, options).await;
        delete_quietly(store, &file).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::upload::UploadedFile;
    use crate::prompts::NoteStyle;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted model: returns `reply` or fails, and records what it saw.
    struct ScriptedModel {
        reply: Option<String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn complete(
            &self,
            prompt: &str,
            image: &ImageRef,
            _options: &VisionOptions,
        ) -> Result<String, NotesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let uploaded = matches!(image, ImageRef::Uploaded(_));
            self.seen.lock().unwrap().push((prompt.to_string(), uploaded));
            self.reply.clone().ok_or_else(|| NotesError::LlmApiError {
                message: "503 Service Unavailable".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        uploads: AtomicUsize,
        deletes: AtomicUsize,
        fail_delete: bool,
        uploaded_paths: Mutex<Vec<std::path::PathBuf>>,
    }

    #[async_trait]
    impl FileStore for RecordingStore {
        async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, NotesError> {
            assert!(path.exists(), "temp copy must exist during upload");
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.uploaded_paths.lock().unwrap().push(path.to_path_buf());
            Ok(UploadedFile {
                name: "files/n1".into(),
                uri: "https://files.example/n1".into(),
                mime_type: mime_type.into(),
            })
        }

        async fn delete(&self, _file: &UploadedFile) -> Result<(), NotesError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                Err(NotesError::Internal("HTTP 500".into()))
            } else {
                Ok(())
            }
        }
    }

    fn request() -> NoteRequest {
        NoteRequest::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg", NoteStyle::Rewrite)
    }

    fn sampling() -> Sampling {
        NoteStyle::Rewrite.sampling()
    }

    #[tokio::test]
    async fn provider_failure_yields_placeholder() {
        let model = ScriptedModel::failing();
        let client = VisionClient::new(model.clone());
        let text = client.generate_note(&request(), "prompt", sampling()).await;
        assert_eq!(text, GENERATION_ERROR_PLACEHOLDER);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1, "no retries");
    }

    #[tokio::test]
    async fn inline_transport_sends_prompt_once() {
        let model = ScriptedModel::replying("## Notes\n\nHello\n");
        let client = VisionClient::new(model.clone());
        let text = client.generate_note(&request(), "the prompt", sampling()).await;
        assert_eq!(text, "## Notes\n\nHello\n");
        let seen = model.seen.lock().unwrap();
        assert_eq!(*seen, vec![("the prompt".to_string(), false)]);
    }

    #[tokio::test]
    async fn tagged_fence_and_crlf_are_unwrapped() {
        let model = ScriptedModel::replying("```markdown\n# Title\r\nBody\n```");
        let client = VisionClient::new(model);
        let text = client.generate_note(&request(), "p", sampling()).await;
        assert_eq!(text, "# Title\nBody");
    }

    #[tokio::test]
    async fn model_markdown_is_otherwise_kept_verbatim() {
        for reply in [
            "## Part A\n...",
            "Line one  \nline two\n",
            "```\nx = 1\n\n\n\ny = 2\n```",
        ] {
            let client = VisionClient::new(ScriptedModel::replying(reply));
            let text = client.generate_note(&request(), "p", sampling()).await;
            assert_eq!(text, reply);
        }
    }

    #[tokio::test]
    async fn upload_transport_deletes_file_and_temp_copy() {
        let model = ScriptedModel::replying("ok");
        let store = Arc::new(RecordingStore::default());
        let client = VisionClient::new(model.clone()).with_file_store(store.clone());
        assert_eq!(client.transport(), ImageTransport::Upload);

        client.generate_note(&request(), "p", sampling()).await;

        assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
        assert!(model.seen.lock().unwrap()[0].1, "image must be referenced by handle");
        for p in store.uploaded_paths.lock().unwrap().iter() {
            assert!(!p.exists(), "temp copy {} was not removed", p.display());
        }
    }

    #[tokio::test]
    async fn upload_transport_deletes_even_when_model_fails() {
        let model = ScriptedModel::failing();
        let store = Arc::new(RecordingStore::default());
        let client = VisionClient::new(model).with_file_store(store.clone());

        let text = client.generate_note(&request(), "p", sampling()).await;
        assert_eq!(text, GENERATION_ERROR_PLACEHOLDER);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_failure_is_not_escalated() {
        let model = ScriptedModel::replying("fine");
        let store = Arc::new(RecordingStore {
            fail_delete: true,
            ..Default::default()
        });
        let client = VisionClient::new(model).with_file_store(store.clone());

        let text = client.generate_note(&request(), "p", sampling()).await;
        assert_eq!(text, "fine");
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn build_options_carries_sampling() {
        let opts = build_options(&VisionOptions {
            sampling: Sampling {
                temperature: 0.3,
                top_p: 0.95,
            },
            max_tokens: 3072,
        });
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.top_p, Some(0.95));
        assert_eq!(opts.max_tokens, Some(3072));
    }
}
