//! Answer generation across local and cloud language models.
//!
//! The [`GenerationRouter`] owns at most one [`Backend`], chosen once at
//! startup, and turns every failure into a readable apology so that
//! [`GenerationRouter::generate`] always returns text.
//!
//! # Backend Selection
//!
//! | `generation.backend` | Result |
//! |----------------------|--------|
//! | `"auto"` | OpenAI when a usable `OPENAI_API_KEY` is set, else Ollama |
//! | `"cloud"` | OpenAI, or no backend without a usable key |
//! | `"local"` | Ollama |
//! | `"disabled"` | no backend |
//!
//! Ollama is probed at startup. An unreachable server or a missing model is
//! logged with a hint but keeps the backend; the first request may succeed
//! once Ollama is started.

mod ollama;
mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use jarvis_core::context::ContextBlock;

use crate::config::GenerationConfig;

/// Instructions appended after the user's question.
pub const ANSWER_INSTRUCTIONS: &str = "Please provide a helpful and accurate response based on \
the context provided (if any) and your knowledge. Be conversational and friendly.";

/// Returned when no backend could be configured.
pub const NO_BACKEND_APOLOGY: &str = "I'm sorry, no language model backend is available. \
Start Ollama or add an OpenAI API key, then restart Jarvis.";

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Map a non-success response to a [`BackendError`], passing successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = status.as_u16();
    if code == 401 || code == 403 {
        return Err(BackendError::Auth { status: code });
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Api { status: code, body })
}

/// A system/user message pair for one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// The user message is the rendered context (if any), the question,
    /// and the answer instructions.
    pub fn build(system: &str, query: &str, context: &ContextBlock) -> Self {
        Self {
            system: system.to_string(),
            user: format!(
                "{}User question: {}\n\n{}",
                context.render(),
                query,
                ANSWER_INSTRUCTIONS
            ),
        }
    }
}

/// Sampling parameters shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A language model that completes a [`Prompt`].
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Display name used in logs and apologies (e.g. `"Ollama"`).
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Cloud,
}

/// The configured backend.
pub enum Backend {
    Local(OllamaBackend),
    Cloud(OpenAiBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Local(_) => BackendKind::Local,
            Backend::Cloud(_) => BackendKind::Cloud,
        }
    }

    fn apology(&self, err: &BackendError) -> String {
        match self {
            Backend::Cloud(_) => format!(
                "I'm sorry, I encountered an error with OpenAI: {}. Please check your API key.",
                err
            ),
            Backend::Local(b) => format!(
                "I'm sorry, I encountered an error: {}. Please make sure Ollama is running \
                 with the {} model, or add an OpenAI API key to use GPT instead.",
                err,
                b.model()
            ),
        }
    }
}

#[async_trait]
impl GenerationBackend for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::Local(b) => b.name(),
            Backend::Cloud(b) => b.name(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Backend::Local(b) => b.model(),
            Backend::Cloud(b) => b.model(),
        }
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        match self {
            Backend::Local(b) => b.generate(prompt).await,
            Backend::Cloud(b) => b.generate(prompt).await,
        }
    }
}

/// Generation readiness as reported by `jarvis status` and `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerationStatus {
    pub kind: BackendKind,
    pub name: String,
    pub model: String,
}

pub struct GenerationRouter {
    backend: Option<Backend>,
    system_prompt: String,
}

impl GenerationRouter {
    pub fn new(backend: Option<Backend>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
        }
    }

    /// Select and build the backend. `openai_key` must already be filtered
    /// for placeholders.
    pub async fn from_config(config: &GenerationConfig, openai_key: Option<&str>) -> Self {
        let backend = match config.backend.as_str() {
            "disabled" => {
                tracing::info!("generation disabled");
                None
            }
            "cloud" => match openai_key {
                Some(key) => build_cloud(config, key),
                None => {
                    tracing::warn!("generation.backend = \"cloud\" but OPENAI_API_KEY is not set");
                    None
                }
            },
            "local" => build_local(config).await,
            _ => match openai_key {
                Some(key) => match build_cloud(config, key) {
                    Some(b) => Some(b),
                    None => build_local(config).await,
                },
                None => build_local(config).await,
            },
        };

        match &backend {
            Some(b) => tracing::info!(backend = b.name(), model = b.model(), "generation backend ready"),
            None => tracing::warn!("no language model backend available; answers will be apologies"),
        }

        Self::new(backend, config.system_prompt.clone())
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn status(&self) -> Option<GenerationStatus> {
        self.backend.as_ref().map(|b| GenerationStatus {
            kind: b.kind(),
            name: b.name().to_string(),
            model: b.model().to_string(),
        })
    }

    /// Answer `query` with `context`. Never fails: backend errors become an
    /// apology naming the backend.
    pub async fn generate(&self, query: &str, context: &ContextBlock) -> String {
        let Some(backend) = &self.backend else {
            return NO_BACKEND_APOLOGY.to_string();
        };

        let prompt = Prompt::build(&self.system_prompt, query, context);
        match backend.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(backend = backend.name(), error = %e, "generation failed");
                backend.apology(&e)
            }
        }
    }
}

fn build_cloud(config: &GenerationConfig, key: &str) -> Option<Backend> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match OpenAiBackend::new(
        &config.openai,
        key,
        GenerationParams::from_config(config),
        timeout,
    ) {
        Ok(b) => Some(Backend::Cloud(b)),
        Err(e) => {
            tracing::warn!(error = %e, "could not initialize the OpenAI client");
            None
        }
    }
}

async fn build_local(config: &GenerationConfig) -> Option<Backend> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let backend = match OllamaBackend::new(
        &config.ollama,
        GenerationParams::from_config(config),
        timeout,
    ) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "could not initialize the Ollama client");
            return None;
        }
    };

    match backend.probe().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(
            model = backend.model(),
            "Ollama is running but the model is not installed; run `ollama pull {}`",
            backend.model()
        ),
        Err(e) => tracing::warn!(
            url = backend.url(),
            error = %e,
            "Ollama is not reachable; start it with `ollama serve`"
        ),
    }
    Some(Backend::Local(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OllamaConfig, OpenAiConfig};
    use jarvis_core::context::ContextAssembler;
    use jarvis_core::models::RetrievedSnippet;

    // Nothing listens on port 1, so connections are refused immediately.
    const DEAD_URL: &str = "http://127.0.0.1:1";

    fn params() -> GenerationParams {
        GenerationParams {
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    fn dead_ollama() -> Backend {
        let config = OllamaConfig {
            url: DEAD_URL.to_string(),
            model: "llama2".to_string(),
        };
        Backend::Local(OllamaBackend::new(&config, params(), Duration::from_secs(5)).unwrap())
    }

    fn dead_openai() -> Backend {
        let config = OpenAiConfig {
            base_url: DEAD_URL.to_string(),
            ..OpenAiConfig::default()
        };
        Backend::Cloud(
            OpenAiBackend::new(&config, "sk-test", params(), Duration::from_secs(5)).unwrap(),
        )
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = Prompt::build("sys", "hi", &ContextBlock::default());
        assert_eq!(prompt.system, "sys");
        assert!(prompt.user.starts_with("User question: hi\n\n"));
        assert!(prompt.user.ends_with("Be conversational and friendly."));
    }

    #[test]
    fn test_prompt_with_context() {
        let block = ContextAssembler::default().assemble(&[RetrievedSnippet {
            text: "Paris is the capital of France".to_string(),
            source: "encyclopedia".to_string(),
            score: 0.9,
        }]);
        let prompt = Prompt::build("sys", "capital?", &block);
        assert!(prompt
            .user
            .starts_with("Context information:\nParis is the capital of France\n\nUser question: capital?"));
    }

    #[tokio::test]
    async fn test_no_backend_apology() {
        let router = GenerationRouter::new(None, "sys");
        let text = router.generate("hello", &ContextBlock::default()).await;
        assert_eq!(text, NO_BACKEND_APOLOGY);
        assert!(router.status().is_none());
    }

    #[tokio::test]
    async fn test_broken_local_backend_names_ollama() {
        let router = GenerationRouter::new(Some(dead_ollama()), "sys");
        let text = router.generate("hello", &ContextBlock::default()).await;
        assert!(text.starts_with("I'm sorry, I encountered an error:"));
        assert!(text.contains("Ollama"));
        assert!(text.contains("llama2"));
    }

    #[tokio::test]
    async fn test_broken_cloud_backend_names_openai() {
        let router = GenerationRouter::new(Some(dead_openai()), "sys");
        let text = router.generate("", &ContextBlock::default()).await;
        assert!(text.starts_with("I'm sorry, I encountered an error with OpenAI:"));
        assert!(text.ends_with("Please check your API key."));
    }

    #[tokio::test]
    async fn test_selection() {
        let mut config = GenerationConfig::default();
        config.ollama.url = DEAD_URL.to_string();
        config.openai.base_url = DEAD_URL.to_string();

        let auto_with_key = GenerationRouter::from_config(&config, Some("sk-test")).await;
        assert_eq!(auto_with_key.status().unwrap().kind, BackendKind::Cloud);

        let auto_without_key = GenerationRouter::from_config(&config, None).await;
        assert_eq!(auto_without_key.status().unwrap().kind, BackendKind::Local);

        config.backend = "cloud".to_string();
        assert!(GenerationRouter::from_config(&config, None).await.status().is_none());

        config.backend = "local".to_string();
        let local = GenerationRouter::from_config(&config, Some("sk-test")).await;
        assert_eq!(local.status().unwrap().kind, BackendKind::Local);

        config.backend = "disabled".to_string();
        assert!(GenerationRouter::from_config(&config, Some("sk-test")).await.status().is_none());
    }
}
