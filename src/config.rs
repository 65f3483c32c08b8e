//! TOML configuration parsing and validation.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration: local embeddings, Pinecone retrieval when a key is
//! present, and automatic generation backend selection.
//!
//! Credentials and a few deployment knobs may also come from the
//! environment; see [`Config::apply_overrides`]. Environment values win
//! over file values.
//!
//! ```toml
//! [embedding]
//! provider = "local"            # local | hash
//! model = "all-minilm-l6-v2"
//!
//! [store]
//! backend = "pinecone"          # pinecone | memory | disabled
//! index_name = "jarvis-knowledge"
//!
//! [retrieval]
//! top_k = 3
//! context_cap = 3
//! min_score = 0.3
//!
//! [generation]
//! backend = "auto"              # auto | cloud | local | disabled
//! temperature = 0.7
//! max_tokens = 500
//!
//! [generation.ollama]
//! url = "http://localhost:11434"
//! model = "llama2"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Placeholder shipped in the sample `.env` for the Pinecone key.
pub const PINECONE_KEY_PLACEHOLDER: &str = "your_pinecone_api_key_here";
/// Placeholder shipped in the sample `.env` for the OpenAI key.
pub const OPENAI_KEY_PLACEHOLDER: &str = "your_openai_api_key_here";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Jarvis, a helpful AI assistant.";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            index_name: default_index_name(),
            api_key: None,
            cloud: default_cloud(),
            region: default_region(),
            controller_url: default_controller_url(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_store_backend() -> String {
    "pinecone".to_string()
}
fn default_index_name() -> String {
    "jarvis-knowledge".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_controller_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_store_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_cap")]
    pub context_cap: usize,
    /// Snippets scoring below this never reach the prompt. Set a negative
    /// value to keep every hit.
    #[serde(default = "default_min_score")]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub max_chars: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_cap: default_context_cap(),
            min_score: default_min_score(),
            max_chars: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_context_cap() -> usize {
    3
}
fn default_min_score() -> Option<f32> {
    Some(0.3)
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_backend")]
    pub backend: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_generation_backend(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_generation_timeout_secs(),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

fn default_generation_backend() -> String {
    "auto".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "llama2".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key: None,
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Returns the credential if it is usable: non-empty after trimming and
/// not a sample-file placeholder such as `your_openai_api_key_here`.
pub fn usable_credential<'a>(value: Option<&'a str>, placeholder: &str) -> Option<&'a str> {
    let value = value?.trim();
    if value.is_empty() || value == placeholder {
        return None;
    }
    if value.starts_with("your_") && value.ends_with("_here") {
        return None;
    }
    Some(value)
}

impl Config {
    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PINECONE_API_KEY` | `store.api_key` |
    /// | `PINECONE_INDEX_NAME` | `store.index_name` |
    /// | `OPENAI_API_KEY` | `generation.openai.api_key` |
    /// | `OLLAMA_MODEL` | `generation.ollama.model` |
    /// | `OLLAMA_URL` | `generation.ollama.url` |
    ///
    /// Credential variables that are empty or still hold a sample
    /// placeholder are ignored, so they never hide a key set in the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PINECONE_API_KEY") {
            if let Some(key) = usable_credential(Some(&v), PINECONE_KEY_PLACEHOLDER) {
                self.store.api_key = Some(key.to_string());
            }
        }
        if let Some(v) = lookup("PINECONE_INDEX_NAME").filter(|v| !v.trim().is_empty()) {
            self.store.index_name = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            if let Some(key) = usable_credential(Some(&v), OPENAI_KEY_PLACEHOLDER) {
                self.generation.openai.api_key = Some(key.to_string());
            }
        }
        if let Some(v) = lookup("OLLAMA_MODEL").filter(|v| !v.trim().is_empty()) {
            self.generation.ollama.model = v;
        }
        if let Some(v) = lookup("OLLAMA_URL").filter(|v| !v.trim().is_empty()) {
            self.generation.ollama.url = v;
        }
    }

    /// The Pinecone key, if one is configured and not a placeholder.
    pub fn pinecone_api_key(&self) -> Option<&str> {
        usable_credential(self.store.api_key.as_deref(), PINECONE_KEY_PLACEHOLDER)
    }

    /// The OpenAI key, if one is configured and not a placeholder.
    pub fn openai_api_key(&self) -> Option<&str> {
        usable_credential(
            self.generation.openai.api_key.as_deref(),
            OPENAI_KEY_PLACEHOLDER,
        )
    }

    pub fn validate(&self) -> Result<()> {
        match self.embedding.provider.as_str() {
            "local" | "hash" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local or hash.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.store.backend.as_str() {
            "pinecone" | "memory" | "disabled" => {}
            other => bail!(
                "Unknown store backend: '{}'. Must be pinecone, memory, or disabled.",
                other
            ),
        }
        if self.store.index_name.trim().is_empty() {
            bail!("store.index_name must not be empty");
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.context_cap < 1 {
            bail!("retrieval.context_cap must be >= 1");
        }

        match self.generation.backend.as_str() {
            "auto" | "cloud" | "local" | "disabled" => {}
            other => bail!(
                "Unknown generation backend: '{}'. Must be auto, cloud, local, or disabled.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_tokens < 1 {
            bail!("generation.max_tokens must be >= 1");
        }

        Ok(())
    }
}

/// Parse and validate configuration text. Does not read the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`, apply environment overrides, and
/// validate.
///
/// A missing file is not an error: built-in defaults are used instead.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
