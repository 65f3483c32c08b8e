//! Local generation through an Ollama server.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, BackendError, GenerationBackend, GenerationParams, Prompt};
use crate::config::OllamaConfig;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    params: GenerationParams,
}

impl OllamaBackend {
    pub fn new(
        config: &OllamaConfig,
        params: GenerationParams,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            params,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the server which models are installed. `Ok(false)` means Ollama
    /// is up but the configured model has not been pulled.
    pub async fn probe(&self) -> Result<bool, BackendError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let tags: TagsResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(tags
            .models
            .iter()
            .any(|m| model_matches(&m.name, &self.model)))
    }
}

/// Ollama lists models with a tag (`llama2:latest`); an untagged name
/// matches any tag.
fn model_matches(listed: &str, wanted: &str) -> bool {
    if wanted.contains(':') {
        return listed == wanted;
    }
    listed == wanted || listed.split(':').next() == Some(wanted)
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "system": prompt.system,
            "prompt": prompt.user,
            "stream": false,
            "options": {
                "temperature": self.params.temperature,
                "num_predict": self.params.max_tokens,
            }
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        parsed
            .response
            .ok_or_else(|| BackendError::Decode("missing 'response' field".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_matches() {
        assert!(model_matches("llama2:latest", "llama2"));
        assert!(model_matches("llama2", "llama2"));
        assert!(model_matches("llama2:13b", "llama2:13b"));
        assert!(!model_matches("llama2:latest", "llama2:13b"));
        assert!(!model_matches("llama2-uncensored:latest", "llama2"));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = OllamaConfig {
            url: "http://localhost:11434/".to_string(),
            model: "llama2".to_string(),
        };
        let params = GenerationParams {
            temperature: 0.7,
            max_tokens: 500,
        };
        let backend = OllamaBackend::new(&config, params, Duration::from_secs(1)).unwrap();
        assert_eq!(backend.url(), "http://localhost:11434");
    }
}
