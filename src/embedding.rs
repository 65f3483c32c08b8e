//! Embedding encoder implementations and selection.
//!
//! The [`EmbeddingEncoder`] trait and the model-free [`HashingEncoder`] live
//! in `jarvis-core`; this module adds:
//! - **`LocalEncoder`**: sentence-transformer models run locally via
//!   fastembed. The model is downloaded on first use from Hugging Face,
//!   cached, and loaded once per process.
//!
//! # Encoder Selection
//!
//! | `embedding.provider` | Encoder |
//! |----------------------|---------|
//! | `"local"` | `LocalEncoder` (requires the `local-embeddings-fastembed` feature) |
//! | `"hash"` | [`HashingEncoder`] |
//!
//! Load failure is fatal: [`create_encoder`] returns an error and the caller
//! must abort startup. A service that cannot embed would never find a match.

use anyhow::{bail, Result};
use std::sync::Arc;

pub use jarvis_core::embedding::{cosine_similarity, EmbeddingEncoder, HashingEncoder};

use crate::config::EmbeddingConfig;

/// Default model for the local encoder.
pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";
/// Default dimensionality for the hashing encoder.
pub const DEFAULT_HASH_DIMS: usize = 384;

/// Native output dimensionality of the supported local models.
pub fn native_dims(model: &str) -> Option<usize> {
    match model {
        "all-minilm-l6-v2" => Some(384),
        "bge-small-en-v1.5" => Some(384),
        "bge-base-en-v1.5" => Some(768),
        "bge-large-en-v1.5" => Some(1024),
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => Some(768),
        _ => None,
    }
}

/// Resolve the local model name and its dimensionality from config.
///
/// A configured `dims` that disagrees with the model's native size is a
/// configuration error: vectors of different lengths cannot share an index.
pub fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());

    let Some(native) = native_dims(&model_name) else {
        bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            model_name
        );
    };

    if let Some(dims) = config.dims {
        if dims != native {
            bail!(
                "embedding.dims = {} does not match model '{}' ({} dims)",
                dims,
                model_name,
                native
            );
        }
    }

    Ok((model_name, native))
}

// ============ Local Encoder (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEncoder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use jarvis_core::embedding::{check_dims, EmbeddingEncoder};
    use jarvis_core::models::Embedding;

    use super::resolve_local_model;
    use crate::config::EmbeddingConfig;

    fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            other => bail!("Unknown local embedding model: '{}'", other),
        }
    }

    /// Sentence embeddings computed in-process with fastembed (ONNX Runtime).
    ///
    /// Inference is CPU-bound, so each call runs on the blocking pool. The
    /// loaded model sits behind a mutex; fastembed sessions are not
    /// re-entrant.
    pub struct LocalEncoder {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalEncoder {
        /// Download (if needed) and load the configured model.
        pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
            let (model_name, dims) = resolve_local_model(config)?;
            let fastembed_model = config_to_fastembed_model(&model_name)?;

            let model = tokio::task::spawn_blocking(move || {
                fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model)
                        .with_show_download_progress(false),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))
            })
            .await??;

            Ok(Self {
                model_name,
                dims,
                batch_size: config.batch_size,
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait]
    impl EmbeddingEncoder for LocalEncoder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn encode(&self, text: &str) -> Result<Embedding> {
            let model = Arc::clone(&self.model);
            let batch_size = self.batch_size;
            let texts = vec![text.to_string()];

            let embeddings = tokio::task::spawn_blocking(move || {
                let mut guard = model
                    .lock()
                    .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
                guard
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow!("Local embedding failed: {}", e))
            })
            .await??;

            let vector = embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Empty embedding response"))?;
            check_dims(&vector, self.dims)?;
            Ok(vector)
        }
    }
}

/// Create the configured encoder.
///
/// # Errors
///
/// Returns an error for unknown providers, models, mismatched dims, a
/// disabled feature flag, or a model that fails to load. Callers treat any
/// error as fatal.
pub async fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingEncoder>> {
    let encoder: Arc<dyn EmbeddingEncoder> = match config.provider.as_str() {
        "hash" => Arc::new(HashingEncoder::new(
            config.dims.unwrap_or(DEFAULT_HASH_DIMS),
        )?),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Arc::new(LocalEncoder::load(config).await?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed \
             (or set embedding.provider = \"hash\")"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    };

    tracing::info!(
        model = encoder.model_name(),
        dims = encoder.dims(),
        "embedding encoder loaded"
    );
    Ok(encoder)
}
