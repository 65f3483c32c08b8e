//! Knowledge store: embeds documents and queries against a vector index.
//!
//! [`KnowledgeStore`] pairs the process-wide encoder with an optional
//! [`VectorIndex`]. Without an index (no credentials, unreachable service,
//! `backend = "disabled"`) the store runs degraded: upserts report
//! [`UpsertOutcome::Unavailable`] and queries return nothing. Failures are
//! logged, never surfaced to callers.
//!
//! # Backend Selection
//!
//! | `store.backend` | Index |
//! |-----------------|-------|
//! | `"pinecone"` | [`PineconeIndex`] (needs `PINECONE_API_KEY`) |
//! | `"memory"` | [`InMemoryIndex`] (process-local) |
//! | `"disabled"` | none |

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;

use jarvis_core::index::memory::InMemoryIndex;
use jarvis_core::index::VectorIndex;
use jarvis_core::models::{Document, RetrievedSnippet, StoreEntry};

use crate::config::StoreConfig;
use crate::embedding::EmbeddingEncoder;
use crate::pinecone::PineconeIndex;

/// Result of ingesting a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The document was embedded and written under this id.
    Stored(String),
    /// No index is available, or the write failed.
    Unavailable,
}

impl UpsertOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, UpsertOutcome::Stored(_))
    }
}

/// Store readiness as reported by `jarvis status` and `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreStatus {
    pub backend: String,
    pub available: bool,
}

pub struct KnowledgeStore {
    encoder: Arc<dyn EmbeddingEncoder>,
    index: Option<Arc<dyn VectorIndex>>,
    backend: String,
}

impl KnowledgeStore {
    /// Build a store over `index`.
    ///
    /// # Errors
    ///
    /// Fails when the index dimensionality differs from the encoder's.
    pub fn new(encoder: Arc<dyn EmbeddingEncoder>, index: Arc<dyn VectorIndex>) -> Result<Self> {
        if index.dims() != encoder.dims() {
            bail!(
                "{} index expects {} dims, but encoder '{}' produces {}",
                index.name(),
                index.dims(),
                encoder.model_name(),
                encoder.dims()
            );
        }
        Ok(Self {
            backend: index.name().to_string(),
            encoder,
            index: Some(index),
        })
    }

    /// A degraded store with no index behind it.
    pub fn unavailable(encoder: Arc<dyn EmbeddingEncoder>, backend: impl Into<String>) -> Self {
        Self {
            encoder,
            index: None,
            backend: backend.into(),
        }
    }

    /// Connect the configured backend. Never fails: any problem leaves the
    /// store degraded with a warning.
    pub async fn connect(
        config: &StoreConfig,
        api_key: Option<&str>,
        encoder: Arc<dyn EmbeddingEncoder>,
    ) -> Self {
        let dims = encoder.dims();
        match config.backend.as_str() {
            "memory" => {
                let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(dims));
                tracing::info!(dims, "using in-memory knowledge store");
                Self::from_index(encoder, index)
            }
            "pinecone" => {
                let Some(key) = api_key else {
                    tracing::warn!(
                        "PINECONE_API_KEY not set (or still the placeholder); \
                         knowledge store is unavailable"
                    );
                    return Self::unavailable(encoder, "pinecone");
                };
                match PineconeIndex::connect(config, key, dims).await {
                    Ok(index) => {
                        tracing::info!(index = index.index_name(), "connected to Pinecone");
                        Self::from_index(encoder, Arc::new(index))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "could not connect to Pinecone; knowledge store is unavailable");
                        Self::unavailable(encoder, "pinecone")
                    }
                }
            }
            other => {
                tracing::info!(backend = other, "knowledge store disabled");
                Self::unavailable(encoder, "disabled")
            }
        }
    }

    fn from_index(encoder: Arc<dyn EmbeddingEncoder>, index: Arc<dyn VectorIndex>) -> Self {
        let backend = index.name().to_string();
        match Self::new(Arc::clone(&encoder), index) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "knowledge store disabled");
                Self::unavailable(encoder, backend)
            }
        }
    }

    pub fn encoder(&self) -> &Arc<dyn EmbeddingEncoder> {
        &self.encoder
    }

    pub fn is_available(&self) -> bool {
        self.index.is_some()
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            backend: self.backend.clone(),
            available: self.is_available(),
        }
    }

    /// Embed and store a document. The text is copied into the entry
    /// metadata and `source` defaults to `"unknown"`.
    pub async fn upsert(&self, doc: &Document) -> UpsertOutcome {
        let Some(index) = &self.index else {
            tracing::warn!(backend = %self.backend, "knowledge store unavailable; document not stored");
            return UpsertOutcome::Unavailable;
        };

        let embedding = match self.encoder.encode(&doc.text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to embed document");
                return UpsertOutcome::Unavailable;
            }
        };

        let entry = StoreEntry::from_document(doc, embedding);
        match index.upsert(entry).await {
            Ok(()) => {
                tracing::debug!(id = %doc.id, "document stored");
                UpsertOutcome::Stored(doc.id.clone())
            }
            Err(e) => {
                tracing::warn!(error = %e, backend = %self.backend, "failed to store document");
                UpsertOutcome::Unavailable
            }
        }
    }

    /// Nearest snippets to `text`, best first. `top_k = 0` is treated as 1.
    /// Returns an empty list when the store is unavailable or any step fails.
    pub async fn query(&self, text: &str, top_k: usize) -> Vec<RetrievedSnippet> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        let top_k = top_k.max(1);

        let vector = match self.encoder.encode(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to embed query");
                return Vec::new();
            }
        };

        match index.query(&vector, top_k).await {
            Ok(matches) => matches
                .iter()
                .map(|m| RetrievedSnippet::from_metadata(&m.metadata, m.score))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, backend = %self.backend, "knowledge query failed");
                Vec::new()
            }
        }
    }

    /// Number of stored entries, if the backend can tell.
    pub async fn count(&self) -> Option<usize> {
        let index = self.index.as_ref()?;
        match index.count().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(error = %e, "could not count knowledge entries");
                None
            }
        }
    }
}
