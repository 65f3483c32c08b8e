//! Request orchestration: retrieve, assemble, generate.
//!
//! ```text
//! query ──► KnowledgeStore::query ──► ContextAssembler::assemble
//!                                              │
//!            Answer { response, sources } ◄── GenerationRouter::generate
//! ```
//!
//! A [`RagPipeline`] is built once per process and shared behind an `Arc`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use jarvis_core::context::ContextAssembler;
use jarvis_core::models::Document;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::create_encoder;
use crate::generation::{GenerationRouter, GenerationStatus};
use crate::knowledge::{KnowledgeStore, StoreStatus, UpsertOutcome};

/// A generated response and the sources of the context it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderStatus {
    pub model: String,
    pub dims: usize,
}

/// Readiness of every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub encoder: EncoderStatus,
    pub store: StoreStatus,
    pub generation: Option<GenerationStatus>,
}

pub struct RagPipeline {
    store: KnowledgeStore,
    assembler: ContextAssembler,
    router: GenerationRouter,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(store: KnowledgeStore, assembler: ContextAssembler, router: GenerationRouter) -> Self {
        Self {
            store,
            assembler,
            router,
            top_k: 3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Wire every component from configuration.
    ///
    /// # Errors
    ///
    /// Only an encoder that fails to load is an error. An unreachable store
    /// or generation backend leaves the pipeline degraded.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let encoder = create_encoder(&config.embedding).await?;
        let store = KnowledgeStore::connect(&config.store, config.pinecone_api_key(), encoder).await;
        let router = GenerationRouter::from_config(&config.generation, config.openai_api_key()).await;

        Ok(Self::new(store, assembler_from_config(&config.retrieval), router)
            .with_top_k(config.retrieval.top_k))
    }

    /// Answer a question using whatever knowledge is available. Never
    /// fails; an empty query is answered like any other.
    pub async fn answer(&self, query: &str) -> Answer {
        let snippets = self.store.query(query, self.top_k).await;
        let block = self.assembler.assemble(&snippets);
        tracing::debug!(
            retrieved = snippets.len(),
            used = block.len(),
            "context assembled"
        );

        let response = self.router.generate(query, &block).await;
        Answer {
            response,
            sources: block.sources,
        }
    }

    /// Alias of [`answer`](Self::answer) for chat front ends.
    pub async fn ask(&self, message: &str) -> Answer {
        self.answer(message).await
    }

    /// Store `text` as a new document tagged with `source`.
    pub async fn ingest(&self, text: &str, source: &str) -> UpsertOutcome {
        let doc = Document::new(text, source);
        self.store.upsert(&doc).await
    }

    pub fn status(&self) -> PipelineStatus {
        let encoder = self.store.encoder();
        PipelineStatus {
            encoder: EncoderStatus {
                model: encoder.model_name().to_string(),
                dims: encoder.dims(),
            },
            store: self.store.status(),
            generation: self.router.status(),
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }
}

fn assembler_from_config(config: &RetrievalConfig) -> ContextAssembler {
    // Negative thresholds switch filtering off.
    let min_score = config.min_score.filter(|s| *s >= 0.0);
    ContextAssembler::new(config.context_cap)
        .with_min_score(min_score)
        .with_max_chars(config.max_chars)
}
