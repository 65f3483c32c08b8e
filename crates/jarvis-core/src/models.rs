//! Core data models that flow through ingestion and retrieval.
//!
//! A [`Document`] is what callers ingest. The knowledge store turns it into
//! a [`StoreEntry`] (vector plus metadata) for the backing index, and query
//! hits come back as [`RetrievedSnippet`]s.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding the original document text.
pub const TEXT_KEY: &str = "text";
/// Metadata key holding the provenance tag of a document.
pub const SOURCE_KEY: &str = "source";
/// Source reported for entries stored without a `source` tag.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// String metadata attached to a document. Ordered so that serialized
/// entries are reproducible.
pub type Metadata = BTreeMap<String, String>;

/// A fixed-length embedding vector.
pub type Embedding = Vec<f32>;

/// A document submitted for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque unique identifier (UUID v4 unless the caller supplied one).
    pub id: String,
    /// Body text that gets embedded.
    pub text: String,
    /// Caller-supplied metadata (typically `source`).
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with a freshly generated id and a `source` tag.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }

    /// Replace the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add or overwrite a metadata value.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The durable unit of retrieval: an id, its vector, and metadata that
/// always carries `text` and `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: String,
    pub embedding: Embedding,
    pub metadata: Metadata,
}

impl StoreEntry {
    /// Build an entry from a document and its embedding.
    ///
    /// The document text is copied into `metadata["text"]`, and a missing
    /// `source` is filled with [`UNKNOWN_SOURCE`].
    pub fn from_document(doc: &Document, embedding: Embedding) -> Self {
        let mut metadata = doc.metadata.clone();
        metadata.insert(TEXT_KEY.to_string(), doc.text.clone());
        metadata
            .entry(SOURCE_KEY.to_string())
            .or_insert_with(|| UNKNOWN_SOURCE.to_string());
        Self {
            id: doc.id.clone(),
            embedding,
            metadata,
        }
    }
}

/// A ranked hit returned by a knowledge store query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub text: String,
    pub source: String,
    /// Cosine similarity in `[-1, 1]`; higher is more relevant.
    pub score: f32,
}

impl RetrievedSnippet {
    /// Map index metadata back to a snippet, defaulting absent fields.
    pub fn from_metadata(metadata: &Metadata, score: f32) -> Self {
        Self {
            text: metadata.get(TEXT_KEY).cloned().unwrap_or_default(),
            source: metadata
                .get(SOURCE_KEY)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            score,
        }
    }
}
