//! Vector index abstraction for Jarvis.
//!
//! The [`VectorIndex`] trait defines the storage operations the knowledge
//! store needs from a similarity index, enabling pluggable backends
//! (in-memory, Pinecone, future local stores).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Metadata, StoreEntry};

/// A nearest-neighbor hit returned from a [`VectorIndex`] query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    /// Entry id.
    pub id: String,
    /// Cosine similarity between the query vector and the stored vector.
    pub score: f32,
    /// Metadata stored alongside the vector.
    pub metadata: Metadata,
}

/// Abstract similarity index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace an entry by id |
/// | [`query`](VectorIndex::query) | Top-k cosine similarity search |
/// | [`count`](VectorIndex::count) | Number of stored entries |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend identifier (e.g. `"memory"`, `"pinecone"`).
    fn name(&self) -> &str;

    /// Dimensionality every stored and queried vector must have.
    fn dims(&self) -> usize;

    /// Insert or replace an entry. Writes are idempotent by id.
    async fn upsert(&self, entry: StoreEntry) -> Result<()>;

    /// Return up to `top_k` entries ordered by similarity, highest first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize>;
}
