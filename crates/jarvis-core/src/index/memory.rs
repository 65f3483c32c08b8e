//! In-memory [`VectorIndex`] implementation.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over all stored vectors. Entries keep
//! their insertion position, which breaks score ties deterministically.

use std::cmp::Ordering;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{check_dims, cosine_similarity};
use crate::models::StoreEntry;

use super::{IndexMatch, VectorIndex};

/// In-process vector index for development, tests, and single-node use.
pub struct InMemoryIndex {
    dims: usize,
    entries: RwLock<Vec<StoreEntry>>,
}

impl InMemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entry: StoreEntry) -> Result<()> {
        check_dims(&entry.embedding, self.dims)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory index lock poisoned"))?;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        check_dims(vector, self.dims)?;
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("memory index lock poisoned"))?;

        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (pos, cosine_similarity(vector, &e.embedding)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| {
                let e = &entries[pos];
                IndexMatch {
                    id: e.id.clone(),
                    score,
                    metadata: e.metadata.clone(),
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("memory index lock poisoned"))?;
        Ok(entries.len())
    }
}
