//! Embedding encoder trait and vector utilities.
//!
//! Defines the [`EmbeddingEncoder`] trait that every encoder implements,
//! the model-free [`HashingEncoder`], and pure helpers for similarity
//! computation.
//!
//! Encoders backed by a model runtime (fastembed) live in the `jarvis-rag`
//! app crate.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::Embedding;

/// Converts text into a fixed-dimension vector.
///
/// Implementations are loaded once at startup and shared read-only across
/// requests. `encode` must be deterministic for a given model and text,
/// and must return a vector of exactly [`dims`](EmbeddingEncoder::dims)
/// values, including for the empty string.
#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn encode(&self, text: &str) -> Result<Embedding>;
}

/// Fail unless `vector` has exactly `dims` components.
pub fn check_dims(vector: &[f32], dims: usize) -> Result<()> {
    if vector.len() != dims {
        bail!(
            "embedding dimension mismatch: expected {}, got {}",
            dims,
            vector.len()
        );
    }
    Ok(())
}

/// Scale `vector` to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero vectors.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

// ============ Hashing Encoder ============

/// Model-free encoder using signed feature hashing over word tokens.
///
/// Each lowercased alphanumeric token is hashed with SHA-256; the digest
/// picks a bucket and a sign. The bucket counts are L2-normalized, so
/// texts sharing vocabulary score high under cosine similarity. Useful in
/// tests and in deployments where downloading a model is not an option.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dims: usize,
}

impl HashingEncoder {
    /// Model identifier reported by [`EmbeddingEncoder::model_name`].
    pub const MODEL_NAME: &'static str = "feature-hash-v1";

    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("hashing encoder requires dims > 0");
        }
        Ok(Self { dims })
    }

    /// Synchronous form of [`EmbeddingEncoder::encode`]; never fails.
    pub fn encode_sync(&self, text: &str) -> Embedding {
        let mut out = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            out[bucket] += sign;
        }
        l2_normalize(&mut out);
        out
    }
}

#[async_trait]
impl EmbeddingEncoder for HashingEncoder {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Embedding> {
        Ok(self.encode_sync(text))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
