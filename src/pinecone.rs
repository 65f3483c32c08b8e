//! Pinecone-backed [`VectorIndex`].
//!
//! Talks to the Pinecone REST API with `reqwest`:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | list indexes | `GET {controller}/indexes` |
//! | create index | `POST {controller}/indexes` |
//! | describe index | `GET {controller}/indexes/{name}` |
//! | upsert | `POST {host}/vectors/upsert` |
//! | query | `POST {host}/query` |
//! | count | `POST {host}/describe_index_stats` |
//!
//! [`PineconeIndex::connect`] resolves the data-plane host once at startup,
//! creating a serverless cosine index of the encoder's dimensionality when
//! none exists.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use jarvis_core::embedding::check_dims;
use jarvis_core::index::{IndexMatch, VectorIndex};
use jarvis_core::models::{Metadata, StoreEntry};

use crate::config::StoreConfig;

const API_VERSION: &str = "2024-07";

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    dimension: usize,
    #[serde(default)]
    host: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

/// A connected Pinecone index.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: String,
    host: String,
    dims: usize,
}

impl PineconeIndex {
    /// Connect to (or create) the configured index.
    ///
    /// # Errors
    ///
    /// Fails when the control plane is unreachable, rejects the key, or the
    /// existing index has a dimensionality other than `dims`.
    pub async fn connect(config: &StoreConfig, api_key: &str, dims: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let controller = config.controller_url.trim_end_matches('/');

        let resp = client
            .get(format!("{}/indexes", controller))
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .context("Pinecone connection failed")?;
        let list: IndexList = json_or_bail(resp, "list indexes").await?;

        let description = match list.indexes.into_iter().find(|i| i.name == config.index_name) {
            Some(existing) => {
                tracing::info!(index = %config.index_name, "using existing Pinecone index");
                existing
            }
            None => {
                tracing::info!(index = %config.index_name, dims, "creating Pinecone index");
                let body = serde_json::json!({
                    "name": config.index_name,
                    "dimension": dims,
                    "metric": "cosine",
                    "spec": {
                        "serverless": {
                            "cloud": config.cloud,
                            "region": config.region,
                        }
                    }
                });
                let resp = client
                    .post(format!("{}/indexes", controller))
                    .header("Api-Key", api_key)
                    .header("X-Pinecone-API-Version", API_VERSION)
                    .json(&body)
                    .send()
                    .await?;
                let created: IndexDescription = json_or_bail(resp, "create index").await?;
                if created.host.is_empty() {
                    let resp = client
                        .get(format!("{}/indexes/{}", controller, config.index_name))
                        .header("Api-Key", api_key)
                        .header("X-Pinecone-API-Version", API_VERSION)
                        .send()
                        .await?;
                    json_or_bail(resp, "describe index").await?
                } else {
                    created
                }
            }
        };

        if description.dimension != dims {
            bail!(
                "Pinecone index '{}' has dimension {}, but the encoder produces {}",
                description.name,
                description.dimension,
                dims
            );
        }
        if description.host.is_empty() {
            bail!("Pinecone index '{}' has no host yet", description.name);
        }

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            index_name: description.name,
            host: normalize_host(&description.host),
            dims,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entry: StoreEntry) -> Result<()> {
        check_dims(&entry.embedding, self.dims)?;
        let body = serde_json::json!({
            "vectors": [{
                "id": entry.id,
                "values": entry.embedding,
                "metadata": entry.metadata,
            }]
        });
        let resp = self.post("/vectors/upsert").json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            bail!("Pinecone upsert error {}: {}", status, body_text);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        check_dims(vector, self.dims)?;
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let resp = self.post("/query").json(&body).send().await?;
        let parsed: QueryResponse = json_or_bail(resp, "query").await?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                metadata: flatten_metadata(m.metadata),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let resp = self
            .post("/describe_index_stats")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let stats: IndexStats = json_or_bail(resp, "describe index stats").await?;
        Ok(stats.total_vector_count)
    }
}

/// Decode a successful JSON response, or turn an error status into an error.
async fn json_or_bail<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    what: &str,
) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        bail!("Pinecone {} error {}: {}", what, status, body_text);
    }
    resp.json::<T>()
        .await
        .map_err(|e| anyhow!("Invalid Pinecone {} response: {}", what, e))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Pinecone metadata values may be numbers, booleans, or lists; keep strings
/// as-is and render everything else as JSON text.
fn flatten_metadata(raw: serde_json::Map<String, serde_json::Value>) -> Metadata {
    raw.into_iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, value)
        })
        .collect()
}
