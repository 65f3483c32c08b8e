//! # Jarvis
//!
//! A retrieval-augmented personal assistant. Documents are embedded into a
//! vector store; each question retrieves the closest snippets, which are
//! handed to a local (Ollama) or cloud (OpenAI) language model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌──────────────┐
//! │ CLI/HTTP │──▶│  RagPipeline   │──▶│ Generation   │
//! │ (jarvis) │   │ retrieve+build │   │ Ollama|OpenAI│
//! └──────────┘   └───────┬────────┘   └──────────────┘
//!                        ▼
//!                ┌────────────────┐
//!                │ KnowledgeStore │
//!                │ Pinecone|memory│
//!                └────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`embedding`] | Encoder selection and the fastembed encoder |
//! | [`pinecone`] | Pinecone REST index |
//! | [`knowledge`] | Knowledge store with degraded mode |
//! | [`generation`] | Backend routing and prompt building |
//! | [`pipeline`] | Request orchestration |
//! | [`server`] | HTTP endpoints |
//!
//! Pure logic (data model, hashing encoder, in-memory index, context
//! assembly) lives in the `jarvis-core` crate.

pub mod config;
pub mod embedding;
pub mod generation;
pub mod knowledge;
pub mod logging;
pub mod pinecone;
pub mod pipeline;
pub mod server;
