//! # Jarvis Core
//!
//! Shared, I/O-free logic for Jarvis: the document data model, the
//! embedding encoder trait, the vector index abstraction, and context
//! assembly.
//!
//! This crate contains no tokio, HTTP client, or model runtime
//! dependencies. Concrete encoders backed by model runtimes and remote
//! vector indexes live in the `jarvis-rag` app crate.

pub mod context;
pub mod embedding;
pub mod index;
pub mod models;
