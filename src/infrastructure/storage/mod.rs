//! Storage adapters for EDITH.
//!
//! Exposes the embedded sled-backed vector index used for retrieval.

pub mod sled_store;

pub use sled_store::{cosine_similarity, SledVectorStore};
