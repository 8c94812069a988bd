//! Durable chunk storage with brute-force cosine similarity search.

mod sqlite;

pub use sqlite::SqliteChunkStore;

use crate::chunk::{Chunk, Modality};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// A single scored hit from `VectorStore::search`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// An optional filter applied over chunk metadata/fields during search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub modality: Option<crate::chunk::Modality>,
    pub source_file: Option<String>,
}

/// Contract every backing store for chunks must satisfy. A single
/// implementation (`SqliteChunkStore`) ships today; the trait exists so
/// tests and future backends can substitute another store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Adds a chunk. Rejects chunks without an embedding and duplicate ids.
    async fn add(&self, chunk: Chunk) -> Result<()>;

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>>;

    async fn delete(&self, chunk_id: &str) -> Result<()>;

    /// Deletes every chunk belonging to `source_file`.
    async fn delete_source(&self, source_file: &str) -> Result<usize>;

    async fn reset(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Chunk count broken down by modality, for reporting via `stats()`.
    async fn count_by_modality(&self) -> Result<HashMap<Modality, usize>>;
}
