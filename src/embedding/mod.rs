//! Projects chunk content into the shared embedding space.

mod backend;
mod projection;

pub use backend::{EmbeddingBackend, LlmEmbeddingBackend};
pub use projection::visual_descriptor;

use crate::chunk::{Chunk, Modality};
use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, Result};
use std::sync::Arc;
use tracing::debug;

/// Turns chunk content into a fixed-dimension `Vec<f32>` embedding.
///
/// Text (and OCR'd/transcribed content, which is stored as TEXT chunks) goes
/// through `backend`. IMAGE chunks without enough OCR text instead get a
/// deterministic visual projection, so every chunk ends up in the same
/// `vector_dim`-wide space regardless of modality.
pub struct EmbeddingManager {
    backend: Arc<dyn EmbeddingBackend>,
    config: EmbeddingConfig,
}

impl EmbeddingManager {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: EmbeddingConfig) -> Self {
        Self { backend, config }
    }

    /// Computes the embedding a chunk would get, without mutating it.
    async fn compute_embedding(&self, chunk: &Chunk, image_bytes: Option<&[u8]>) -> Result<Vec<f32>> {
        let raw = match (chunk.modality, image_bytes) {
            (Modality::Image, Some(bytes)) if chunk.content.chars().count() < self.config.min_ocr_chars_for_text_embedding => {
                projection::visual_descriptor(bytes, self.config.vector_dim)
            }
            _ => {
                let vec = self.backend.embed_text(&chunk.content).await?;
                resize(&vec, self.config.vector_dim)
            }
        };

        if raw.len() != self.config.vector_dim {
            return Err(EmbeddingError::InvalidDimension {
                expected: self.config.vector_dim,
                actual: raw.len(),
            }
            .into());
        }

        Ok(raw)
    }

    /// Embeds a single chunk in place, setting `chunk.embedding`.
    pub async fn embed_chunk(&self, chunk: &mut Chunk, image_bytes: Option<&[u8]>) -> Result<()> {
        let raw = self.compute_embedding(chunk, image_bytes).await?;
        chunk.embedding = Some(raw);
        Ok(())
    }

    /// Embeds a batch of chunks. A failure on any chunk raises
    /// `EmbeddingError::BatchAborted` without mutating any chunk in the
    /// batch: every embedding is computed into a scratch buffer first, and
    /// only written back once every chunk has succeeded.
    pub async fn embed_batch(&self, chunks: &mut [Chunk]) -> Result<()> {
        let total = chunks.len();
        let mut computed = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            match self.compute_embedding(chunk, None).await {
                Ok(raw) => computed.push(raw),
                Err(e) => {
                    return Err(EmbeddingError::BatchAborted {
                        completed: i,
                        total,
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }

        for (chunk, raw) in chunks.iter_mut().zip(computed) {
            chunk.embedding = Some(raw);
        }
        debug!(count = total, "embedded batch");
        Ok(())
    }

    /// Embeds a free-text query against the same space as stored chunks.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vec = self.backend.embed_text(text).await?;
        Ok(resize(&vec, self.config.vector_dim))
    }
}

/// Truncates or zero-pads a backend's native-dimension embedding to `dim`.
/// Backends rarely emit exactly `vector_dim` (an Ollama model might return
/// 4096-wide vectors); this keeps every chunk comparable regardless of which
/// backend embedded it.
fn resize(vec: &[f32], dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dim];
    let n = vec.len().min(dim);
    out[..n].copy_from_slice(&vec[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceType;
    use async_trait::async_trait;

    struct FixedBackend;

    #[async_trait]
    impl EmbeddingBackend for FixedBackend {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32; 10])
        }
    }

    #[tokio::test]
    async fn test_embed_chunk_resizes_to_configured_dim() {
        let manager = EmbeddingManager::new(
            Arc::new(FixedBackend),
            EmbeddingConfig {
                vector_dim: 16,
                ..EmbeddingConfig::default()
            },
        );
        let mut chunk = Chunk::new(Modality::Text, "hello", "f.txt", SourceType::UploadedText);
        manager.embed_chunk(&mut chunk, None).await.unwrap();
        assert_eq!(chunk.embedding.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_image_without_ocr_text_uses_visual_projection() {
        let manager = EmbeddingManager::new(
            Arc::new(FixedBackend),
            EmbeddingConfig {
                vector_dim: 16,
                ..EmbeddingConfig::default()
            },
        );
        let mut chunk = Chunk::new(Modality::Image, "", "f.png", SourceType::UploadedImage);
        manager.embed_chunk(&mut chunk, Some(b"fake-bytes")).await.unwrap();
        assert_eq!(chunk.embedding.unwrap().len(), 16);
    }

    struct FailsOnThirdBackend;

    #[async_trait]
    impl EmbeddingBackend for FailsOnThirdBackend {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            if text == "third" {
                return Err(EmbeddingError::BackendFailed("boom".to_string()).into());
            }
            Ok(vec![text.len() as f32; 10])
        }
    }

    #[tokio::test]
    async fn test_embed_batch_failure_mutates_no_chunk() {
        let manager = EmbeddingManager::new(
            Arc::new(FailsOnThirdBackend),
            EmbeddingConfig {
                vector_dim: 10,
                ..EmbeddingConfig::default()
            },
        );
        let mut chunks = vec![
            Chunk::new(Modality::Text, "first", "f.txt", SourceType::UploadedText),
            Chunk::new(Modality::Text, "second", "f.txt", SourceType::UploadedText),
            Chunk::new(Modality::Text, "third", "f.txt", SourceType::UploadedText),
        ];

        let err = manager.embed_batch(&mut chunks).await.unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Embedding(_)));
        assert!(chunks.iter().all(|c| c.embedding.is_none()));
    }
}
