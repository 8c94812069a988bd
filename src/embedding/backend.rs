//! Pluggable text-encoder backends.

use crate::error::{EmbeddingError, Result};
use crate::llm::LlmClient;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns text into a raw, backend-native-dimension embedding.
/// `EmbeddingManager` resizes the result to the shared `vector_dim`.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Delegates to any `LlmClient` (Ollama, a cloud provider, a fallback
/// chain) that already exposes `embed`.
pub struct LlmEmbeddingBackend {
    client: Arc<dyn LlmClient>,
}

impl LlmEmbeddingBackend {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmbeddingBackend for LlmEmbeddingBackend {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::BackendFailed("empty text".to_string()).into());
        }
        let response = self
            .client
            .embed(text)
            .await
            .map_err(|e| EmbeddingError::BackendFailed(e.to_string()))?;
        Ok(response.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EmbeddingResponse, GenerationResponse, Message};

    struct StubClient;

    #[async_trait]
    impl LlmClient for StubClient {
        async fn generate(&self, _messages: &[Message], _max_tokens: u32, _temperature: f32) -> Result<GenerationResponse> {
            unimplemented!()
        }

        async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
            Ok(EmbeddingResponse {
                embedding: vec![1.0; text.len().min(8)],
                model: "stub".to_string(),
            })
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn is_model_available(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_text() {
        let backend = LlmEmbeddingBackend::new(Arc::new(StubClient));
        assert!(backend.embed_text("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_delegates_to_llm_client() {
        let backend = LlmEmbeddingBackend::new(Arc::new(StubClient));
        let embedding = backend.embed_text("hello").await.unwrap();
        assert_eq!(embedding.len(), 5);
    }
}
