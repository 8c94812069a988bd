//! Language model integration using Ollama

pub mod manager;

use crate::config::LlmConfig;
use crate::error::{GenerationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Message role in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Response from text generation
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Embedding response
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
}

/// Trait for language model operations
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate text from a conversation, bounded to `max_tokens` output
    /// tokens and sampled at `temperature`.
    async fn generate(&self, messages: &[Message], max_tokens: u32, temperature: f32) -> Result<GenerationResponse>;

    /// Generate embeddings for text
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Check if model is available
    async fn is_model_available(&self, model: &str) -> Result<bool>;
}

/// Ollama client implementation
pub struct OllamaClient {
    client: reqwest::Client,
    config: LlmConfig,
}

/// Ollama API request for generation
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

/// Ollama API options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

/// Ollama API response for generation
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    model: String,
    message: Message,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    created_at: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    total_duration: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    load_duration: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    prompt_eval_duration: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    eval_duration: Option<u64>,
}

/// Ollama API request for embeddings
#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    prompt: String,
}

/// Ollama API response for embeddings
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelInfo {
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    size: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    digest: Option<String>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Get the base URL for API calls
    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/{}",
            self.config.ollama_url.trim_end_matches('/'),
            endpoint
        )
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, messages: &[Message], max_tokens: u32, temperature: f32) -> Result<GenerationResponse> {
        debug!("Generating text with {} messages", messages.len());

        let request = OllamaGenerateRequest {
            model: self.config.text_model.clone(),
            messages: messages.to_vec(),
            stream: false,
            options: OllamaOptions {
                num_predict: max_tokens,
                temperature,
            },
        };

        let url = self.api_url("chat");
        debug!("Making request to: {}", url);

        let response = timeout(
            Duration::from_secs(self.config.call_timeout_secs),
            self.client.post(&url).json(&request).send(),
        )
        .await
        .map_err(|_| GenerationError::Timeout)?
        .map_err(|e| GenerationError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Ollama API error: {}", error_text);
            return Err(GenerationError::GenerationFailed(error_text).into());
        }

        let ollama_response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if !ollama_response.done {
            return Err(GenerationError::InvalidResponse("incomplete response".to_string()).into());
        }

        info!(
            "Generated {} tokens",
            ollama_response.eval_count.unwrap_or(0)
        );

        let response_text = ollama_response.message.content.clone();

        Ok(GenerationResponse {
            text: response_text,
            tokens_used: ollama_response.eval_count,
            model: ollama_response.model,
            finish_reason: ollama_response.done_reason,
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        debug!("Generating embedding for text of length {}", text.len());

        let request = OllamaEmbedRequest {
            model: self.config.embedding_model.clone(),
            prompt: text.to_string(),
        };

        let url = self.api_url("embeddings");
        debug!("Making embedding request to: {}", url);

        let response = timeout(
            Duration::from_secs(self.config.call_timeout_secs),
            self.client.post(&url).json(&request).send(),
        )
        .await
        .map_err(|_| GenerationError::Timeout)?
        .map_err(|e| GenerationError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Ollama embedding API error: {}", error_text);
            return Err(GenerationError::EmbeddingFailed(error_text).into());
        }

        let ollama_response: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        info!(
            "Generated embedding with dimension {}",
            ollama_response.embedding.len()
        );

        Ok(EmbeddingResponse {
            embedding: ollama_response.embedding,
            model: self.config.embedding_model.clone(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        debug!("Listing available models");

        let url = self.api_url("tags");

        let response = timeout(
            Duration::from_secs(self.config.call_timeout_secs),
            self.client.get(&url).send(),
        )
        .await
        .map_err(|_| GenerationError::Timeout)?
        .map_err(|e| GenerationError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::GenerationFailed(error_text).into());
        }

        let models_response: OllamaModelsResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let models: Vec<String> = models_response.models.into_iter().map(|m| m.name).collect();

        info!("Found {} models", models.len());
        Ok(models)
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == model))
    }
}

/// Deterministic, network-free fallback. Named `"mock"` in
/// `LlmConfig::provider_order`, it's what keeps the pipeline answerable (with
/// an honest, low-value response) when no real provider is reachable, rather
/// than requiring one to be configured before anything works end to end.
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, messages: &[Message], _max_tokens: u32, _temperature: f32) -> Result<GenerationResponse> {
        let evidence_count = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.matches("\n[").count() + usize::from(m.content.starts_with('[')))
            .sum::<usize>();
        Ok(GenerationResponse {
            text: format!(
                "No language model is configured; this is a placeholder answer referencing {evidence_count} evidence item(s)."
            ),
            tokens_used: None,
            model: "mock".to_string(),
            finish_reason: Some("mock".to_string()),
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let mut embedding = vec![0.0f32; 32];
        for (i, byte) in text.bytes().enumerate() {
            embedding[i % 32] += byte as f32;
        }
        Ok(EmbeddingResponse {
            embedding,
            model: "mock".to_string(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["mock".to_string()])
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        Ok(model == "mock")
    }
}

/// Builds the configured provider chain: `OllamaClient` (or another real
/// provider, once wired) as primary, `MockLlmClient` tacked on as the final
/// fallback whenever `"mock"` appears in `provider_order`.
pub fn build_provider_chain(config: &LlmConfig) -> std::sync::Arc<dyn LlmClient> {
    let mut providers = config.provider_order.iter();
    let Some(first) = providers.next() else {
        return std::sync::Arc::new(MockLlmClient);
    };

    let mut manager = match first.as_str() {
        "mock" => return std::sync::Arc::new(MockLlmClient),
        _ => manager::ProviderManager::new_ollama(config.clone()),
    };

    for name in providers {
        if name == "mock" {
            manager = manager.with_fallback(std::sync::Arc::new(MockLlmClient));
        }
    }

    std::sync::Arc::new(manager)
}

/// Helper function to create a system message
pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

/// Helper function to create a user message
pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

/// Helper function to create an assistant message
pub fn assistant_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::Assistant,
        content: content.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{
        automock,
        predicate::{self, *},
    };

    #[automock]
    #[async_trait]
    #[allow(dead_code)]
    pub trait MockLlmClient: Send + Sync {
        async fn generate(&self, messages: &[Message], max_tokens: u32, temperature: f32) -> Result<GenerationResponse>;
        async fn embed(&self, text: &str) -> Result<EmbeddingResponse>;
        async fn list_models(&self) -> Result<Vec<String>>;
        async fn is_model_available(&self, model: &str) -> Result<bool>;
    }

    #[test]
    fn test_message_creation() {
        let system_msg = system_message("You are a helpful assistant");
        assert_eq!(system_msg.role, Role::System);
        assert_eq!(system_msg.content, "You are a helpful assistant");

        let user_msg = user_message("Hello");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = assistant_message("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);
        assert_eq!(assistant_msg.content, "Hi there!");
    }

    #[test]
    fn test_ollama_client_creation() {
        let config = LlmConfig::default();
        let client = OllamaClient::new(config);
        assert_eq!(client.config.text_model, "llama3.2");
    }

    #[test]
    fn test_api_url_generation() {
        let config = LlmConfig::default();
        let client = OllamaClient::new(config);

        assert_eq!(client.api_url("chat"), "http://localhost:11434/api/chat");
        assert_eq!(
            client.api_url("embeddings"),
            "http://localhost:11434/api/embeddings"
        );
    }

    #[tokio::test]
    async fn test_mock_llm_client_always_answers() {
        let client = MockLlmClient;
        let response = client
            .generate(&[user_message("anything")], 600, 0.4)
            .await
            .unwrap();
        assert!(!response.text.is_empty());
    }

    #[test]
    fn test_build_provider_chain_mock_only() {
        let config = LlmConfig {
            provider_order: vec!["mock".to_string()],
            ..LlmConfig::default()
        };
        let _client = build_provider_chain(&config);
    }

    #[tokio::test]
    async fn test_mock_llm_client() {
        let mut mock_client = MockMockLlmClient::new();

        mock_client
            .expect_generate()
            .with(predicate::always(), predicate::always(), predicate::always())
            .times(1)
            .returning(|_, _, _| {
                Ok(GenerationResponse {
                    text: "Hello! How can I help you?".to_string(),
                    tokens_used: Some(10),
                    model: "test-model".to_string(),
                    finish_reason: Some("stop".to_string()),
                })
            });

        let messages = vec![user_message("Hello")];
        let response = mock_client.generate(&messages, 600, 0.4).await.unwrap();

        assert_eq!(response.text, "Hello! How can I help you?");
        assert_eq!(response.tokens_used, Some(10));
    }
}
