//! The facade this engine exposes to whatever process embeds it: ingest,
//! query, reset, stats, and the set of languages answers can come back in.

use crate::cache::ResponseCache;
use crate::chunk::Modality;
use crate::config::CoreConfig;
use crate::embedding::{EmbeddingManager, LlmEmbeddingBackend};
use crate::error::{CoreError, Result};
use crate::language::{LanguageService, LlmTranslationProvider};
use crate::llm::{build_provider_chain, LlmClient};
use crate::orchestrator::{IngestionOrchestrator, QueryOrchestrator, QueryRequest as OrchestratorRequest};
use crate::reasoning::ReasoningChain;
use crate::store::{SqliteChunkStore, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::chunk::SourceReference;
pub use crate::orchestrator::{ConflictSummary, IngestReport};

/// A query against the engine, as received from the embedding process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_true")]
    pub enable_auto_translate: bool,
    #[serde(default)]
    pub target_language: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub debate: bool,
    #[serde(default = "default_true")]
    pub include_reasoning_chain: bool,
}

fn default_persona() -> String {
    "standard".to_string()
}
fn default_top_k() -> usize {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub confidence: String,
    pub confidence_score: f32,
    pub sources: Vec<SourceReference>,
    pub conflicts: Vec<ConflictSummary>,
    pub refusal_reason: Option<String>,
    pub translation_info: TranslationInfo,
    pub reasoning_chain: Option<ReasoningChain>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationInfo {
    pub detected_language: String,
    pub response_translated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_chunks: usize,
    pub per_modality_counts: HashMap<Modality, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedLanguage {
    pub code: String,
    pub name: String,
    pub flag: String,
}

/// Owns every long-lived component (store, embedding backend, language
/// service, LLM client, cache) and wires them into the two orchestrators.
/// One `Core` is built once at process startup and shared behind an `Arc`
/// by every caller.
pub struct Core {
    config: CoreConfig,
    store: Arc<dyn VectorStore>,
    language: Arc<LanguageService>,
    query_orchestrator: QueryOrchestrator,
    ingestion_orchestrator: IngestionOrchestrator,
}

impl Core {
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        let store: Arc<dyn VectorStore> = Arc::new(SqliteChunkStore::new(config.store.clone()));
        let llm: Arc<dyn LlmClient> = build_provider_chain(&config.llm);
        let embedding_backend = Arc::new(LlmEmbeddingBackend::new(llm.clone()));
        let embedding = Arc::new(EmbeddingManager::new(embedding_backend, config.embedding.clone()));
        let translation_provider = Arc::new(LlmTranslationProvider::new(llm.clone()));
        let language = Arc::new(LanguageService::new(translation_provider, config.translation.clone()));
        let cache = Arc::new(ResponseCache::new(config.cache.clone()).await.map_err(|e| CoreError::Config(e.to_string()))?);

        let query_orchestrator = QueryOrchestrator::new(
            config.clone(),
            store.clone(),
            embedding.clone(),
            language.clone(),
            llm,
            cache,
        );
        let ingestion_orchestrator = IngestionOrchestrator::new(config.clone(), store.clone(), embedding);

        info!(database_url = %config.store.database_url, "core engine initialized");

        Ok(Self {
            config,
            store,
            language,
            query_orchestrator,
            ingestion_orchestrator,
        })
    }

    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        self.ingestion_orchestrator.ingest(filename, bytes).await
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let start = std::time::Instant::now();

        let persona_tag = if request.debate {
            "debate".to_string()
        } else {
            request.persona.clone()
        };

        let deadline = Duration::from_millis(self.config.llm.deadline_ms);
        let cancel = CancellationToken::new();
        let cancel_for_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel_for_deadline.cancel();
        });

        let response = self
            .query_orchestrator
            .answer(
                OrchestratorRequest {
                    query: request.query.clone(),
                    persona: Some(persona_tag),
                    top_k: Some(request.top_k.min(20)),
                    target_language: request.target_language.clone(),
                },
                cancel,
            )
            .await?;

        let refusal_reason = if response.strategy == "Refuse" {
            Some(response.answer.clone())
        } else {
            None
        };

        let output_language = request.target_language.as_deref().unwrap_or(&response.detected_language);
        let response_translated = request.enable_auto_translate && output_language != crate::language::WORKING_LANGUAGE;

        Ok(QueryResponse {
            query: request.query,
            answer: response.answer,
            confidence: response.confidence_level,
            confidence_score: response.confidence,
            sources: response.sources,
            conflicts: response.conflicts,
            refusal_reason,
            translation_info: TranslationInfo {
                detected_language: response.detected_language,
                response_translated,
            },
            reasoning_chain: if request.include_reasoning_chain {
                Some(response.reasoning_chain)
            } else {
                None
            },
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            total_chunks: self.store.count().await?,
            per_modality_counts: self.store.count_by_modality().await?,
        })
    }

    pub fn supported_languages(&self) -> Vec<SupportedLanguage> {
        self.language
            .supported_languages()
            .into_iter()
            .map(|info| SupportedLanguage {
                code: info.code,
                name: info.name,
                flag: info.flag,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_core_boots_with_default_config_and_mock_llm() {
        let mut config = CoreConfig::default();
        config.llm.provider_order = vec!["mock".to_string()];
        config.store.database_url = "sqlite::memory:".to_string();
        config.cache.db_path = ":memory:".to_string();

        let core = Core::new(config).await.unwrap();
        let stats = core.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
    }

    #[tokio::test]
    async fn test_ingest_then_stats_reflects_new_chunk() {
        let mut config = CoreConfig::default();
        config.llm.provider_order = vec!["mock".to_string()];
        config.store.database_url = "sqlite::memory:".to_string();
        config.cache.db_path = ":memory:".to_string();
        config.embedding.vector_dim = 32;

        let core = Core::new(config).await.unwrap();
        core.ingest("notes.txt", b"Rust is a systems programming language.")
            .await
            .unwrap();

        let stats = core.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.per_modality_counts.get(&Modality::Text), Some(&1));
    }

    #[tokio::test]
    async fn test_reset_clears_corpus() {
        let mut config = CoreConfig::default();
        config.llm.provider_order = vec!["mock".to_string()];
        config.store.database_url = "sqlite::memory:".to_string();
        config.cache.db_path = ":memory:".to_string();
        config.embedding.vector_dim = 32;

        let core = Core::new(config).await.unwrap();
        core.ingest("notes.txt", b"Rust is a systems programming language.")
            .await
            .unwrap();
        core.reset().await.unwrap();

        let stats = core.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
    }

    #[tokio::test]
    async fn test_query_on_empty_corpus_refuses() {
        let mut config = CoreConfig::default();
        config.llm.provider_order = vec!["mock".to_string()];
        config.store.database_url = "sqlite::memory:".to_string();
        config.cache.db_path = ":memory:".to_string();

        let core = Core::new(config).await.unwrap();
        let response = core
            .query(QueryRequest {
                query: "what is the warranty period?".to_string(),
                persona: "standard".to_string(),
                enable_auto_translate: true,
                target_language: None,
                top_k: 5,
                debate: false,
                include_reasoning_chain: true,
            })
            .await
            .unwrap();

        assert!(response.refusal_reason.is_some());
        assert_eq!(response.confidence, "Low");
    }

    #[tokio::test]
    async fn test_supported_languages_includes_english_with_flag() {
        let mut config = CoreConfig::default();
        config.llm.provider_order = vec!["mock".to_string()];
        config.store.database_url = "sqlite::memory:".to_string();
        config.cache.db_path = ":memory:".to_string();

        let core = Core::new(config).await.unwrap();
        let languages = core.supported_languages();
        let english = languages.iter().find(|l| l.code == "eng").unwrap();
        assert_eq!(english.name, "English");
        assert!(!english.flag.is_empty());
    }
}
