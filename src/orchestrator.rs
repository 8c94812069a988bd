//! Drives the query pipeline end to end, and the symmetric ingest-time
//! pipeline that feeds it.

use crate::cache::ResponseCache;
use crate::chunk::{meta_keys, Modality, SourceReference, SourceType};
use crate::confidence::{self, ConfidenceBreakdown, ConfidenceLevel};
use crate::conflict::{self};
use crate::config::CoreConfig;
use crate::embedding::EmbeddingManager;
use crate::error::{CancellationError, CoreError, Result};
use crate::language::LanguageService;
use crate::llm::{system_message, user_message, LlmClient, Message};
use crate::processors::ProcessorRegistry;
use crate::query_analysis::{self, AnalyzedQuery, Persona};
use crate::reasoning::{FinalDecision, ReasoningChain, ReasoningChainRecorder, StepStatus, StepType};
use crate::retrieval::{CrossModalRetriever, RetrievedChunk};
use crate::store::VectorStore;
use crate::strategy::{self, ResponseStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A query as handed to the orchestrator by the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub persona: Option<String>,
    pub top_k: Option<usize>,
    /// If set, the answer is emitted in this language regardless of what
    /// was detected on the incoming query.
    pub target_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub description: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub strategy: String,
    pub confidence: f32,
    pub confidence_level: String,
    pub sources: Vec<SourceReference>,
    pub conflicts: Vec<ConflictSummary>,
    pub reasoning_chain: ReasoningChain,
    pub detected_language: String,
}

/// Drives a single query through Received -> ... -> Responded|Failed.
pub struct QueryOrchestrator {
    config: CoreConfig,
    retriever: CrossModalRetriever,
    language: Arc<LanguageService>,
    llm: Arc<dyn LlmClient>,
    cache: Arc<ResponseCache>,
}

impl QueryOrchestrator {
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn VectorStore>,
        embedding: Arc<EmbeddingManager>,
        language: Arc<LanguageService>,
        llm: Arc<dyn LlmClient>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let retriever = CrossModalRetriever::new(store, embedding, config.retrieval.clone());
        Self {
            config,
            retriever,
            language,
            llm,
            cache,
        }
    }

    pub async fn answer(&self, request: QueryRequest, cancel: CancellationToken) -> Result<QueryResponse> {
        let mut recorder = ReasoningChainRecorder::new(request.query.clone());

        if request.query.trim().chars().count() <= 2 {
            recorder.record(
                StepType::QueryAnalysis,
                "Analyze query",
                "query too short to search for relevant evidence".to_string(),
                HashMap::new(),
                vec![],
                0,
                StepStatus::Warning,
            );
            let chain = recorder.finish(FinalDecision::Refused);
            return Ok(QueryResponse {
                answer: "The query is too short to search for relevant evidence. Please ask a more complete question."
                    .to_string(),
                strategy: format!("{:?}", ResponseStrategy::Refuse),
                confidence: 0.0,
                confidence_level: format!("{:?}", ConfidenceLevel::Low),
                sources: vec![],
                conflicts: vec![],
                reasoning_chain: chain,
                detected_language: crate::language::WORKING_LANGUAGE.to_string(),
            });
        }

        let (translated_query, detected_language) = self.language.ingest_query(&request.query).await;
        check_cancelled(&cancel)?;

        let analyzed = self.analyze_step(&mut recorder, &translated_query, request.persona.as_deref());
        check_cancelled(&cancel)?;

        let resolved_top_k = request.top_k.unwrap_or(self.config.retrieval.default_top_k);
        let retrieved = self.retrieve_step(&mut recorder, &analyzed, request.top_k).await?;
        check_cancelled(&cancel)?;

        let breakdown = self.confidence_step(&mut recorder, &retrieved, resolved_top_k);
        let conflicts = self.conflict_step(&mut recorder, &retrieved).await;
        let response_strategy = self.strategy_step(&mut recorder, breakdown.level, &conflicts, analyzed.persona);
        check_cancelled(&cancel)?;

        let (answer_en, final_decision) = self
            .generation_step(&mut recorder, &analyzed, response_strategy, &retrieved, &breakdown, &translated_query)
            .await;

        let output_language = request.target_language.clone().unwrap_or_else(|| detected_language.clone());
        let answer = self.language.emit_answer(&answer_en, &output_language).await;

        let sources: Vec<SourceReference> = retrieved
            .iter()
            .map(|r| SourceReference::from_chunk(&r.chunk, r.relevance_score))
            .collect();
        let conflict_summaries = conflicts
            .iter()
            .map(|c| ConflictSummary {
                description: c.description.clone(),
                severity: format!("{:?}", c.severity),
            })
            .collect();

        let chain = recorder.finish(final_decision);

        Ok(QueryResponse {
            answer,
            strategy: format!("{:?}", response_strategy),
            confidence: breakdown.score,
            confidence_level: format!("{:?}", breakdown.level),
            sources,
            conflicts: conflict_summaries,
            reasoning_chain: chain,
            detected_language,
        })
    }

    fn analyze_step(
        &self,
        recorder: &mut ReasoningChainRecorder,
        query: &str,
        persona_tag: Option<&str>,
    ) -> AnalyzedQuery {
        let start = Instant::now();
        let analyzed = query_analysis::analyze(query, persona_tag);
        let details = HashMap::from([
            ("keywords".to_string(), analyzed.keywords.join(", ")),
            ("persona".to_string(), format!("{:?}", analyzed.persona)),
        ]);
        recorder.record(
            StepType::QueryAnalysis,
            "Analyze query",
            format!("classified {} intent(s)", analyzed.intents.len()),
            details,
            vec![],
            start.elapsed().as_millis() as u64,
            StepStatus::Completed,
        );
        analyzed
    }

    async fn retrieve_step(
        &self,
        recorder: &mut ReasoningChainRecorder,
        analyzed: &AnalyzedQuery,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();
        match self.retriever.retrieve(analyzed, top_k).await {
            Ok(chunks) => {
                let sources = chunks
                    .iter()
                    .map(|r| SourceReference::from_chunk(&r.chunk, r.relevance_score))
                    .collect();
                recorder.record(
                    StepType::Retrieval,
                    "Retrieve evidence",
                    format!("retrieved {} chunk(s)", chunks.len()),
                    HashMap::new(),
                    sources,
                    start.elapsed().as_millis() as u64,
                    StepStatus::Completed,
                );
                Ok(chunks)
            }
            Err(e) => {
                recorder.record(
                    StepType::Retrieval,
                    "Retrieve evidence",
                    format!("retrieval failed: {e}"),
                    HashMap::new(),
                    vec![],
                    start.elapsed().as_millis() as u64,
                    StepStatus::Error,
                );
                Err(e)
            }
        }
    }

    fn confidence_step(
        &self,
        recorder: &mut ReasoningChainRecorder,
        retrieved: &[RetrievedChunk],
        top_k: usize,
    ) -> ConfidenceBreakdown {
        let start = Instant::now();
        let breakdown = confidence::score(retrieved, top_k);
        let details = HashMap::from([
            ("relevance".to_string(), format!("{:.2}", breakdown.relevance)),
            ("source_quality".to_string(), format!("{:.2}", breakdown.source_quality)),
            ("diversity".to_string(), format!("{:.2}", breakdown.diversity)),
            ("cross_modal_bonus".to_string(), format!("{:.2}", breakdown.cross_modal_bonus)),
        ]);
        recorder.record(
            StepType::ConfidenceAssessment,
            "Assess confidence",
            format!("{:?} confidence ({:.2})", breakdown.level, breakdown.score),
            details,
            vec![],
            start.elapsed().as_millis() as u64,
            StepStatus::Completed,
        );
        breakdown
    }

    async fn conflict_step(&self, recorder: &mut ReasoningChainRecorder, retrieved: &[RetrievedChunk]) -> Vec<crate::conflict::Conflict> {
        let start = Instant::now();
        let conflicts = conflict::detect(retrieved, self.retriever.embedding_manager()).await;
        let status = if conflicts.is_empty() {
            StepStatus::Completed
        } else {
            StepStatus::Warning
        };
        recorder.record(
            StepType::ConflictDetection,
            "Detect conflicts",
            format!("{} conflict(s) found", conflicts.len()),
            HashMap::new(),
            vec![],
            start.elapsed().as_millis() as u64,
            status,
        );
        conflicts
    }

    fn strategy_step(
        &self,
        recorder: &mut ReasoningChainRecorder,
        level: crate::confidence::ConfidenceLevel,
        conflicts: &[crate::conflict::Conflict],
        persona: Persona,
    ) -> ResponseStrategy {
        let start = Instant::now();
        let chosen = strategy::choose(level, conflicts, persona);
        recorder.record(
            StepType::ResponseStrategy,
            "Choose response strategy",
            format!("{chosen:?}"),
            HashMap::new(),
            vec![],
            start.elapsed().as_millis() as u64,
            StepStatus::Completed,
        );
        chosen
    }

    async fn generation_step(
        &self,
        recorder: &mut ReasoningChainRecorder,
        analyzed: &AnalyzedQuery,
        response_strategy: ResponseStrategy,
        retrieved: &[RetrievedChunk],
        breakdown: &ConfidenceBreakdown,
        query: &str,
    ) -> (String, FinalDecision) {
        if response_strategy == ResponseStrategy::Refuse {
            recorder.record(
                StepType::Generation,
                "Generate",
                "skipped: no usable evidence".to_string(),
                HashMap::new(),
                vec![],
                0,
                StepStatus::Warning,
            );
            return (refusal_message(breakdown), FinalDecision::Refused);
        }

        let sources: Vec<SourceReference> = retrieved
            .iter()
            .map(|r| SourceReference::from_chunk(&r.chunk, r.relevance_score))
            .collect();
        let evidence_ids: Vec<String> = retrieved.iter().map(|r| r.chunk.id.clone()).collect();
        let strategy_key = format!("{response_strategy:?}");
        let persona_key = format!("{:?}", analyzed.persona);
        let cache_key = ResponseCache::compute_cache_key(query, &persona_key, &strategy_key, &evidence_ids);

        if let Ok(Some(cached)) = self.cache.get(&cache_key).await {
            recorder.record(
                StepType::Generation,
                "Generate",
                "served from cache".to_string(),
                HashMap::new(),
                sources,
                0,
                StepStatus::Completed,
            );
            return (cached, decision_for(response_strategy));
        }

        let start = Instant::now();
        let messages = build_prompt(analyzed, response_strategy, retrieved);
        let (max_tokens, temperature) = analyzed.persona.generation_params();
        let deadline = Duration::from_millis(self.config.llm.deadline_ms);
        let generation = tokio::time::timeout(deadline, self.llm.generate(&messages, max_tokens, temperature)).await;

        match generation {
            Ok(Ok(response)) => {
                recorder.record(
                    StepType::Generation,
                    "Generate",
                    "generated an answer".to_string(),
                    HashMap::new(),
                    sources,
                    start.elapsed().as_millis() as u64,
                    StepStatus::Completed,
                );
                let _ = self.cache.set(cache_key, response.text.clone(), &strategy_key).await;
                (response.text, decision_for(response_strategy))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "generation failed, degrading to refusal");
                recorder.record(
                    StepType::Generation,
                    "Generate",
                    format!("generation failed: {e}"),
                    HashMap::new(),
                    sources,
                    start.elapsed().as_millis() as u64,
                    StepStatus::Error,
                );
                (refusal_message_for_outage(), FinalDecision::Refused)
            }
            Err(_) => {
                warn!(deadline_ms = self.config.llm.deadline_ms, "generation deadline exceeded");
                recorder.record(
                    StepType::Generation,
                    "Generate",
                    "generation deadline exceeded".to_string(),
                    HashMap::new(),
                    sources,
                    deadline.as_millis() as u64,
                    StepStatus::Error,
                );
                (refusal_message_for_outage(), FinalDecision::Refused)
            }
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CancellationError::Requested.into());
    }
    Ok(())
}

fn decision_for(strategy: ResponseStrategy) -> FinalDecision {
    match strategy {
        ResponseStrategy::Answer => FinalDecision::Answered,
        ResponseStrategy::Caveated => FinalDecision::Caveated,
        ResponseStrategy::ConflictPresentation => FinalDecision::ConflictPresented,
        ResponseStrategy::Refuse => FinalDecision::Refused,
    }
}

fn persona_system_prompt(persona: Persona) -> &'static str {
    match persona {
        Persona::Standard => "Answer clearly and directly, citing the numbered evidence you are given.",
        Persona::Academic => {
            "Answer with academic rigor: precise terminology, qualified claims, citing evidence by number."
        }
        Persona::Executive => "Answer in two or three sentences, lead with the conclusion, citing evidence by number.",
        Persona::Eli5 => "Explain as you would to a curious ten-year-old, using simple words, citing evidence by number.",
        Persona::Technical => "Answer with technical precision and relevant specifics, citing evidence by number.",
        Persona::Debate => "Present the strongest case for each side found in the evidence, without declaring a winner.",
        Persona::Legal => "Answer with careful, qualified language appropriate to a legal context, citing evidence by number.",
        Persona::Medical => {
            "Answer with careful, qualified language appropriate to a medical context, citing evidence by number. This is not medical advice."
        }
        Persona::Creative => "Answer engagingly while staying grounded in the cited evidence.",
    }
}

fn strategy_instruction(strategy: ResponseStrategy) -> &'static str {
    match strategy {
        ResponseStrategy::Answer => "State the answer directly and confidently.",
        ResponseStrategy::Caveated => "Answer, but note the evidence is only moderately strong and hedge accordingly.",
        ResponseStrategy::ConflictPresentation => {
            "Present both sides of the conflicting evidence by source, without picking a winner."
        }
        ResponseStrategy::Refuse => "Decline to answer; state that the evidence is insufficient.",
    }
}

/// Deterministic for `(persona, strategy, chunks, query)`: persona template
/// plus strategy instruction as the system prompt, a numbered evidence list
/// (each chunk truncated to ~1200 chars) plus the question as the user
/// prompt, with an explicit don't-exceed-the-evidence instruction.
fn build_prompt(analyzed: &AnalyzedQuery, strategy: ResponseStrategy, chunks: &[RetrievedChunk]) -> Vec<Message> {
    let system = format!(
        "{} {} Never state anything not supported by the numbered evidence below.",
        persona_system_prompt(analyzed.persona),
        strategy_instruction(strategy),
    );

    let mut evidence = String::new();
    for (i, retrieved) in chunks.iter().enumerate() {
        let snippet: String = retrieved.chunk.content.chars().take(1200).collect();
        evidence.push_str(&format!(
            "[{}] source={} modality={} content={}\n",
            i + 1,
            retrieved.chunk.source_file,
            retrieved.chunk.modality,
            snippet
        ));
    }

    let user = format!(
        "Evidence:\n{evidence}\nQuestion: {}\n\nAnswer using only the evidence above, citing sources by their [n] number.",
        analyzed.query
    );

    vec![system_message(system), user_message(user)]
}

fn refusal_message(breakdown: &ConfidenceBreakdown) -> String {
    let mut message = "I don't have enough reliable evidence in the corpus to answer that confidently.".to_string();
    if let Some(tip) = breakdown.actionable_tips.first() {
        message.push(' ');
        message.push_str(tip);
    }
    message
}

fn refusal_message_for_outage() -> String {
    "I can't generate an answer right now because the language model is unavailable. Please try again shortly."
        .to_string()
}

/// Counts in-flight ingest work. Report fields for one `ingest()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub source_file: String,
    pub chunks_ingested: usize,
    pub chunks_skipped: usize,
    pub warnings: Vec<String>,
}

/// Drives file -> chunks -> embeddings -> stored, with backpressure.
///
/// The distilled spec names only the leaf `file -> processor -> chunks ->
/// embedder -> store` flow; this is the component that actually runs it end
/// to end, symmetric to `QueryOrchestrator` on the read side.
pub struct IngestionOrchestrator {
    config: CoreConfig,
    registry: ProcessorRegistry,
    embedding: Arc<EmbeddingManager>,
    store: Arc<dyn VectorStore>,
    in_flight: AtomicUsize,
    inference_limiter: Semaphore,
}

impl IngestionOrchestrator {
    pub fn new(config: CoreConfig, store: Arc<dyn VectorStore>, embedding: Arc<EmbeddingManager>) -> Self {
        let registry = ProcessorRegistry::new(&config);
        let inference_limiter = Semaphore::new(config.inference_concurrency.max(1));
        Self {
            registry,
            embedding,
            store,
            in_flight: AtomicUsize::new(0),
            inference_limiter,
            config,
        }
    }

    pub async fn ingest(&self, source_file: &str, bytes: &[u8]) -> Result<IngestReport> {
        if self.in_flight.load(Ordering::SeqCst) >= self.config.ingest_soft_limit {
            return Err(CoreError::Busy);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.ingest_inner(source_file, bytes).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn ingest_inner(&self, source_file: &str, bytes: &[u8]) -> Result<IngestReport> {
        let mut chunks = self.registry.process(source_file, bytes).await?;

        let mut warnings = Vec::new();
        let mut ingested = 0usize;
        let mut skipped = 0usize;

        for chunk in chunks.iter_mut() {
            if chunk.metadata.get(meta_keys::STATUS).and_then(|v| v.as_str()) == Some("failed") {
                skipped += 1;
                continue;
            }

            let permit = self
                .inference_limiter
                .acquire()
                .await
                .map_err(|_| CoreError::Config("inference semaphore closed".to_string()))?;

            // Raw bytes only exist for the standalone-upload case: a
            // PDF-embedded image's bytes never leave the PDF processor, so
            // those chunks always embed through the text backend instead.
            let image_bytes = if chunk.modality == Modality::Image && chunk.source_type == SourceType::UploadedImage {
                Some(bytes)
            } else {
                None
            };

            let embed_result = self.embedding.embed_chunk(chunk, image_bytes).await;
            drop(permit);

            if let Err(e) = embed_result {
                warn!(source_file, chunk_id = %chunk.id, error = %e, "failed to embed chunk, skipping");
                warnings.push(format!("chunk {} not embedded: {e}", chunk.id));
                skipped += 1;
                continue;
            }

            self.store.add(chunk.clone()).await?;
            ingested += 1;
        }

        info!(source_file, ingested, skipped, "ingest complete");

        Ok(IngestReport {
            source_file: source_file.to_string(),
            chunks_ingested: ingested,
            chunks_skipped: skipped,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCacheConfig;
    use crate::config::{EmbeddingConfig, StoreConfig, TranslationConfig};
    use crate::embedding::EmbeddingBackend;
    use crate::language::TranslationProvider;
    use crate::llm::{EmbeddingResponse, GenerationResponse};
    use crate::store::SqliteChunkStore;
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    struct ConstantBackend;

    #[async_trait]
    impl EmbeddingBackend for ConstantBackend {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 8])
        }
    }

    struct CannedLlm(&'static str);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn generate(&self, _messages: &[Message], _max_tokens: u32, _temperature: f32) -> Result<GenerationResponse> {
            Ok(GenerationResponse {
                text: self.0.to_string(),
                tokens_used: Some(10),
                model: "test".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            unimplemented!("not exercised by these tests")
        }
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn is_model_available(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _messages: &[Message], _max_tokens: u32, _temperature: f32) -> Result<GenerationResponse> {
            Err(crate::error::GenerationError::AllProvidersFailed.into())
        }
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            unimplemented!("not exercised by these tests")
        }
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn is_model_available(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct NoopTranslation;

    #[async_trait]
    impl TranslationProvider for NoopTranslation {
        async fn translate(&self, text: &str, _from: &str, _to: &str) -> Result<String> {
            Ok(text.to_string())
        }
    }

    fn test_config() -> CoreConfig {
        CoreConfig {
            embedding: EmbeddingConfig {
                vector_dim: 8,
                ..EmbeddingConfig::default()
            },
            ..CoreConfig::default()
        }
    }

    fn test_store() -> Arc<dyn VectorStore> {
        Arc::new(SqliteChunkStore::new(StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            ..StoreConfig::default()
        }))
    }

    fn test_language() -> Arc<LanguageService> {
        Arc::new(LanguageService::new(Arc::new(NoopTranslation), TranslationConfig::default()))
    }

    async fn test_cache() -> Arc<ResponseCache> {
        let temp = NamedTempFile::new().unwrap();
        let config = ResponseCacheConfig {
            db_path: temp.path().to_str().unwrap().to_string(),
            ..ResponseCacheConfig::default()
        };
        Arc::new(ResponseCache::new(config).await.unwrap())
    }

    #[tokio::test]
    async fn test_ingest_then_query_answers_from_evidence() {
        let config = test_config();
        let store = test_store();
        let embedding = Arc::new(EmbeddingManager::new(Arc::new(ConstantBackend), config.embedding.clone()));

        let ingestor = IngestionOrchestrator::new(config.clone(), store.clone(), embedding.clone());
        let report = ingestor
            .ingest("manual.txt", b"The warranty lasts three years from purchase.")
            .await
            .unwrap();
        assert_eq!(report.chunks_ingested, 1);

        let llm: Arc<dyn LlmClient> = Arc::new(CannedLlm("the warranty lasts three years [1]"));
        let orchestrator = QueryOrchestrator::new(config, store, embedding, test_language(), llm, test_cache().await);

        let response = orchestrator
            .answer(
                QueryRequest {
                    query: "how long is the warranty?".to_string(),
                    persona: None,
                    top_k: None,
                    target_language: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!response.answer.is_empty());
        assert_ne!(response.strategy, "Refuse");
    }

    #[tokio::test]
    async fn test_query_refuses_on_empty_corpus() {
        let config = test_config();
        let store = test_store();
        let embedding = Arc::new(EmbeddingManager::new(Arc::new(ConstantBackend), config.embedding.clone()));
        let llm: Arc<dyn LlmClient> = Arc::new(FailingLlm);
        let orchestrator = QueryOrchestrator::new(config, store, embedding, test_language(), llm, test_cache().await);

        let response = orchestrator
            .answer(
                QueryRequest {
                    query: "anything at all".to_string(),
                    persona: None,
                    top_k: None,
                    target_language: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.strategy, "Refuse");
        assert_eq!(response.reasoning_chain.final_decision, FinalDecision::Refused);
    }

    #[tokio::test]
    async fn test_generation_outage_degrades_to_refusal() {
        let config = test_config();
        let store = test_store();
        let embedding = Arc::new(EmbeddingManager::new(Arc::new(ConstantBackend), config.embedding.clone()));

        let ingestor = IngestionOrchestrator::new(config.clone(), store.clone(), embedding.clone());
        ingestor
            .ingest("manual.txt", b"The warranty lasts three years from purchase.")
            .await
            .unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(FailingLlm);
        let orchestrator = QueryOrchestrator::new(config, store, embedding, test_language(), llm, test_cache().await);

        let response = orchestrator
            .answer(
                QueryRequest {
                    query: "how long is the warranty?".to_string(),
                    persona: None,
                    top_k: None,
                    target_language: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.reasoning_chain.final_decision, FinalDecision::Refused);
    }

    #[tokio::test]
    async fn test_ingest_rejects_when_queue_is_full() {
        let mut config = test_config();
        config.ingest_soft_limit = 0;
        let store = test_store();
        let embedding = Arc::new(EmbeddingManager::new(Arc::new(ConstantBackend), config.embedding.clone()));
        let ingestor = IngestionOrchestrator::new(config, store, embedding);

        let result = ingestor.ingest("manual.txt", b"anything").await;
        assert!(matches!(result, Err(CoreError::Busy)));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let config = test_config();
        let store = test_store();
        let embedding = Arc::new(EmbeddingManager::new(Arc::new(ConstantBackend), config.embedding.clone()));
        let llm: Arc<dyn LlmClient> = Arc::new(FailingLlm);
        let orchestrator = QueryOrchestrator::new(config, store, embedding, test_language(), llm, test_cache().await);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator
            .answer(
                QueryRequest {
                    query: "anything".to_string(),
                    persona: None,
                    top_k: None,
                    target_language: None,
                },
                cancel,
            )
            .await;

        assert!(matches!(result, Err(CoreError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_short_query_refuses_without_retrieval_or_generation() {
        let config = test_config();
        let store = test_store();
        let embedding = Arc::new(EmbeddingManager::new(Arc::new(ConstantBackend), config.embedding.clone()));
        let llm: Arc<dyn LlmClient> = Arc::new(FailingLlm);
        let orchestrator = QueryOrchestrator::new(config, store, embedding, test_language(), llm, test_cache().await);

        let response = orchestrator
            .answer(
                QueryRequest {
                    query: "hi".to_string(),
                    persona: None,
                    top_k: None,
                    target_language: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.strategy, "Refuse");
        assert!(response.sources.is_empty());
        assert_eq!(
            response
                .reasoning_chain
                .steps
                .iter()
                .filter(|s| s.step_type == StepType::Retrieval)
                .count(),
            0
        );
    }
}
