//! Configuration management for the retrieval engine

use serde::{Deserialize, Serialize};

/// Root configuration for the whole core pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub pdf: PdfConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub cache: crate::cache::ResponseCacheConfig,

    /// Soft limit on in-flight ingest work before `ingest()` returns `Busy`
    #[serde(default = "default_ingest_soft_limit")]
    pub ingest_soft_limit: usize,

    /// Concurrency permits for CPU/GPU-bound inference (embedding, OCR, STT)
    #[serde(default = "default_inference_concurrency")]
    pub inference_concurrency: usize,
}

fn default_ingest_soft_limit() -> usize {
    64
}

fn default_inference_concurrency() -> usize {
    4
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            pdf: PdfConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            translation: TranslationConfig::default(),
            ocr: OcrConfig::default(),
            audio: AudioConfig::default(),
            cache: crate::cache::ResponseCacheConfig::default(),
            ingest_soft_limit: default_ingest_soft_limit(),
            inference_concurrency: default_inference_concurrency(),
        }
    }
}

/// Text-chunking knobs, shared by the text and PDF-text processors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub text_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub text_chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            text_chunk_size: default_chunk_size(),
            text_chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// PDF multimodal extraction knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_true")]
    pub extract_images: bool,
    #[serde(default = "default_min_image_size")]
    pub min_image_size: u32,
    #[serde(default = "default_max_images_per_page")]
    pub max_images_per_page: usize,
    #[serde(default = "default_min_ocr_chars")]
    pub min_ocr_chars_for_sibling: usize,
}

fn default_true() -> bool {
    true
}
fn default_min_image_size() -> u32 {
    100
}
fn default_max_images_per_page() -> usize {
    10
}
fn default_min_ocr_chars() -> usize {
    20
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            extract_images: default_true(),
            min_image_size: default_min_image_size(),
            max_images_per_page: default_max_images_per_page(),
            min_ocr_chars_for_sibling: default_min_ocr_chars(),
        }
    }
}

/// Embedding manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Dimension of the shared embedding space (`VECTOR_DIM`)
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Minimum OCR character count before an image's OCR text (rather than
    /// its visual descriptor) is used as the embedding input.
    #[serde(default = "default_min_ocr_chars")]
    pub min_ocr_chars_for_text_embedding: usize,
}

fn default_vector_dim() -> usize {
    384
}
fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            vector_dim: default_vector_dim(),
            batch_size: default_batch_size(),
            min_ocr_chars_for_text_embedding: default_min_ocr_chars(),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database URL; `sqlite::memory:` for ephemeral stores
    #[serde(default = "default_db_url")]
    pub database_url: String,
    /// Directory that holds uploaded source files, keyed by `source_file`
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
}

fn default_db_url() -> String {
    "sqlite:vector_index.db".to_string()
}
fn default_uploads_dir() -> String {
    "uploads".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_db_url(),
            uploads_dir: default_uploads_dir(),
        }
    }
}

/// Retrieval and confidence thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_max_iterations")]
    pub max_retrieval_iterations: usize,
    #[serde(default = "default_image_floor")]
    pub image_inclusion_floor: f32,
    #[serde(default = "default_relevance_floor")]
    pub second_pass_relevance_floor: f32,
    #[serde(default = "default_claim_similarity_threshold")]
    pub conflict_claim_similarity_threshold: f32,
}

fn default_top_k() -> usize {
    5
}
fn default_confidence_threshold() -> f32 {
    0.4
}
fn default_max_iterations() -> usize {
    2
}
fn default_image_floor() -> f32 {
    0.35
}
fn default_relevance_floor() -> f32 {
    0.3
}
fn default_claim_similarity_threshold() -> f32 {
    0.6
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
            max_retrieval_iterations: default_max_iterations(),
            image_inclusion_floor: default_image_floor(),
            second_pass_relevance_floor: default_relevance_floor(),
            conflict_claim_similarity_threshold: default_claim_similarity_threshold(),
        }
    }
}

/// LLM provider-chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ordered provider names, first is tried first (`LLM_PROVIDER_ORDER`)
    #[serde(default = "default_provider_order")]
    pub provider_order: Vec<String>,
    #[serde(default = "default_llm_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-HTTP-call timeout; distinct from `deadline_ms`, which bounds the
    /// whole query including retries across the provider chain.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_provider_order() -> Vec<String> {
    vec!["ollama".to_string(), "mock".to_string()]
}
fn default_llm_deadline_ms() -> u64 {
    120_000
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_text_model() -> String {
    "llama3.2".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_call_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_order: default_provider_order(),
            deadline_ms: default_llm_deadline_ms(),
            ollama_url: default_ollama_url(),
            text_model: default_text_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// Translation layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_detection_confidence_floor")]
    pub detection_confidence_floor: f32,
}

fn default_detection_confidence_floor() -> f32 {
    0.5
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            detection_confidence_floor: default_detection_confidence_floor(),
        }
    }
}

/// OCR backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// "tesseract" or "mock"
    #[serde(default = "default_ocr_engine")]
    pub engine: String,
}

fn default_ocr_engine() -> String {
    "mock".to_string()
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: default_ocr_engine(),
        }
    }
}

/// Audio decoder/STT backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// "external" (shells out to `decoder_binary`) or "mock"
    #[serde(default = "default_audio_engine")]
    pub engine: String,
    #[serde(default)]
    pub decoder_binary: Option<String>,
}

fn default_audio_engine() -> String {
    "mock".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            engine: default_audio_engine(),
            decoder_binary: None,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON/TOML/YAML file, by extension
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("unsupported config file format")),
        };
        Ok(config)
    }

    /// Load configuration from a file, then overlay `CORE_*` environment
    /// variables (e.g. `CORE_RETRIEVAL__DEFAULT_TOP_K`), using the layered
    /// `config` crate source.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CORE")
                .separator("__")
                .try_parsing(true),
        );
        let settled = builder.build()?;
        Ok(settled.try_deserialize().unwrap_or_default())
    }

    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.vector_dim == 0 {
            return Err(anyhow::anyhow!("vector_dim must be greater than 0"));
        }
        if self.retrieval.default_top_k == 0 {
            return Err(anyhow::anyhow!("default_top_k must be greater than 0"));
        }
        if self.llm.provider_order.is_empty() {
            return Err(anyhow::anyhow!(
                "llm.provider_order must name at least one provider"
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.confidence_threshold) {
            return Err(anyhow::anyhow!(
                "confidence_threshold must be between 0.0 and 1.0"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.vector_dim, 384);
        assert_eq!(config.retrieval.default_top_k, 5);
    }

    #[test]
    fn test_invalid_vector_dim() {
        let mut config = CoreConfig::default();
        config.embedding.vector_dim = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = CoreConfig::default();
        config.to_file(&path).unwrap();
        let loaded = CoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded.embedding.vector_dim, config.embedding.vector_dim);
    }
}
