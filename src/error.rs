//! Error handling for the retrieval engine

use thiserror::Error;

/// Result type alias for the retrieval engine
pub type Result<T> = std::result::Result<T, CoreError>;

/// Top-level error type for the core pipeline
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("translation error: {0}")]
    Translation(#[from] TranslationFailure),

    #[error("cancelled: {0}")]
    Cancelled(#[from] CancellationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("the engine is busy, ingest queue is full")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors from a modality processor failing to turn a file into chunks
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt input in {source_file}: {detail}")]
    Corrupt { source_file: String, detail: String },

    #[error("missing dependency: {0}")]
    DependencyMissing(String),
}

/// Errors raised by the embedding manager
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    #[error("invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("embedding backend failed: {0}")]
    BackendFailed(String),

    #[error("batch embedding aborted after {completed} of {total} chunks: {reason}")]
    BatchAborted {
        completed: usize,
        total: usize,
        reason: String,
    },
}

/// Errors raised by the vector store
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("store not initialized")]
    NotInitialized,

    #[error("duplicate chunk id: {0}")]
    DuplicateId(String),

    #[error("chunk missing embedding: {0}")]
    MissingEmbedding(String),

    #[error("search failed: {0}")]
    SearchFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Errors raised by an individual LLM provider, or by the provider chain
/// as a whole once every provider has been exhausted.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unauthorized: check the provider's API key")]
    Unauthorized,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider server error: {0}")]
    ServerError(String),

    #[error("timeout: operation took too long")]
    Timeout,

    #[error("provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("all providers failed for this request")]
    AllProvidersFailed,

    #[error("generation deadline exceeded")]
    DeadlineExceeded,
}

/// Non-fatal translation failure; the caller proceeds with the original text
#[derive(Error, Debug, Clone)]
pub enum TranslationFailure {
    #[error("detection failed: {0}")]
    DetectionFailed(String),

    #[error("translation unavailable for {from} -> {to}: {reason}")]
    Unavailable {
        from: String,
        to: String,
        reason: String,
    },
}

/// Cancellation of a query due to a deadline or an external cancel signal
#[derive(Error, Debug, Clone)]
pub enum CancellationError {
    #[error("deadline exceeded at stage {stage}")]
    DeadlineExceeded { stage: String },

    #[error("cancelled by caller")]
    Requested,
}

impl CoreError {
    /// Whether retrying the same operation might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Generation(
                GenerationError::ProviderFailed { .. }
                    | GenerationError::ConnectionFailed(_)
                    | GenerationError::Timeout
                    | GenerationError::RateLimited
                    | GenerationError::ServerError(_)
            ) | CoreError::Http(_)
                | CoreError::Busy
        )
    }

    /// Category tag for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Processing(_) => "processing",
            CoreError::Embedding(_) => "embedding",
            CoreError::Storage(_) => "storage",
            CoreError::Generation(_) => "generation",
            CoreError::Translation(_) => "translation",
            CoreError::Cancelled(_) => "cancelled",
            CoreError::Config(_) => "config",
            CoreError::Busy => "busy",
            CoreError::Io(_) => "io",
            CoreError::Serialization(_) => "serialization",
            CoreError::Http(_) => "http",
            CoreError::Database(_) => "database",
            CoreError::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let busy = CoreError::Busy;
        assert!(busy.is_retryable());

        let cfg = CoreError::Config("bad".to_string());
        assert!(!cfg.is_retryable());
    }

    #[test]
    fn test_category() {
        let e = CoreError::Storage(StorageError::NotInitialized);
        assert_eq!(e.category(), "storage");
    }
}
