//! Multimodal evidence-grounded retrieval engine
//!
//! Ingests text, PDF, image, and audio sources into a shared embedding
//! space, then answers natural-language queries with inline citations, an
//! explicit confidence score, conflict detection across sources, and an
//! auditable reasoning chain recording every stage that produced the
//! answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use evidence_rag_engine::{Core, CoreConfig, QueryRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let core = Core::new(CoreConfig::default()).await?;
//!     core.ingest("manual.txt", b"The warranty lasts three years.").await?;
//!
//!     let response = core
//!         .query(QueryRequest {
//!             query: "How long is the warranty?".to_string(),
//!             persona: "standard".to_string(),
//!             enable_auto_translate: true,
//!             target_language: None,
//!             top_k: 5,
//!             debate: false,
//!             include_reasoning_chain: true,
//!         })
//!         .await?;
//!
//!     println!("{}", response.answer);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod chunk;
pub mod confidence;
pub mod conflict;
pub mod config;
pub mod embedding;
pub mod error;
pub mod language;
pub mod llm;
pub mod orchestrator;
pub mod processors;
pub mod query_analysis;
pub mod reasoning;
pub mod retrieval;
pub mod store;
pub mod strategy;

pub use api::{Core, QueryRequest, QueryResponse, Stats, SupportedLanguage, TranslationInfo};
pub use chunk::{Chunk, Modality, SourceReference, SourceType};
pub use confidence::{ConfidenceBreakdown, ConfidenceLevel};
pub use conflict::{Conflict, ConflictSeverity};
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use orchestrator::IngestReport;
pub use query_analysis::Persona;
pub use reasoning::{FinalDecision, ReasoningChain, ReasoningStep};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
