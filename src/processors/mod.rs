//! Turns an uploaded file into a `Vec<Chunk>` for its modality.

mod audio;
mod image;
mod pdf;
mod text;

pub use audio::AudioProcessor;
pub use image::ImageProcessor;
pub use pdf::PdfProcessor;
pub use text::TextProcessor;

use crate::chunk::Chunk;
use crate::config::CoreConfig;
use crate::error::{ProcessingError, Result};
use async_trait::async_trait;

/// A single modality's ingestion path: raw bytes in, chunks out.
#[async_trait]
pub trait ModalityProcessor: Send + Sync {
    /// File extensions (lowercase, no dot) this processor claims.
    fn extensions(&self) -> &[&str];

    async fn process(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Chunk>>;
}

/// Picks a processor by file extension and dispatches to it.
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn ModalityProcessor>>,
}

impl ProcessorRegistry {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            processors: vec![
                Box::new(TextProcessor::new(config.chunking.clone())),
                Box::new(PdfProcessor::new(config.clone())),
                Box::new(ImageProcessor::new(config.clone())),
                Box::new(AudioProcessor::new(config.audio.clone())),
            ],
        }
    }

    pub async fn process(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let ext = extension_of(source_file);
        for processor in &self.processors {
            if processor.extensions().contains(&ext.as_str()) {
                return processor.process(source_file, bytes).await;
            }
        }
        Err(ProcessingError::UnsupportedFormat(ext).into())
    }
}

fn extension_of(source_file: &str) -> String {
    std::path::Path::new(source_file)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let registry = ProcessorRegistry::new(&CoreConfig::default());
        let result = registry.process("notes.xyz", b"hello").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_txt_routes_to_text_processor() {
        let registry = ProcessorRegistry::new(&CoreConfig::default());
        let chunks = registry.process("notes.txt", b"hello world").await.unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
