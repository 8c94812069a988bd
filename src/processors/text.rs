//! Plain text and markdown chunking, sentence-boundary aware.

use crate::chunk::{meta_keys, Chunk, Modality, SourceType};
use crate::config::ChunkingConfig;
use crate::error::{ProcessingError, Result};
use async_trait::async_trait;

use super::ModalityProcessor;

pub struct TextProcessor {
    config: ChunkingConfig,
}

impl TextProcessor {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Splits `text` into chunks of roughly `chunk_size` bytes, trying to
    /// break on a sentence boundary within the last 100 bytes of a window
    /// and carrying `overlap` bytes of context into the next chunk.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let chunk_size = self.config.text_chunk_size;
        let overlap = self.config.text_chunk_overlap;

        if text.len() <= chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let end = (start + chunk_size).min(text.len());
            let piece = if end < text.len() {
                find_sentence_boundary(&text[start..end])
            } else {
                text[start..end].to_string()
            };

            if !piece.trim().is_empty() {
                chunks.push(piece.clone());
            }

            let advance = piece.len().saturating_sub(overlap).max(1);
            start += advance;
        }

        chunks
    }
}

fn find_sentence_boundary(text: &str) -> String {
    let search_start = text.len().saturating_sub(100);
    let search_text = &text[search_start..];

    if let Some(pos) = search_text.rfind(|c: char| c == '.' || c == '!' || c == '?') {
        return text[..search_start + pos + 1].to_string();
    }
    if let Some(pos) = text.rfind(char::is_whitespace) {
        return text[..pos].to_string();
    }
    text.to_string()
}

#[async_trait]
impl ModalityProcessor for TextProcessor {
    fn extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }

    async fn process(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let text = std::str::from_utf8(bytes).map_err(|e| ProcessingError::Corrupt {
            source_file: source_file.to_string(),
            detail: format!("not valid utf-8: {e}"),
        })?;

        let pieces = self.chunk_text(text);
        let chunks = pieces
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                Chunk::new(Modality::Text, content, source_file, SourceType::UploadedText)
                    .with_metadata(meta_keys::ORDER, i)
                    .with_metadata(meta_keys::POSITION_IN_DOCUMENT, i)
            })
            .collect();
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_short_text_single_chunk() {
        let processor = TextProcessor::new(ChunkingConfig::default());
        let chunks = processor.process("a.txt", b"This is a short text.").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "This is a short text.");
        assert_eq!(chunks[0].modality, Modality::Text);
    }

    #[tokio::test]
    async fn test_long_text_multiple_chunks() {
        let mut config = ChunkingConfig::default();
        config.text_chunk_size = 50;
        config.text_chunk_overlap = 10;

        let processor = TextProcessor::new(config);
        let text = "This is sentence one. This is sentence two. This is sentence three. This is sentence four.";
        let chunks = processor.process("a.txt", text.as_bytes()).await.unwrap();
        assert!(chunks.len() > 1);
    }

    #[tokio::test]
    async fn test_rejects_non_utf8() {
        let processor = TextProcessor::new(ChunkingConfig::default());
        let bytes = vec![0xff, 0xfe, 0x00];
        assert!(processor.process("a.txt", &bytes).await.is_err());
    }
}
