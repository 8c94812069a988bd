//! The canonical evidence record shared by every modality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// The kind of content a chunk represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "TEXT"),
            Modality::Image => write!(f, "IMAGE"),
            Modality::Audio => write!(f, "AUDIO"),
        }
    }
}

/// Where a chunk's content originally came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    UploadedText,
    UploadedImage,
    UploadedAudio,
    PdfText,
    PdfEmbeddedImage,
    PdfImageOcr,
    DocxText,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::UploadedText => "uploaded_text",
            SourceType::UploadedImage => "uploaded_image",
            SourceType::UploadedAudio => "uploaded_audio",
            SourceType::PdfText => "pdf_text",
            SourceType::PdfEmbeddedImage => "pdf_embedded_image",
            SourceType::PdfImageOcr => "pdf_image_ocr",
            SourceType::DocxText => "docx_text",
        };
        write!(f, "{}", s)
    }
}

/// A single typed metadata value. `Chunk::metadata` is a loose bag of these
/// rather than a fixed struct because each modality/source_type populates a
/// different subset (page_number, segment_start, parent_chunk_id, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            MetadataValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}
impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}
impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}
impl From<usize> for MetadataValue {
    fn from(v: usize) -> Self {
        MetadataValue::Int(v as i64)
    }
}
impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}
impl From<f32> for MetadataValue {
    fn from(v: f32) -> Self {
        MetadataValue::Float(v as f64)
    }
}
impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

/// Well-known metadata keys, kept as constants so processors and the
/// retriever agree on spelling without importing each other.
pub mod meta_keys {
    pub const PAGE_NUMBER: &str = "page_number";
    pub const IMAGE_INDEX: &str = "image_index";
    pub const POSITION_IN_DOCUMENT: &str = "position_in_document";
    pub const LANGUAGE: &str = "language";
    pub const OCR_CONFIDENCE: &str = "ocr_confidence";
    pub const TRANSCRIPTION_CONFIDENCE: &str = "transcription_confidence";
    pub const PARENT_CHUNK_ID: &str = "parent_chunk_id";
    pub const FORMAT: &str = "format";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const DURATION: &str = "duration";
    pub const SEGMENT_START: &str = "segment_start";
    pub const SEGMENT_END: &str = "segment_end";
    pub const ORDER: &str = "order";
    pub const WARNING: &str = "warning";
    pub const STATUS: &str = "status";
}

/// The atomic unit of evidence. Every search result, citation and
/// confidence computation is over a set of `Chunk`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub modality: Modality,
    pub content: String,
    pub source_file: String,
    pub source_type: SourceType,
    pub metadata: HashMap<String, MetadataValue>,
    /// `None` until the embedding manager has run on this chunk.
    pub embedding: Option<Vec<f32>>,
    /// Intrinsic quality score in [0,1], assigned at ingest time.
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(
        modality: Modality,
        content: impl Into<String>,
        source_file: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            modality,
            content: content.into(),
            source_file: source_file.into(),
            source_type,
            metadata: HashMap::new(),
            embedding: None,
            confidence: 0.8,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn parent_chunk_id(&self) -> Option<&str> {
        self.metadata
            .get(meta_keys::PARENT_CHUNK_ID)
            .and_then(MetadataValue::as_str)
    }

    pub fn page_number(&self) -> Option<i64> {
        self.metadata
            .get(meta_keys::PAGE_NUMBER)
            .and_then(MetadataValue::as_i64)
    }

    /// Whether this chunk carries an embedding of the given dimension.
    pub fn has_valid_embedding(&self, dim: usize) -> bool {
        matches!(&self.embedding, Some(v) if v.len() == dim)
    }
}

/// A compact snapshot of a chunk returned alongside a response for citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub chunk_id: String,
    pub source_file: String,
    pub content_snippet: String,
    pub relevance_score: f32,
    pub confidence: f32,
    pub modality: Modality,
}

impl SourceReference {
    pub fn from_chunk(chunk: &Chunk, relevance_score: f32) -> Self {
        let snippet: String = chunk.content.chars().take(240).collect();
        Self {
            chunk_id: chunk.id.clone(),
            source_file: chunk.source_file.clone(),
            content_snippet: snippet,
            relevance_score,
            confidence: chunk.confidence,
            modality: chunk.modality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_builder() {
        let chunk = Chunk::new(Modality::Text, "hello world", "manual.txt", SourceType::UploadedText)
            .with_metadata(meta_keys::ORDER, 0usize)
            .with_confidence(1.5);

        assert_eq!(chunk.confidence, 1.0);
        assert_eq!(chunk.source_file, "manual.txt");
        assert!(!chunk.has_valid_embedding(384));
    }

    #[test]
    fn test_parent_chunk_id() {
        let image = Chunk::new(Modality::Image, "a diagram", "m.pdf", SourceType::PdfEmbeddedImage);
        let ocr = Chunk::new(Modality::Text, "client -> server", "m.pdf", SourceType::PdfImageOcr)
            .with_metadata(meta_keys::PARENT_CHUNK_ID, image.id.clone());

        assert_eq!(ocr.parent_chunk_id(), Some(image.id.as_str()));
    }

    #[test]
    fn test_source_reference_snippet_truncates() {
        let long_content = "x".repeat(1000);
        let chunk = Chunk::new(Modality::Text, long_content, "f.txt", SourceType::UploadedText);
        let reference = SourceReference::from_chunk(&chunk, 0.9);
        assert_eq!(reference.content_snippet.chars().count(), 240);
    }
}
