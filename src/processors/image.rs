//! Image ingestion: OCR when the image carries legible text, otherwise a
//! visual-only chunk that the embedding manager will project separately.

use crate::chunk::{meta_keys, Chunk, Modality, SourceType};
use crate::config::{CoreConfig, OcrConfig};
use crate::error::{ProcessingError, Result};
use async_trait::async_trait;

use super::ModalityProcessor;

/// OCR backend family. Real Tesseract bindings are costly to link on every
/// platform, so `Mock` is the default and `Tesseract` is opt-in via the
/// `ocr.engine` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngine {
    Tesseract,
    Mock,
}

impl OcrEngine {
    fn from_config(config: &OcrConfig) -> Self {
        match config.engine.as_str() {
            "tesseract" => OcrEngine::Tesseract,
            _ => OcrEngine::Mock,
        }
    }
}

/// Runs OCR over raw image bytes, returning recognized text and a
/// confidence in [0, 1]. Shared by the image processor and the PDF
/// processor (for embedded images).
pub fn ocr_bytes(config: &OcrConfig, bytes: &[u8]) -> Result<(String, f32)> {
    match OcrEngine::from_config(config) {
        OcrEngine::Mock => Ok((String::new(), 0.0)),
        #[allow(unreachable_patterns)]
        OcrEngine::Tesseract => ocr_with_tesseract(bytes),
    }
}

#[cfg(feature = "ocr-tesseract")]
fn ocr_with_tesseract(bytes: &[u8]) -> Result<(String, f32)> {
    let mut lt = leptess::LepTess::new(None, "eng").map_err(|e| {
        ProcessingError::DependencyMissing(format!("tesseract init failed: {e}"))
    })?;
    lt.set_image_from_mem(bytes).map_err(|e| {
        ProcessingError::Corrupt {
            source_file: "<image>".to_string(),
            detail: format!("tesseract load failed: {e}"),
        }
    })?;
    let text = lt.get_utf8_text().unwrap_or_default();
    let confidence = lt.mean_text_conf() as f32 / 100.0;
    Ok((text, confidence))
}

#[cfg(not(feature = "ocr-tesseract"))]
fn ocr_with_tesseract(_bytes: &[u8]) -> Result<(String, f32)> {
    Err(ProcessingError::DependencyMissing(
        "built without the ocr-tesseract feature".to_string(),
    )
    .into())
}

/// How much of the configured minimum resolution counts as "full quality".
/// An image at or above `min_image_size * RESOLUTION_HEADROOM` on its
/// shorter side contributes the full resolution component of the score.
const RESOLUTION_HEADROOM: f32 = 3.0;

/// Confidence for an IMAGE chunk, as a function of resolution and OCR
/// confidence, bounded to `[0.5, 1.0]`. An image with no legible text but
/// ample resolution still lands in the upper half of the range; a
/// low-resolution image with low OCR confidence settles at the floor.
pub fn image_confidence(width: u32, height: u32, ocr_confidence: f32, min_image_size: u32) -> f32 {
    let shorter_side = width.min(height) as f32;
    let reference = (min_image_size as f32 * RESOLUTION_HEADROOM).max(1.0);
    let resolution_score = (shorter_side / reference).clamp(0.0, 1.0);
    let combined = 0.5 * resolution_score + 0.5 * ocr_confidence.clamp(0.0, 1.0);
    (0.5 + 0.5 * combined).clamp(0.5, 1.0)
}

pub struct ImageProcessor {
    config: CoreConfig,
}

impl ImageProcessor {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModalityProcessor for ImageProcessor {
    fn extensions(&self) -> &[&str] {
        &["png", "jpg", "jpeg", "bmp", "gif"]
    }

    async fn process(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let decoded = image::load_from_memory(bytes).map_err(|e| ProcessingError::Corrupt {
            source_file: source_file.to_string(),
            detail: format!("not a decodable image: {e}"),
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        if width < self.config.pdf.min_image_size || height < self.config.pdf.min_image_size {
            return Err(ProcessingError::Corrupt {
                source_file: source_file.to_string(),
                detail: format!("image too small: {width}x{height}"),
            }
            .into());
        }

        let mut chunks = Vec::new();
        let (ocr_text, confidence) = ocr_bytes(&self.config.ocr, bytes)?;
        let image_chunk = Chunk::new(
            Modality::Image,
            String::new(),
            source_file,
            SourceType::UploadedImage,
        )
        .with_metadata(meta_keys::WIDTH, width as i64)
        .with_metadata(meta_keys::HEIGHT, height as i64)
        .with_confidence(image_confidence(width, height, confidence, self.config.pdf.min_image_size));

        if ocr_text.chars().count() >= self.config.pdf.min_ocr_chars_for_sibling {
            let ocr_chunk = Chunk::new(Modality::Text, ocr_text, source_file, SourceType::PdfImageOcr)
                .with_metadata(meta_keys::OCR_CONFIDENCE, confidence as f64)
                .with_metadata(meta_keys::PARENT_CHUNK_ID, image_chunk.id.clone());
            chunks.push(ocr_chunk);
        }
        chunks.push(image_chunk);

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_image_bytes() {
        let processor = ImageProcessor::new(CoreConfig::default());
        let result = processor.process("bad.png", b"not an image").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_ocr_returns_empty() {
        let (text, confidence) = ocr_bytes(&OcrConfig::default(), b"whatever").unwrap();
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_image_confidence_bounded_and_monotonic() {
        let floor = image_confidence(0, 0, 0.0, 64);
        let low = image_confidence(64, 64, 0.0, 64);
        let high = image_confidence(1000, 1000, 1.0, 64);
        assert_eq!(floor, 0.5);
        assert_eq!(high, 1.0);
        assert!(floor < low && low < high);
    }
}
