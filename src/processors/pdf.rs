//! PDF text and embedded-image extraction.
//!
//! Text pages are chunked the same way as plain text. Embedded images are
//! surfaced as separate IMAGE chunks; when OCR on an image yields enough
//! text, a sibling TEXT chunk pointing back at the image via
//! `parent_chunk_id` is also produced.

use crate::chunk::{meta_keys, Chunk, Modality, SourceType};
use crate::config::CoreConfig;
use crate::error::{ProcessingError, Result};
use async_trait::async_trait;
use tracing::warn;

use super::image::{image_confidence, ocr_bytes};
use super::text::TextProcessor;
use super::ModalityProcessor;

/// Records a non-fatal image-extraction failure on the text chunks of the
/// page it happened on, so the page still reads as text-only instead of
/// silently dropping the image with no trace.
fn attach_page_warning(chunks: &mut [Chunk], page_number: u32, warning: &str) {
    for chunk in chunks
        .iter_mut()
        .filter(|c| c.page_number() == Some(page_number as i64))
    {
        chunk.metadata.insert(meta_keys::WARNING.to_string(), warning.to_string().into());
    }
}

pub struct PdfProcessor {
    config: CoreConfig,
    text_processor: TextProcessor,
}

impl PdfProcessor {
    pub fn new(config: CoreConfig) -> Self {
        let text_processor = TextProcessor::new(config.chunking.clone());
        Self {
            config,
            text_processor,
        }
    }

    /// Extracts raw text per page. Falls back to whole-document text (page
    /// boundaries unknown) when the `pdf` feature is disabled or extraction
    /// fails, matching the teacher's real-extraction-then-fallback order.
    fn extract_pages(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<String>> {
        #[cfg(feature = "pdf")]
        {
            match self.extract_with_lopdf(bytes) {
                Ok(pages) if !pages.is_empty() => return Ok(pages),
                Ok(_) => {}
                Err(e) => warn!(source_file, error = %e, "lopdf extraction failed, falling back"),
            }
            if let Ok(text) = pdf_extract::extract_text_from_mem(bytes) {
                return Ok(vec![text]);
            }
        }
        #[cfg(not(feature = "pdf"))]
        {
            let _ = bytes;
        }
        Err(ProcessingError::DependencyMissing(
            "no PDF backend available to extract text".to_string(),
        )
        .into())
    }

    #[cfg(feature = "pdf")]
    fn extract_with_lopdf(&self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(bytes)?;
        let mut pages = Vec::new();
        for (page_num, _) in doc.get_pages() {
            let text = doc.extract_text(&[page_num]).unwrap_or_default();
            pages.push(text);
        }
        Ok(pages)
    }

    /// Extracts embedded raster images per page. Real extraction requires
    /// walking the page's `XObject` resources; kept minimal here and
    /// returns an empty set when the `pdf` feature is off.
    #[cfg(feature = "pdf")]
    fn extract_images(&self, bytes: &[u8]) -> Vec<(u32, Vec<u8>)> {
        let Ok(doc) = lopdf::Document::load_mem(bytes) else {
            return Vec::new();
        };
        let mut images = Vec::new();
        for (page_num, page_id) in doc.get_pages() {
            let Ok(resources) = doc.get_page_resources(page_id).0.ok_or(()) else {
                continue;
            };
            if let Ok(xobjects) = resources.get(b"XObject").and_then(|o| o.as_dict()) {
                for (_, obj_ref) in xobjects.iter() {
                    if let Ok(obj_id) = obj_ref.as_reference() {
                        if let Ok(stream) = doc.get_object(obj_id).and_then(|o| o.as_stream()) {
                            if let Ok(data) = stream.get_plain_content() {
                                images.push((page_num, data));
                            }
                        }
                    }
                }
            }
        }
        images.truncate(self.config.pdf.max_images_per_page * 8);
        images
    }

    #[cfg(not(feature = "pdf"))]
    fn extract_images(&self, _bytes: &[u8]) -> Vec<(u32, Vec<u8>)> {
        Vec::new()
    }
}

#[async_trait]
impl ModalityProcessor for PdfProcessor {
    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    async fn process(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let pages = self.extract_pages(source_file, bytes)?;
        let mut chunks = Vec::new();
        let mut order = 0usize;

        for (page_idx, page_text) in pages.iter().enumerate() {
            let page_number = (page_idx + 1) as i64;
            for piece in self.text_processor.chunk_text(page_text) {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(
                    Chunk::new(Modality::Text, piece, source_file, SourceType::PdfText)
                        .with_metadata(meta_keys::PAGE_NUMBER, page_number)
                        .with_metadata(meta_keys::ORDER, order),
                );
                order += 1;
            }
        }

        if self.config.pdf.extract_images {
            for (page_number, image_bytes) in self.extract_images(bytes) {
                let Ok(decoded) = image::load_from_memory(&image_bytes) else {
                    warn!(source_file, page_number, "embedded image failed to decode, keeping text-only");
                    attach_page_warning(&mut chunks, page_number, "embedded image failed to decode");
                    continue;
                };
                let (width, height) = (decoded.width(), decoded.height());
                if width < self.config.pdf.min_image_size || height < self.config.pdf.min_image_size {
                    warn!(source_file, page_number, width, height, "embedded image below minimum size, keeping text-only");
                    attach_page_warning(
                        &mut chunks,
                        page_number,
                        &format!("embedded image too small: {width}x{height}"),
                    );
                    continue;
                }

                let (ocr_text, ocr_confidence) = ocr_bytes(&self.config.ocr, &image_bytes).unwrap_or_default();
                let descriptor = format!("embedded image, page {page_number}, {width}x{height}");
                let image_chunk = Chunk::new(
                    Modality::Image,
                    descriptor,
                    source_file,
                    SourceType::PdfEmbeddedImage,
                )
                .with_metadata(meta_keys::PAGE_NUMBER, page_number as i64)
                .with_metadata(meta_keys::IMAGE_INDEX, order)
                .with_metadata(meta_keys::WIDTH, width as i64)
                .with_metadata(meta_keys::HEIGHT, height as i64)
                .with_confidence(image_confidence(width, height, ocr_confidence, self.config.pdf.min_image_size));
                order += 1;

                if ocr_text.chars().count() >= self.config.pdf.min_ocr_chars_for_sibling {
                    let ocr_chunk = Chunk::new(
                        Modality::Text,
                        ocr_text,
                        source_file,
                        SourceType::PdfImageOcr,
                    )
                    .with_metadata(meta_keys::PAGE_NUMBER, page_number as i64)
                    .with_metadata(meta_keys::OCR_CONFIDENCE, ocr_confidence as f64)
                    .with_metadata(meta_keys::PARENT_CHUNK_ID, image_chunk.id.clone());
                    chunks.push(ocr_chunk);
                }
                chunks.push(image_chunk);
            }
        }

        if chunks.is_empty() {
            return Err(ProcessingError::Corrupt {
                source_file: source_file.to_string(),
                detail: "no extractable text or images".to_string(),
            }
            .into());
        }

        Ok(chunks)
    }
}
