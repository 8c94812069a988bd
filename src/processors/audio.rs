//! Audio ingestion: transcribes speech into timestamped text segments.
//!
//! The default `mock` engine returns no segments (callers get an empty
//! chunk set rather than a hard failure) so the pipeline stays usable
//! without a native STT dependency. The `external` engine shells out to a
//! configured decoder binary that emits
//! `start\tend\tavg_logprob\tno_speech_prob\ttext` lines on stdout.

use crate::chunk::{meta_keys, Chunk, Modality, SourceType};
use crate::config::AudioConfig;
use crate::error::{ProcessingError, Result};
use async_trait::async_trait;
use std::process::Command;

use super::ModalityProcessor;

pub struct AudioProcessor {
    config: AudioConfig,
}

impl AudioProcessor {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    fn transcribe(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Segment>> {
        match self.config.engine.as_str() {
            "external" => self.transcribe_external(source_file, bytes),
            _ => Ok(Vec::new()),
        }
    }

    fn transcribe_external(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Segment>> {
        let binary = self.config.decoder_binary.as_ref().ok_or_else(|| {
            ProcessingError::DependencyMissing("audio.decoder_binary not configured".to_string())
        })?;

        let tmp = tempfile::NamedTempFile::new().map_err(ProcessingError::from_io)?;
        std::fs::write(tmp.path(), bytes).map_err(ProcessingError::from_io)?;

        let output = Command::new(binary)
            .arg(tmp.path())
            .output()
            .map_err(|e| ProcessingError::DependencyMissing(format!("decoder spawn failed: {e}")))?;

        if !output.status.success() {
            return Err(ProcessingError::Corrupt {
                source_file: source_file.to_string(),
                detail: format!("decoder exited with {}", output.status),
            }
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut segments = Vec::new();
        for line in stdout.lines() {
            let mut parts = line.splitn(5, '\t');
            if let (Some(start), Some(end), Some(avg_logprob), Some(no_speech_prob), Some(text)) = (
                parts.next(),
                parts.next(),
                parts.next(),
                parts.next(),
                parts.next(),
            ) {
                if let (Ok(start), Ok(end), Ok(avg_logprob), Ok(no_speech_prob)) = (
                    start.parse::<f64>(),
                    end.parse::<f64>(),
                    avg_logprob.parse::<f64>(),
                    no_speech_prob.parse::<f64>(),
                ) {
                    segments.push(Segment {
                        start,
                        end,
                        confidence: transcription_confidence(avg_logprob, no_speech_prob),
                        text: text.to_string(),
                    });
                }
            }
        }
        Ok(segments)
    }
}

/// One decoded speech segment with its timing and derived confidence.
struct Segment {
    start: f64,
    end: f64,
    confidence: f32,
    text: String,
}

/// Confidence for a transcribed segment, derived from the decoder's average
/// log-probability (how sure it was of the tokens it chose) and no-speech
/// probability (how likely the segment is silence/noise rather than
/// speech). Bounded to `[0, 1]`.
fn transcription_confidence(avg_logprob: f64, no_speech_prob: f64) -> f32 {
    let logprob_score = avg_logprob.exp().clamp(0.0, 1.0);
    let speech_score = (1.0 - no_speech_prob).clamp(0.0, 1.0);
    (logprob_score * speech_score) as f32
}

impl ProcessingError {
    fn from_io(e: std::io::Error) -> Self {
        ProcessingError::DependencyMissing(format!("io error: {e}"))
    }
}

#[async_trait]
impl ModalityProcessor for AudioProcessor {
    fn extensions(&self) -> &[&str] {
        &["wav", "mp3", "m4a", "flac"]
    }

    async fn process(&self, source_file: &str, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let segments = self.transcribe(source_file, bytes)?;

        let chunks = segments
            .into_iter()
            .enumerate()
            .map(|(i, segment)| {
                Chunk::new(Modality::Audio, segment.text, source_file, SourceType::UploadedAudio)
                    .with_metadata(meta_keys::SEGMENT_START, segment.start)
                    .with_metadata(meta_keys::SEGMENT_END, segment.end)
                    .with_metadata(meta_keys::ORDER, i)
                    .with_metadata(meta_keys::TRANSCRIPTION_CONFIDENCE, segment.confidence as f64)
                    .with_confidence(segment.confidence)
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_engine_returns_no_segments() {
        let processor = AudioProcessor::new(AudioConfig::default());
        let chunks = processor.process("clip.wav", b"fake-audio-bytes").await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_external_engine_without_binary_errors() {
        let mut config = AudioConfig::default();
        config.engine = "external".to_string();
        let processor = AudioProcessor::new(config);
        let result = processor.process("clip.wav", b"fake-audio-bytes").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_transcription_confidence_penalizes_low_logprob_and_silence() {
        let confident = transcription_confidence(-0.05, 0.01);
        let unsure = transcription_confidence(-2.0, 0.01);
        let silent = transcription_confidence(-0.05, 0.9);
        assert!(confident > unsure);
        assert!(confident > silent);
        assert!((0.0..=1.0).contains(&confident));
        assert!((0.0..=1.0).contains(&unsure));
        assert!((0.0..=1.0).contains(&silent));
    }
}
