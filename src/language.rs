//! Language detection and the translate-in/translate-out sandwich around
//! retrieval and generation.

use crate::config::TranslationConfig;
use crate::error::{Result, TranslationFailure};
use crate::llm::{user_message, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// ISO 639-1-ish language code; "en" is the pipeline's working language.
pub type LanguageCode = String;

/// `whatlang` reports ISO 639-3 codes (e.g. "eng", not "en").
pub const WORKING_LANGUAGE: &str = "eng";

/// Display name and emoji flag for a supported language code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub flag: String,
}

/// Finite, enumerated set of languages the translation sandwich is
/// prepared to detect and translate to/from. Translating to a code outside
/// this set still goes through the LLM (it doesn't reject unknown codes),
/// but this is the list advertised to callers via `supported_languages`.
const SUPPORTED_LANGUAGES: &[(&str, &str, &str)] = &[
    ("eng", "English", "🇬🇧"),
    ("hin", "Hindi", "🇮🇳"),
    ("spa", "Spanish", "🇪🇸"),
    ("fra", "French", "🇫🇷"),
    ("deu", "German", "🇩🇪"),
    ("cmn", "Mandarin Chinese", "🇨🇳"),
    ("jpn", "Japanese", "🇯🇵"),
    ("ara", "Arabic", "🇸🇦"),
    ("por", "Portuguese", "🇵🇹"),
    ("rus", "Russian", "🇷🇺"),
];

/// Detects the dominant language of a piece of text.
pub fn detect_language(text: &str, confidence_floor: f32) -> Option<LanguageCode> {
    let info = whatlang::detect(text)?;
    if info.confidence() < confidence_floor as f64 {
        return None;
    }
    Some(info.lang().code().to_string())
}

/// A translation backend. Implementations may call out to an LLM, a
/// dedicated translation API, or (in tests) return canned output.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String>;
}

/// Prompts an `LlmClient` to translate, reusing the same provider chain the
/// pipeline already has configured for generation.
pub struct LlmTranslationProvider {
    client: Arc<dyn LlmClient>,
}

impl LlmTranslationProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranslationProvider for LlmTranslationProvider {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        if from == to {
            return Ok(text.to_string());
        }
        let prompt = format!(
            "Translate the following text from {from} to {to}. \
             Output only the translation, no commentary.\n\n{text}"
        );
        let response = self
            .client
            .generate(&[user_message(prompt)], 800, 0.1)
            .await
            .map_err(|e| TranslationFailure::Unavailable {
                from: from.to_string(),
                to: to.to_string(),
                reason: e.to_string(),
            })?;
        Ok(response.text.trim().to_string())
    }
}

/// Coordinates detection + the two-way translation sandwich. A failure to
/// translate is non-fatal: the caller proceeds in the original language
/// rather than failing the whole query (see `CoreError::Translation`
/// being recoverable at the orchestrator level).
pub struct LanguageService {
    provider: Arc<dyn TranslationProvider>,
    config: TranslationConfig,
}

impl LanguageService {
    pub fn new(provider: Arc<dyn TranslationProvider>, config: TranslationConfig) -> Self {
        Self { provider, config }
    }

    /// Detects the query's language and, if translation is enabled and the
    /// language isn't already the working language, translates it in.
    /// Returns `(text_for_pipeline, detected_language)`.
    pub async fn ingest_query(&self, query: &str) -> (String, LanguageCode) {
        let detected = detect_language(query, self.config.detection_confidence_floor)
            .unwrap_or_else(|| WORKING_LANGUAGE.to_string());

        if !self.config.enabled || detected == WORKING_LANGUAGE {
            return (query.to_string(), detected);
        }

        match self.provider.translate(query, &detected, WORKING_LANGUAGE).await {
            Ok(translated) => (translated, detected),
            Err(e) => {
                warn!(error = %e, lang = %detected, "query translation failed, proceeding untranslated");
                (query.to_string(), detected)
            }
        }
    }

    /// Translates the generated answer back to `language`, if needed.
    pub async fn emit_answer(&self, answer: &str, language: &str) -> String {
        if !self.config.enabled || language == WORKING_LANGUAGE {
            return answer.to_string();
        }
        match self.provider.translate(answer, WORKING_LANGUAGE, language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(error = %e, lang = %language, "answer translation failed, returning untranslated");
                answer.to_string()
            }
        }
    }

    pub fn supported_languages(&self) -> Vec<LanguageInfo> {
        SUPPORTED_LANGUAGES
            .iter()
            .map(|(code, name, flag)| LanguageInfo {
                code: code.to_string(),
                name: name.to_string(),
                flag: flag.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl TranslationProvider for EchoProvider {
        async fn translate(&self, text: &str, _from: &str, to: &str) -> Result<String> {
            Ok(format!("[{to}] {text}"))
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TranslationProvider for FailingProvider {
        async fn translate(&self, _text: &str, from: &str, to: &str) -> Result<String> {
            Err(TranslationFailure::Unavailable {
                from: from.to_string(),
                to: to.to_string(),
                reason: "offline".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn test_detect_language_english() {
        let lang = detect_language("The quick brown fox jumps over the lazy dog.", 0.1);
        assert_eq!(lang.as_deref(), Some("eng"));
    }

    #[tokio::test]
    async fn test_ingest_query_skips_translation_for_english() {
        let service = LanguageService::new(Arc::new(EchoProvider), TranslationConfig::default());
        let (text, lang) = service.ingest_query("What is the capital of France?").await;
        assert_eq!(text, "What is the capital of France?");
        assert_eq!(lang, "eng");
    }

    #[tokio::test]
    async fn test_emit_answer_falls_back_on_failure() {
        let service = LanguageService::new(Arc::new(FailingProvider), TranslationConfig::default());
        let answer = service.emit_answer("hello", "fr").await;
        assert_eq!(answer, "hello");
    }

    #[tokio::test]
    async fn test_disabled_translation_is_a_no_op() {
        let config = TranslationConfig {
            enabled: false,
            ..TranslationConfig::default()
        };
        let service = LanguageService::new(Arc::new(EchoProvider), config);
        let (text, _) = service.ingest_query("Bonjour le monde").await;
        assert_eq!(text, "Bonjour le monde");
    }

    #[test]
    fn test_supported_languages_are_finite_and_carry_a_flag() {
        let service = LanguageService::new(Arc::new(EchoProvider), TranslationConfig::default());
        let supported = service.supported_languages();
        assert!(supported.iter().any(|l| l.code == "eng" && l.name == "English"));
        assert!(supported.iter().all(|l| !l.flag.is_empty()));
    }
}
