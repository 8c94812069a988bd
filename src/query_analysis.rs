//! Turns a raw query string into the signals the retriever and strategist
//! need: which modalities to search, what keywords to boost on, what style
//! of answer to produce.

use crate::chunk::Modality;
use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "that", "this", "with", "from", "have", "has",
    "had", "not", "but", "you", "your", "what", "which", "who", "whom", "when", "where", "why",
    "how", "can", "could", "would", "should", "will", "shall", "does", "did", "about",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Explanation,
    Procedural,
    Comparison,
    Causal,
    Visual,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Standard,
    Academic,
    Executive,
    Eli5,
    Technical,
    Debate,
    Legal,
    Medical,
    Creative,
}

impl Persona {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.unwrap_or("standard") {
            "academic" => Persona::Academic,
            "executive" => Persona::Executive,
            "eli5" => Persona::Eli5,
            "technical" => Persona::Technical,
            "debate" => Persona::Debate,
            "legal" => Persona::Legal,
            "medical" => Persona::Medical,
            "creative" => Persona::Creative,
            _ => Persona::Standard,
        }
    }

    /// `(max_tokens, temperature)` passed to the LLM client.
    pub fn generation_params(&self) -> (u32, f32) {
        match self {
            Persona::Standard => (600, 0.4),
            Persona::Academic => (900, 0.2),
            Persona::Executive => (300, 0.3),
            Persona::Eli5 => (500, 0.6),
            Persona::Technical => (800, 0.2),
            Persona::Debate => (800, 0.5),
            Persona::Legal => (900, 0.1),
            Persona::Medical => (900, 0.1),
            Persona::Creative => (700, 0.8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzedQuery {
    pub query: String,
    pub intents: HashSet<Intent>,
    pub required_modalities: HashSet<Modality>,
    pub keywords: Vec<String>,
    pub persona: Persona,
}

/// Builds an `AnalyzedQuery` from a raw string and optional persona tag.
pub fn analyze(query: &str, persona_tag: Option<&str>) -> AnalyzedQuery {
    let lower = query.to_lowercase();

    let mut intents = HashSet::new();
    if contains_any(&lower, &["why", "cause", "because", "reason"]) {
        intents.insert(Intent::Causal);
    }
    if contains_any(&lower, &["how to", "steps", "procedure", "process"]) {
        intents.insert(Intent::Procedural);
    }
    if contains_any(&lower, &["compare", "versus", "vs", "difference between"]) {
        intents.insert(Intent::Comparison);
    }
    if contains_any(&lower, &["explain", "what is", "describe"]) {
        intents.insert(Intent::Explanation);
    }
    if contains_any(&lower, &["diagram", "chart", "figure", "image", "picture", "visual"]) {
        intents.insert(Intent::Visual);
    }
    if intents.is_empty() {
        intents.insert(Intent::General);
    }

    let mut required_modalities = HashSet::new();
    required_modalities.insert(Modality::Text);
    // Audio transcripts are stored as TEXT chunks and must always be
    // searchable from a text query.
    required_modalities.insert(Modality::Audio);
    if contains_any(&lower, &["diagram", "chart", "figure", "image", "picture", "visual"]) {
        required_modalities.insert(Modality::Image);
    }
    if contains_any(&lower, &["speech", "recording", "audio", "said", "heard"]) {
        required_modalities.insert(Modality::Audio);
    }

    let keywords = extract_keywords(&lower);

    AnalyzedQuery {
        query: query.to_string(),
        intents,
        required_modalities,
        keywords,
        persona: Persona::from_tag(persona_tag),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn extract_keywords(lower_query: &str) -> Vec<String> {
    lower_query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| tok.len() >= 3 && !STOP_WORDS.contains(tok))
        .map(|tok| tok.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_always_required() {
        let analyzed = analyze("What is the meaning of life?", None);
        assert!(analyzed.required_modalities.contains(&Modality::Text));
        assert!(analyzed.required_modalities.contains(&Modality::Audio));
    }

    #[test]
    fn test_visual_keyword_adds_image_modality() {
        let analyzed = analyze("Show me the diagram of the engine", None);
        assert!(analyzed.required_modalities.contains(&Modality::Image));
        assert!(analyzed.intents.contains(&Intent::Visual));
    }

    #[test]
    fn test_keywords_filter_stop_words_and_short_tokens() {
        let analyzed = analyze("What is the difference between A and B?", None);
        assert!(!analyzed.keywords.iter().any(|k| k == "the" || k == "and"));
        assert!(analyzed.keywords.iter().any(|k| k == "difference"));
    }

    #[test]
    fn test_persona_defaults_to_standard() {
        let analyzed = analyze("anything", None);
        assert_eq!(analyzed.persona, Persona::Standard);
    }

    #[test]
    fn test_unknown_persona_tag_falls_back_to_standard() {
        assert_eq!(Persona::from_tag(Some("not-a-real-persona")), Persona::Standard);
    }
}
