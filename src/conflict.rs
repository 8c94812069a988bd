//! Detects contradictory claims across distinct sources in the retrieved set.

use crate::embedding::EmbeddingManager;
use crate::retrieval::RetrievedChunk;

const CLAIM_SIMILARITY_THRESHOLD: f32 = 0.6;
const NEGATIONS: &[&str] = &["not", "no", "never", "n't", "isn't", "doesn't", "won't", "cannot"];
const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("increase", "decrease"),
    ("increases", "decreases"),
    ("more", "less"),
    ("higher", "lower"),
    ("safe", "unsafe"),
    ("true", "false"),
    ("supports", "contradicts"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub description: String,
    pub perspectives: Vec<(String, String)>,
    pub severity: ConflictSeverity,
}

struct Claim<'a> {
    source_file: &'a str,
    sentence: String,
    confidence: f32,
}

/// Extracts claim-like sentences: those carrying a digit, a unit-like
/// suffix, or an absolute term ("always"/"never"/"all"/"none").
fn extract_claims(chunks: &[RetrievedChunk]) -> Vec<Claim<'_>> {
    let mut claims = Vec::new();
    for retrieved in chunks {
        for sentence in retrieved.chunk.content.split(['.', '!', '?']) {
            let trimmed = sentence.trim();
            if trimmed.is_empty() {
                continue;
            }
            if looks_like_claim(trimmed) {
                claims.push(Claim {
                    source_file: retrieved.chunk.source_file.as_str(),
                    sentence: trimmed.to_string(),
                    confidence: retrieved.chunk.confidence,
                });
            }
        }
    }
    claims
}

fn looks_like_claim(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    sentence.chars().any(|c| c.is_ascii_digit())
        || contains_any(&lower, &["always", "never", "all", "none", "every", "must"])
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn has_numeric_mismatch(a: &str, b: &str) -> bool {
    let numbers = |s: &str| -> Vec<String> {
        s.split(|c: char| !c.is_ascii_digit() && c != '.')
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    };
    let na = numbers(a);
    let nb = numbers(b);
    !na.is_empty() && !nb.is_empty() && na != nb
}

fn has_negation_mismatch(a: &str, b: &str) -> bool {
    let negated = |s: &str| {
        let lower = s.to_lowercase();
        NEGATIONS.iter().any(|n| lower.contains(n))
    };
    negated(a) != negated(b)
}

fn has_antonym_mismatch(a: &str, b: &str) -> bool {
    let la = a.to_lowercase();
    let lb = b.to_lowercase();
    ANTONYM_PAIRS
        .iter()
        .any(|(x, y)| (la.contains(x) && lb.contains(y)) || (la.contains(y) && lb.contains(x)))
}

/// Detects conflicting claims. Claim-pair similarity is the embedding
/// cosine similarity of the containing sentences, using the same
/// embedding manager the retriever embeds queries with — a claim sentence
/// whose embedding fails to compute (backend error) is treated as
/// similar to nothing and never conflicts.
pub async fn detect(chunks: &[RetrievedChunk], embedding: &EmbeddingManager) -> Vec<Conflict> {
    let claims = extract_claims(chunks);
    let mut sentence_embeddings = Vec::with_capacity(claims.len());
    for claim in &claims {
        sentence_embeddings.push(embedding.embed_query(&claim.sentence).await.ok());
    }

    let mut conflicts = Vec::new();
    let mut seen_pairs = std::collections::HashSet::new();

    for i in 0..claims.len() {
        for j in (i + 1)..claims.len() {
            let a = &claims[i];
            let b = &claims[j];
            if a.source_file == b.source_file {
                continue;
            }

            let pair_key = if a.sentence <= b.sentence {
                (a.sentence.clone(), b.sentence.clone())
            } else {
                (b.sentence.clone(), a.sentence.clone())
            };
            if !seen_pairs.insert(pair_key) {
                continue;
            }

            let similarity = match (&sentence_embeddings[i], &sentence_embeddings[j]) {
                (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
                _ => 0.0,
            };
            if similarity <= CLAIM_SIMILARITY_THRESHOLD {
                continue;
            }

            let numeric_mismatch = has_numeric_mismatch(&a.sentence, &b.sentence);
            let textual_mismatch = has_negation_mismatch(&a.sentence, &b.sentence) || has_antonym_mismatch(&a.sentence, &b.sentence);
            if !numeric_mismatch && !textual_mismatch {
                continue;
            }

            let severity = if numeric_mismatch && a.confidence >= 0.7 && b.confidence >= 0.7 {
                ConflictSeverity::High
            } else if textual_mismatch {
                ConflictSeverity::Medium
            } else {
                ConflictSeverity::Low
            };

            conflicts.push(Conflict {
                description: format!(
                    "\"{}\" ({}) conflicts with \"{}\" ({})",
                    a.sentence, a.source_file, b.sentence, b.source_file
                ),
                perspectives: vec![
                    (a.source_file.to_string(), a.sentence.clone()),
                    (b.source_file.to_string(), b.sentence.clone()),
                ],
                severity,
            });
        }
    }

    conflicts
}
