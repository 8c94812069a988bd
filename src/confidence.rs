//! Confidence scoring over a retrieved chunk set.

use crate::retrieval::RetrievedChunk;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

const HIGH_THRESHOLD: f32 = 0.7;
const MEDIUM_THRESHOLD: f32 = 0.4;
const CROSS_MODAL_BONUS_PER_MODALITY: f32 = 0.1;
const CROSS_MODAL_BONUS_CAP: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct ConfidenceBreakdown {
    pub score: f32,
    pub level: ConfidenceLevel,
    pub relevance: f32,
    pub source_quality: f32,
    pub diversity: f32,
    pub cross_modal_bonus: f32,
    pub strongest_factor: &'static str,
    pub weakest_factor: &'static str,
    pub actionable_tips: Vec<String>,
}

pub fn score(chunks: &[RetrievedChunk], top_k: usize) -> ConfidenceBreakdown {
    if chunks.is_empty() {
        return ConfidenceBreakdown {
            score: 0.0,
            level: ConfidenceLevel::Low,
            relevance: 0.0,
            source_quality: 0.0,
            diversity: 0.0,
            cross_modal_bonus: 0.0,
            strongest_factor: "none",
            weakest_factor: "relevance",
            actionable_tips: vec!["no evidence was retrieved; broaden or rephrase the query".to_string()],
        };
    }

    let n = chunks.len() as f32;
    let relevance = chunks.iter().map(|c| c.relevance_score).sum::<f32>() / n;
    let source_quality = chunks.iter().map(|c| c.chunk.confidence).sum::<f32>() / n;

    let unique_sources: HashSet<&str> = chunks.iter().map(|c| c.chunk.source_file.as_str()).collect();
    let diversity = (unique_sources.len() as f32 / top_k.max(1) as f32).min(1.0);

    let distinct_modalities = chunks.iter().map(|c| c.chunk.modality).collect::<HashSet<_>>().len();
    let cross_modal_bonus =
        (CROSS_MODAL_BONUS_PER_MODALITY * (distinct_modalities.saturating_sub(1)) as f32).min(CROSS_MODAL_BONUS_CAP);

    let raw_score = 0.5 * relevance + 0.3 * source_quality + 0.1 * diversity + cross_modal_bonus;
    let score = raw_score.clamp(0.0, 1.0);

    let level = if score >= HIGH_THRESHOLD {
        ConfidenceLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    let factors = [
        ("relevance", relevance),
        ("source_quality", source_quality),
        ("diversity", diversity),
        ("cross_modal_bonus", cross_modal_bonus),
    ];
    let strongest_factor = factors.iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap()).unwrap().0;
    let weakest_factor = factors.iter().min_by(|a, b| a.1.partial_cmp(&b.1).unwrap()).unwrap().0;

    let mut actionable_tips = Vec::new();
    if relevance < MEDIUM_THRESHOLD {
        actionable_tips.push("retrieved evidence is only weakly related; try a more specific query".to_string());
    }
    if diversity < 0.5 {
        actionable_tips.push("most evidence comes from a single source; corroborate with more documents".to_string());
    }

    ConfidenceBreakdown {
        score,
        level,
        relevance,
        source_quality,
        diversity,
        cross_modal_bonus,
        strongest_factor,
        weakest_factor,
        actionable_tips,
    }
}
