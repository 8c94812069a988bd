//! Decides how to respond given confidence and detected conflicts.

use crate::confidence::ConfidenceLevel;
use crate::conflict::Conflict;
use crate::query_analysis::Persona;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStrategy {
    /// No usable evidence; decline to answer.
    Refuse,
    /// Conflicting evidence exists; present both sides, pick no winner.
    ConflictPresentation,
    /// Evidence is only moderately convincing; answer with caveats.
    Caveated,
    /// Strong, uncontested evidence; answer directly.
    Answer,
}

pub fn choose(level: ConfidenceLevel, conflicts: &[Conflict], persona: Persona) -> ResponseStrategy {
    let has_high_severity_conflict = conflicts
        .iter()
        .any(|c| c.severity == crate::conflict::ConflictSeverity::High);

    if level == ConfidenceLevel::Low && !has_high_severity_conflict {
        return ResponseStrategy::Refuse;
    }
    if !conflicts.is_empty() || persona == Persona::Debate {
        return ResponseStrategy::ConflictPresentation;
    }
    match level {
        ConfidenceLevel::High => ResponseStrategy::Answer,
        ConfidenceLevel::Medium => ResponseStrategy::Caveated,
        ConfidenceLevel::Low => ResponseStrategy::Refuse,
    }
}
