//! Records each stage of the query pipeline as an auditable, timed step.

use crate::chunk::SourceReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    QueryAnalysis,
    Retrieval,
    ConfidenceAssessment,
    ConflictDetection,
    ResponseStrategy,
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Answered,
    Caveated,
    ConflictPresented,
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_number: u32,
    pub step_type: StepType,
    pub title: String,
    pub description: String,
    pub details: HashMap<String, String>,
    pub sources_used: Vec<SourceReference>,
    pub duration_ms: u64,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub chain_id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub steps: Vec<ReasoningStep>,
    pub total_duration_ms: u64,
    pub final_decision: FinalDecision,
    pub key_insights: Vec<String>,
}

/// Accumulates `ReasoningStep`s across one query's pipeline run.
pub struct ReasoningChainRecorder {
    chain_id: String,
    query: String,
    timestamp: DateTime<Utc>,
    steps: Vec<ReasoningStep>,
    started_at: Instant,
}

impl ReasoningChainRecorder {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            chain_id: Uuid::new_v4().to_string(),
            query: query.into(),
            timestamp: Utc::now(),
            steps: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Records one completed stage. `title`/`description` are short,
    /// human-readable summaries; `details` holds stage-specific key/value
    /// pairs (e.g. "relevance" => "0.62") for display in an audit view.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        step_type: StepType,
        title: impl Into<String>,
        description: impl Into<String>,
        details: HashMap<String, String>,
        sources_used: Vec<SourceReference>,
        duration_ms: u64,
        status: StepStatus,
    ) {
        self.steps.push(ReasoningStep {
            step_number: self.steps.len() as u32 + 1,
            step_type,
            title: title.into(),
            description: description.into(),
            details,
            sources_used,
            duration_ms,
            status,
        });
    }

    /// Times a synchronous stage and records it, returning the stage's
    /// own result so the orchestrator can branch on it.
    pub fn time_step<T>(
        &mut self,
        step_type: StepType,
        title: impl Into<String>,
        description: impl Into<String>,
        details: HashMap<String, String>,
        sources_used: Vec<SourceReference>,
        status: StepStatus,
        f: impl FnOnce() -> T,
    ) -> T {
        let start = Instant::now();
        let result = f();
        let duration_ms = start.elapsed().as_millis() as u64;
        self.record(step_type, title, description, details, sources_used, duration_ms, status);
        result
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Derives a short list of human-readable bullets from the recorded
    /// steps: one per non-`Completed` step, plus one for the slowest stage.
    fn derive_key_insights(&self) -> Vec<String> {
        let mut insights = Vec::new();

        for step in &self.steps {
            match step.status {
                StepStatus::Warning => {
                    insights.push(format!("{}: completed with a warning", step.title))
                }
                StepStatus::Error => insights.push(format!("{}: failed", step.title)),
                StepStatus::Completed => {}
            }
        }

        if let Some(slowest) = self.steps.iter().max_by_key(|s| s.duration_ms) {
            if slowest.duration_ms > 0 {
                insights.push(format!(
                    "slowest stage: {} ({}ms)",
                    slowest.title, slowest.duration_ms
                ));
            }
        }

        insights
    }

    pub fn finish(self, final_decision: FinalDecision) -> ReasoningChain {
        let key_insights = self.derive_key_insights();
        ReasoningChain {
            chain_id: self.chain_id,
            query: self.query,
            timestamp: self.timestamp,
            total_duration_ms: self.started_at.elapsed().as_millis() as u64,
            steps: self.steps,
            final_decision,
            key_insights,
        }
    }
}
