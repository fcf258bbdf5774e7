//! Per-analysis mutable state (§3), owned by exactly one worker at a time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::AnalysisRequest;
use crate::result::FinalAssessment;

/// Lifecycle status of an analysis (§3 lifecycle, §6 wire contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// How a correlation sub-score was produced (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    Llm,
    Fallback,
}

/// One dimension of the pattern analyzer's output (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub score: f64,
    pub evidence: String,
    pub reasoning: String,
    pub method: ScoreMethod,
}

impl CorrelationResult {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            score: 0.5,
            evidence: String::new(),
            reasoning: reason.into(),
            method: ScoreMethod::Fallback,
        }
    }
}

/// Correlation dimension keys used in `correlation_results` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationDimension {
    Temporal,
    Behavioral,
    Infrastructure,
}

/// A single completed or failed stage, recorded for `processing_steps` (I4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub step_name: String,
    pub completed_at: DateTime<Utc>,
}

/// A recorded pipeline error (§7 propagation policy: captured, never raised
/// across stage boundaries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Routing decisions computed by the Orchestrator (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Routing {
    pub needs_deep_analysis: bool,
    pub analysis_plan: Vec<String>,
}

/// Intermediate outputs accumulated as stages run (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intermediate {
    pub correlation_results: HashMap<CorrelationDimension, CorrelationResult>,
    pub tool_results: HashMap<String, serde_json::Value>,
    pub enrichment_data: HashMap<String, f64>,
}

/// Metadata tracked throughout the analysis lifecycle (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub processing_steps: Vec<ProcessingStep>,
    pub errors: Vec<RecordedError>,
    pub user_id: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            processing_steps: Vec::new(),
            errors: Vec::new(),
            user_id: None,
        }
    }
}

/// The full per-analysis mutable state, moved into and out of each stage
/// (§4.2 execution contract): the engine owns it at rest, transfers it by
/// move into a stage for the duration of that call, and receives it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
    pub input: AnalysisRequest,
    pub routing: Routing,
    pub intermediate: Intermediate,
    pub final_assessment: Option<FinalAssessment>,
    pub metadata: Metadata,
}

impl AnalysisState {
    /// Construct the initial state for a freshly admitted analysis (§4.1).
    pub fn new(analysis_id: Uuid, input: AnalysisRequest) -> Self {
        Self {
            analysis_id,
            status: AnalysisStatus::Queued,
            input,
            routing: Routing::default(),
            intermediate: Intermediate::default(),
            final_assessment: None,
            metadata: Metadata::default(),
        }
    }

    /// Record a stage completion (I4: append-only, ordered by completion).
    pub fn record_step(&mut self, step_name: impl Into<String>) {
        self.metadata.processing_steps.push(ProcessingStep {
            step_name: step_name.into(),
            completed_at: Utc::now(),
        });
    }

    /// Record a recoverable stage error (§7: captured, not raised further).
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.metadata.errors.push(RecordedError {
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    /// `get_processing_time`: duration between workflow start and end (§4.2).
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.metadata.start_time, self.metadata.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
