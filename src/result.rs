//! Result record, evidence breakdown, and assessment labels (§3, §4.6, §6).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AnalysisStatus;

/// The five canonical evidence dimensions (§4.6, GLOSSARY).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvidenceBreakdown {
    pub temporal_correlation: f64,
    pub behavioral_similarity: f64,
    pub infrastructure_clustering: f64,
    pub geographic_proximity: f64,
    pub payload_similarity: f64,
}

impl EvidenceBreakdown {
    /// Iterate `(dimension name, score, weight)` per §4.6's aggregation.
    pub fn weighted_components(&self) -> [(&'static str, f64, f64); 5] {
        [
            ("temporal_correlation", self.temporal_correlation, 0.25),
            ("behavioral_similarity", self.behavioral_similarity, 0.25),
            ("infrastructure_clustering", self.infrastructure_clustering, 0.20),
            ("geographic_proximity", self.geographic_proximity, 0.15),
            ("payload_similarity", self.payload_similarity, 0.15),
        ]
    }
}

/// Categorical assessment bucket for a final confidence score (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentLabel {
    HighlyCoordinated,
    LikelyCoordinated,
    PossiblyCoordinated,
    LikelyCoincidental,
    Coincidental,
}

impl AssessmentLabel {
    /// The unique bucket of §4.6 for a given confidence (P7).
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            AssessmentLabel::HighlyCoordinated
        } else if confidence >= 0.6 {
            AssessmentLabel::LikelyCoordinated
        } else if confidence >= 0.4 {
            AssessmentLabel::PossiblyCoordinated
        } else if confidence >= 0.2 {
            AssessmentLabel::LikelyCoincidental
        } else {
            AssessmentLabel::Coincidental
        }
    }
}

/// The assembled final output of the Confidence Scorer (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAssessment {
    pub confidence: f64,
    pub evidence_breakdown: EvidenceBreakdown,
    pub assessment: AssessmentLabel,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    pub model_used: Option<String>,
}

/// Builds the reasoning string: dimensions >0.7 as "strong", <0.3 as "weak",
/// followed by the label (§4.6).
pub fn build_reasoning(evidence: &EvidenceBreakdown, label: AssessmentLabel) -> String {
    let mut strong = Vec::new();
    let mut weak = Vec::new();

    for (name, score, _weight) in evidence.weighted_components() {
        if score > 0.7 {
            strong.push(name);
        } else if score < 0.3 {
            weak.push(name);
        }
    }

    let mut parts = Vec::new();
    if !strong.is_empty() {
        parts.push(format!("strong evidence in: {}", strong.join(", ")));
    }
    if !weak.is_empty() {
        parts.push(format!("weak evidence in: {}", weak.join(", ")));
    }
    parts.push(format!("overall assessment: {}", label_tag(label)));

    parts.join("; ")
}

fn label_tag(label: AssessmentLabel) -> &'static str {
    match label {
        AssessmentLabel::HighlyCoordinated => "highly_coordinated",
        AssessmentLabel::LikelyCoordinated => "likely_coordinated",
        AssessmentLabel::PossiblyCoordinated => "possibly_coordinated",
        AssessmentLabel::LikelyCoincidental => "likely_coincidental",
        AssessmentLabel::Coincidental => "coincidental",
    }
}

/// Returned from cache or freshly computed, by analysis id (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordination_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceBreakdown>,
    pub enrichment_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_factors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl AnalysisResult {
    pub fn queued(analysis_id: Uuid) -> Self {
        Self {
            analysis_id,
            status: AnalysisStatus::Queued,
            coordination_confidence: None,
            evidence: None,
            enrichment_applied: false,
            reasoning: None,
            key_factors: None,
            model_used: None,
        }
    }

    pub fn processing(analysis_id: Uuid) -> Self {
        Self {
            status: AnalysisStatus::Processing,
            ..Self::queued(analysis_id)
        }
    }
}
