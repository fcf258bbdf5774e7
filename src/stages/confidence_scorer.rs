//! Confidence Scorer (§4.6): assembles the five-dimension evidence vector,
//! aggregates a weighted mean, optionally lets the LLM override it, and
//! derives the assessment label and reasoning string.

use tracing::debug;

use crate::llm::{confidence_scoring_prompt, GenerateOptions};
use crate::result::{build_reasoning, AssessmentLabel, EvidenceBreakdown, FinalAssessment};
use crate::state::{AnalysisState, CorrelationDimension};

use super::Services;

fn assemble_evidence(state: &AnalysisState) -> EvidenceBreakdown {
    let correlation = &state.intermediate.correlation_results;
    let enrichment = &state.intermediate.enrichment_data;

    let temporal_correlation = correlation
        .get(&CorrelationDimension::Temporal)
        .map(|r| r.score)
        .unwrap_or(0.0);
    let behavioral_similarity = correlation
        .get(&CorrelationDimension::Behavioral)
        .map(|r| r.score)
        .unwrap_or(0.0);
    let infrastructure_clustering = enrichment.get("infrastructure_clustering").copied().unwrap_or_else(|| {
        correlation
            .get(&CorrelationDimension::Infrastructure)
            .map(|r| r.score)
            .unwrap_or(0.0)
    });
    let geographic_proximity = enrichment.get("geographic_proximity").copied().unwrap_or(0.0);

    EvidenceBreakdown {
        temporal_correlation,
        behavioral_similarity,
        infrastructure_clustering,
        geographic_proximity,
        // Known gap (§9 open question): no payload-similarity source is
        // defined yet, so this stays the fixed placeholder.
        payload_similarity: 0.5,
    }
}

/// Weighted mean over the five canonical dimensions (§4.6). Deterministic
/// given fixed weights (P3); the five weights here always sum to 1.0, but
/// the zero-total-weight guard is kept for the general case described in
/// the spec (unrecognized extra dimensions default to weight 0.10).
fn weighted_mean(evidence: &EvidenceBreakdown) -> f64 {
    let components = evidence.weighted_components();
    let total_weight: f64 = components.iter().map(|(_, _, weight)| weight).sum();
    if total_weight == 0.0 {
        return 0.5;
    }
    components.iter().map(|(_, score, weight)| score * weight).sum::<f64>() / total_weight
}

fn evidence_summary(evidence: &EvidenceBreakdown) -> String {
    evidence
        .weighted_components()
        .iter()
        .map(|(name, score, _)| format!("{name}: {score:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run the Confidence Scorer stage: writes `final_assessment`.
pub async fn score_confidence(mut state: AnalysisState, services: &Services) -> AnalysisState {
    let evidence = assemble_evidence(&state);
    let fallback_confidence = weighted_mean(&evidence);

    let prompt = confidence_scoring_prompt(&evidence_summary(&evidence));
    let options = GenerateOptions {
        timeout: services.config.llm_timeout,
        max_retries: services.config.llm_max_retries,
        ..GenerateOptions::default()
    };

    let (confidence, model_used) = match services.llm.score_confidence(&prompt, &services.config.llm_model, &options).await {
        Some(score) => (score.clamp(0.0, 1.0), Some(services.config.llm_model.clone())),
        None => {
            debug!("confidence scorer: llm override unavailable, using weighted mean");
            (fallback_confidence, None)
        }
    };

    let label = AssessmentLabel::from_confidence(confidence);
    let reasoning = build_reasoning(&evidence, label);

    state.final_assessment = Some(FinalAssessment {
        confidence,
        evidence_breakdown: evidence,
        assessment: label,
        reasoning,
        key_factors: Vec::new(),
        model_used,
    });
    state.record_step("confidence_scorer");
    state
}
