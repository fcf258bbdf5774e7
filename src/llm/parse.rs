//! Response parsing for the LLM client (§4.8): structured JSON extraction
//! with a keyword-cue fallback when the model doesn't return valid JSON.

use serde::Deserialize;

use crate::result::EvidenceBreakdown;

/// Extract the JSON object between the first `{` and the last `}` in `text`
/// (§4.8: `analyze_coordination` parsing contract).
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parsed output of `analyze_coordination` (§4.8), tagged with whether it
/// came from a valid structured response or the keyword-cue fallback.
#[derive(Debug, Clone)]
pub struct CoordinationAnalysis {
    pub confidence: f64,
    pub evidence_breakdown: EvidenceBreakdown,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    pub model: String,
    pub synthesized: bool,
}

#[derive(Debug, Deserialize)]
struct RawEvidenceBreakdown {
    #[serde(default)]
    temporal_correlation: f64,
    #[serde(default)]
    behavioral_similarity: f64,
    #[serde(default)]
    infrastructure_clustering: f64,
    #[serde(default)]
    geographic_proximity: f64,
    #[serde(default)]
    payload_similarity: f64,
}

#[derive(Debug, Deserialize)]
struct RawCoordinationAnalysis {
    confidence: f64,
    #[serde(default)]
    evidence_breakdown: Option<RawEvidenceBreakdown>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    key_factors: Vec<String>,
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Parse a raw generation `text` into a [`CoordinationAnalysis`], falling
/// back to keyword-cue extraction when no valid JSON schema is present
/// (§4.8). The fallback is clearly tagged via `synthesized = true`.
pub fn parse_coordination_analysis(text: &str, model: &str) -> CoordinationAnalysis {
    if let Some(candidate) = extract_json_object(text) {
        if let Ok(raw) = serde_json::from_str::<RawCoordinationAnalysis>(candidate) {
            let evidence = raw.evidence_breakdown.unwrap_or(RawEvidenceBreakdown {
                temporal_correlation: 0.0,
                behavioral_similarity: 0.0,
                infrastructure_clustering: 0.0,
                geographic_proximity: 0.0,
                payload_similarity: 0.5,
            });
            return CoordinationAnalysis {
                confidence: clamp01(raw.confidence),
                evidence_breakdown: EvidenceBreakdown {
                    temporal_correlation: clamp01(evidence.temporal_correlation),
                    behavioral_similarity: clamp01(evidence.behavioral_similarity),
                    infrastructure_clustering: clamp01(evidence.infrastructure_clustering),
                    geographic_proximity: clamp01(evidence.geographic_proximity),
                    payload_similarity: clamp01(evidence.payload_similarity),
                },
                reasoning: raw.reasoning,
                key_factors: raw.key_factors.into_iter().take(5).collect(),
                model: model.to_string(),
                synthesized: false,
            };
        }
    }

    synthesize_from_keywords(text, model)
}

/// Coarse fallback: derive a confidence from keyword cues in unstructured
/// text (§4.8). Clearly tagged via `synthesized = true`.
fn synthesize_from_keywords(text: &str, model: &str) -> CoordinationAnalysis {
    let lower = text.to_lowercase();
    let confidence = if lower.contains("highly") {
        0.85
    } else if lower.contains("likely") {
        0.65
    } else if lower.contains("possibly") {
        0.5
    } else if lower.contains("coincidental") {
        0.15
    } else {
        0.5
    };

    CoordinationAnalysis {
        confidence,
        evidence_breakdown: EvidenceBreakdown {
            temporal_correlation: confidence,
            behavioral_similarity: confidence,
            infrastructure_clustering: confidence,
            geographic_proximity: confidence,
            payload_similarity: 0.5,
        },
        reasoning: text.chars().take(500).collect(),
        key_factors: Vec::new(),
        model: model.to_string(),
        synthesized: true,
    }
}

#[derive(Debug, Deserialize)]
struct RawScoreReasoning {
    score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse a single-dimension sub-analysis response (§4.4's `{score,
/// reasoning}` schema used by the temporal/behavioral/infrastructure
/// prompts) — distinct from the full five-dimension schema above.
pub fn parse_score_reasoning(text: &str) -> Option<(f64, String)> {
    let candidate = extract_json_object(text)?;
    let raw: RawScoreReasoning = serde_json::from_str(candidate).ok()?;
    Some((clamp01(raw.score), raw.reasoning))
}

/// Parse `score_confidence`'s response: a float on a line containing
/// "confidence" and a colon, clamped to [0,1] (§4.8).
pub fn parse_confidence_line(text: &str) -> Option<f64> {
    text.lines()
        .find(|line| line.to_lowercase().contains("confidence") && line.contains(':'))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|rest| {
            rest.chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect::<String>()
                .parse::<f64>()
                .ok()
        })
        .map(clamp01)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_between_braces() {
        let text = "here is the result { \"a\": 1 } trailing text";
        assert_eq!(extract_json_object(text), Some("{ \"a\": 1 }"));
    }

    #[test]
    fn no_braces_returns_none() {
        assert_eq!(extract_json_object("no braces here"), None);
    }

    #[test]
    fn parses_well_formed_schema() {
        let text = r#"{"confidence": 0.9, "evidence_breakdown": {"temporal_correlation": 0.8, "behavioral_similarity": 0.7, "infrastructure_clustering": 0.6, "geographic_proximity": 0.5, "payload_similarity": 0.5}, "reasoning": "strong timing", "key_factors": ["burst"]}"#;
        let result = parse_coordination_analysis(text, "llama3");
        assert!(!result.synthesized);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.evidence_breakdown.temporal_correlation, 0.8);
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let text = r#"{"confidence": 1.5, "reasoning": "x"}"#;
        let result = parse_coordination_analysis(text, "llama3");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn falls_back_on_malformed_json() {
        let text = "The sessions are likely coordinated based on timing.";
        let result = parse_coordination_analysis(text, "llama3");
        assert!(result.synthesized);
        assert!((result.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn confidence_line_parses_and_clamps() {
        assert_eq!(parse_confidence_line("confidence: 0.73"), Some(0.73));
        assert_eq!(parse_confidence_line("confidence: 2.0"), Some(1.0));
        assert_eq!(parse_confidence_line("no relevant line here"), None);
    }

    #[test]
    fn score_reasoning_parses_dimension_schema() {
        let text = r#"noise before {"score": 0.6, "reasoning": "tight window"} noise after"#;
        let (score, reasoning) = parse_score_reasoning(text).unwrap();
        assert_eq!(score, 0.6);
        assert_eq!(reasoning, "tight window");
    }

    #[test]
    fn score_reasoning_none_on_malformed() {
        assert!(parse_score_reasoning("not json at all").is_none());
    }
}
