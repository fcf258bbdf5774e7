//! Prompt templates for pattern-analysis and confidence-scoring requests.
//!
//! Templates mirror the structure of the original coordination-engine's
//! prompt set: one flavor per correlation dimension plus an overall
//! coordination/confidence prompt, each asking for a JSON object in the
//! response so [`crate::llm::extract_json_object`] can recover it.

use crate::domain::AttackSession;

/// Which sub-analysis a prompt is being built for (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Temporal,
    Behavioral,
    Infrastructure,
    Coordination,
}

fn format_sessions(sessions: &[AttackSession]) -> String {
    sessions
        .iter()
        .map(|s| {
            format!(
                "- {} at {} payload=\"{}\"",
                s.source_ip,
                s.timestamp.to_rfc3339(),
                truncate(&s.payload, 200)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let boundary = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
        &s[..boundary]
    }
}

/// Build a prompt for the given analysis kind over a batch of sessions.
pub fn coordination_prompt(kind: AnalysisKind, sessions: &[AttackSession]) -> String {
    let session_block = format_sessions(sessions);

    match kind {
        AnalysisKind::Temporal => format!(
            "You are analyzing honeypot attack sessions for temporal coordination.\n\
             Sessions:\n{session_block}\n\n\
             Assess whether the timing pattern across these sessions suggests \
             a coordinated campaign (tight, regular intervals) versus \
             coincidental or independent activity.\n\
             Respond with a JSON object: {{\"score\": <0..1>, \"reasoning\": <string>}}."
        ),
        AnalysisKind::Behavioral => format!(
            "You are analyzing honeypot attack sessions for behavioral similarity.\n\
             Sessions:\n{session_block}\n\n\
             Assess whether the payloads and techniques across these sessions \
             suggest the same actor or toolkit (shared tactics, techniques, \
             procedures) versus unrelated activity.\n\
             Respond with a JSON object: {{\"score\": <0..1>, \"reasoning\": <string>}}."
        ),
        AnalysisKind::Infrastructure => format!(
            "You are analyzing honeypot attack sessions for infrastructure consistency.\n\
             Sessions:\n{session_block}\n\n\
             Assess whether the network origins of these sessions suggest \
             shared or related infrastructure versus independent sources.\n\
             Respond with a JSON object: {{\"score\": <0..1>, \"reasoning\": <string>}}."
        ),
        AnalysisKind::Coordination => format!(
            "You are assessing overall coordination across a batch of honeypot \
             attack sessions.\n\
             Sessions:\n{session_block}\n\n\
             Respond with a JSON object: {{\"confidence\": <0..1>, \
             \"evidence_breakdown\": {{\"temporal_correlation\": <0..1>, \
             \"behavioral_similarity\": <0..1>, \"infrastructure_clustering\": <0..1>, \
             \"geographic_proximity\": <0..1>, \"payload_similarity\": <0..1>}}, \
             \"reasoning\": <string>, \"key_factors\": [<string>, ...], \
             \"assessment\": <string>}}."
        ),
    }
}

/// Prompt for `score_confidence` (§4.8): asks for a single overall score.
pub fn confidence_scoring_prompt(evidence_summary: &str) -> String {
    format!(
        "Given the following evidence summary for a batch of honeypot attack \
         sessions, provide an overall coordination confidence score.\n\
         Evidence:\n{evidence_summary}\n\n\
         Respond with a line containing the word \"confidence\" followed by a \
         colon and a number between 0 and 1."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_sessions() -> Vec<AttackSession> {
        vec![AttackSession {
            source_ip: "10.0.0.1".to_string(),
            timestamp: Utc::now(),
            payload: "GET /admin HTTP/1.1".to_string(),
            target_port: None,
            protocol: None,
        }]
    }

    #[test]
    fn prompts_embed_session_data() {
        let prompt = coordination_prompt(AnalysisKind::Temporal, &sample_sessions());
        assert!(prompt.contains("10.0.0.1"));
        assert!(prompt.contains("score"));
    }

    #[test]
    fn coordination_prompt_asks_for_full_schema() {
        let prompt = coordination_prompt(AnalysisKind::Coordination, &sample_sessions());
        assert!(prompt.contains("evidence_breakdown"));
        assert!(prompt.contains("key_factors"));
    }

    #[test]
    fn truncate_does_not_split_multibyte_char_at_boundary() {
        // 200 bytes of 'a' followed by a 3-byte UTF-8 character straddling
        // the truncation point must not panic and must stay valid UTF-8.
        let payload: String = "a".repeat(199) + "\u{20ac}\u{20ac}\u{20ac}";
        let sessions = vec![AttackSession {
            source_ip: "10.0.0.1".to_string(),
            timestamp: Utc::now(),
            payload,
            target_port: None,
            protocol: None,
        }];
        let prompt = coordination_prompt(AnalysisKind::Temporal, &sessions);
        assert!(prompt.contains("10.0.0.1"));
    }
}
