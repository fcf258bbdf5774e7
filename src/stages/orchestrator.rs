//! Orchestrator (§4.3): computes routing. Pure function of the input — no
//! failure modes, no collaborators.

use crate::state::AnalysisState;

const SHORT_INTERVAL_SECS: i64 = 300;

/// `needs_deep_analysis` (§4.3): cheap, deterministic four-step algorithm.
fn needs_deep_analysis(state: &AnalysisState) -> bool {
    let sessions = &state.input.attack_sessions;
    if sessions.len() < 3 {
        return false;
    }

    let distinct_addrs = state.input.distinct_source_addresses();
    if distinct_addrs.len() == 1 {
        return false;
    }

    let mut timestamps: Vec<_> = sessions.iter().map(|s| s.timestamp).collect();
    timestamps.sort();
    if timestamps.len() < 3 {
        return false;
    }

    let intervals: Vec<i64> = timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds())
        .collect();
    let short_count = intervals.iter().filter(|&&secs| secs < SHORT_INTERVAL_SECS).count();

    (short_count as f64) > 0.5 * (intervals.len() as f64)
}

/// Build `analysis_plan` (§4.3): always starts with `pattern_analysis`, adds
/// `tool_coordination`/`confidence_scoring` when deep analysis is needed,
/// and `elasticsearch_enrichment` when the requested depth is `deep`.
fn analysis_plan(needs_deep: bool, depth_is_deep: bool) -> Vec<String> {
    let mut plan = vec!["pattern_analysis".to_string()];
    if needs_deep {
        plan.push("tool_coordination".to_string());
        plan.push("confidence_scoring".to_string());
    }
    if depth_is_deep {
        plan.push("elasticsearch_enrichment".to_string());
    }
    plan
}

/// Run the Orchestrator stage: sets `routing.needs_deep_analysis` and
/// `routing.analysis_plan`, and records the stage completion.
pub async fn orchestrate(mut state: AnalysisState) -> AnalysisState {
    let needs_deep = needs_deep_analysis(&state);
    state.routing.needs_deep_analysis = needs_deep;
    state.routing.analysis_plan = analysis_plan(needs_deep, state.input.analysis_depth.is_deep());
    state.record_step("orchestrator");
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisDepth, AnalysisRequest, AttackSession};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session(ip: &str, ts: chrono::DateTime<Utc>) -> AttackSession {
        AttackSession {
            source_ip: ip.to_string(),
            timestamp: ts,
            payload: "GET /admin HTTP/1.1".to_string(),
            target_port: None,
            protocol: None,
        }
    }

    fn state_with(sessions: Vec<AttackSession>, depth: AnalysisDepth) -> AnalysisState {
        let request = AnalysisRequest {
            attack_sessions: sessions,
            analysis_depth: depth,
            callback_url: None,
        };
        AnalysisState::new(Uuid::new_v4(), request)
    }

    #[tokio::test]
    async fn fewer_than_three_sessions_is_not_deep() {
        let now = Utc::now();
        let state = state_with(
            vec![session("10.0.0.1", now), session("10.0.0.2", now)],
            AnalysisDepth::Standard,
        );
        let state = orchestrate(state).await;
        assert!(!state.routing.needs_deep_analysis);
        assert_eq!(state.routing.analysis_plan, vec!["pattern_analysis"]);
    }

    #[tokio::test]
    async fn single_source_is_not_deep() {
        let now = Utc::now();
        let state = state_with(
            vec![
                session("10.0.0.1", now),
                session("10.0.0.1", now + Duration::seconds(10)),
                session("10.0.0.1", now + Duration::seconds(20)),
            ],
            AnalysisDepth::Standard,
        );
        let state = orchestrate(state).await;
        assert!(!state.routing.needs_deep_analysis);
    }

    #[tokio::test]
    async fn tight_burst_across_sources_is_deep() {
        let now = Utc::now();
        let state = state_with(
            vec![
                session("10.0.0.1", now),
                session("10.0.0.2", now + Duration::seconds(5)),
                session("10.0.0.3", now + Duration::seconds(10)),
                session("10.0.0.4", now + Duration::seconds(15)),
                session("10.0.0.5", now + Duration::seconds(20)),
            ],
            AnalysisDepth::Deep,
        );
        let state = orchestrate(state).await;
        assert!(state.routing.needs_deep_analysis);
        assert!(state.routing.analysis_plan.contains(&"tool_coordination".to_string()));
        assert!(state
            .routing
            .analysis_plan
            .contains(&"elasticsearch_enrichment".to_string()));
    }

    #[tokio::test]
    async fn widely_spaced_sessions_are_not_deep() {
        let now = Utc::now();
        let state = state_with(
            vec![
                session("10.0.0.1", now),
                session("10.0.0.2", now + Duration::hours(1)),
                session("10.0.0.3", now + Duration::hours(2)),
            ],
            AnalysisDepth::Standard,
        );
        let state = orchestrate(state).await;
        assert!(!state.routing.needs_deep_analysis);
    }
}
