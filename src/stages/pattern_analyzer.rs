//! Pattern Analyzer (§4.4): three independent, concurrent sub-analyses
//! (temporal, behavioral, infrastructure), each delegated to the LLM client
//! with a distinct prompt flavor and falling back to a neutral score on any
//! failure. Never raises: failures are absorbed into the state.

use tracing::debug;

use crate::domain::AttackSession;
use crate::llm::{coordination_prompt, parse_score_reasoning, AnalysisKind, GenerateOptions};
use crate::state::{AnalysisState, CorrelationDimension, CorrelationResult, ScoreMethod};

use super::Services;

async fn run_dimension(
    kind: AnalysisKind,
    sessions: &[AttackSession],
    services: &Services,
) -> CorrelationResult {
    let prompt = coordination_prompt(kind, sessions);
    let options = GenerateOptions {
        timeout: services.config.llm_timeout,
        max_retries: services.config.llm_max_retries,
        ..GenerateOptions::default()
    };

    match services.llm.generate(&services.config.llm_model, &prompt, &options).await {
        Ok(response) => match parse_score_reasoning(&response.text) {
            Some((score, reasoning)) => CorrelationResult {
                score,
                evidence: response.text,
                reasoning,
                method: ScoreMethod::Llm,
            },
            None => {
                debug!(dimension = ?kind, "pattern analyzer: unparseable llm response, falling back");
                CorrelationResult::fallback("llm response did not match expected schema")
            }
        },
        Err(err) => {
            debug!(dimension = ?kind, error = %err, "pattern analyzer: llm call failed, falling back");
            CorrelationResult::fallback(err.to_string())
        }
    }
}

/// Run the Pattern Analyzer stage: writes `intermediate.correlation_results`
/// for the temporal, behavioral, and infrastructure dimensions.
pub async fn analyze_patterns(mut state: AnalysisState, services: &Services) -> AnalysisState {
    let sessions = state.input.attack_sessions.clone();

    let (temporal, behavioral, infrastructure) = tokio::join!(
        run_dimension(AnalysisKind::Temporal, &sessions, services),
        run_dimension(AnalysisKind::Behavioral, &sessions, services),
        run_dimension(AnalysisKind::Infrastructure, &sessions, services),
    );

    for (dimension, result) in [
        (CorrelationDimension::Temporal, temporal),
        (CorrelationDimension::Behavioral, behavioral),
        (CorrelationDimension::Infrastructure, infrastructure),
    ] {
        if matches!(result.method, ScoreMethod::Fallback) {
            state.record_error(format!(
                "pattern_analyzer[{dimension:?}]: {}",
                result.reasoning
            ));
        }
        state.intermediate.correlation_results.insert(dimension, result);
    }

    state.record_step("pattern_analyzer");
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::{CacheTtls, PipelineConfig};
    use crate::domain::{AnalysisDepth, AnalysisRequest};
    use crate::error::Result;
    use crate::llm::{GenerateResponse, LlmClient};
    use crate::tools::ToolCoordinator;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _model: &str, _prompt: &str, _options: &GenerateOptions) -> Result<GenerateResponse> {
            Err(crate::error::Error::external_unavailable("llm", "unreachable"))
        }
        async fn health_check(&self) -> bool {
            false
        }
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    struct WorkingLlm;

    #[async_trait]
    impl LlmClient for WorkingLlm {
        async fn generate(&self, model: &str, _prompt: &str, _options: &GenerateOptions) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: r#"{"score": 0.9, "reasoning": "tight timing"}"#.to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
                inference_time: Duration::from_millis(1),
                model: model.to_string(),
            })
        }
        async fn health_check(&self) -> bool {
            true
        }
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn sample_state() -> AnalysisState {
        let request = AnalysisRequest {
            attack_sessions: vec![
                AttackSession {
                    source_ip: "10.0.0.1".to_string(),
                    timestamp: Utc::now(),
                    payload: "GET / HTTP/1.1".to_string(),
                    target_port: None,
                    protocol: None,
                },
                AttackSession {
                    source_ip: "10.0.0.2".to_string(),
                    timestamp: Utc::now(),
                    payload: "GET / HTTP/1.1".to_string(),
                    target_port: None,
                    protocol: None,
                },
            ],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        AnalysisState::new(Uuid::new_v4(), request)
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_neutral_for_all_dimensions() {
        let services = Services {
            llm: Arc::new(FailingLlm),
            tools: Arc::new(ToolCoordinator::with_defaults(8, Arc::new(Cache::new(CacheTtls::default())))),
            config: Arc::new(PipelineConfig::default()),
            cache: Arc::new(Cache::new(CacheTtls::default())),
        };
        let state = analyze_patterns(sample_state(), &services).await;

        for result in state.intermediate.correlation_results.values() {
            assert_eq!(result.score, 0.5);
            assert!(matches!(result.method, ScoreMethod::Fallback));
        }
        assert_eq!(state.metadata.errors.len(), 3);
    }

    #[tokio::test]
    async fn working_llm_populates_scores_via_llm_method() {
        let services = Services {
            llm: Arc::new(WorkingLlm),
            tools: Arc::new(ToolCoordinator::with_defaults(8, Arc::new(Cache::new(CacheTtls::default())))),
            config: Arc::new(PipelineConfig::default()),
            cache: Arc::new(Cache::new(CacheTtls::default())),
        };
        let state = analyze_patterns(sample_state(), &services).await;

        for result in state.intermediate.correlation_results.values() {
            assert_eq!(result.score, 0.9);
            assert!(matches!(result.method, ScoreMethod::Llm));
        }
        assert!(state.metadata.errors.is_empty());
    }
}
