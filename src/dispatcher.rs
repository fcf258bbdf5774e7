//! Intake & Dispatcher (C7, §4.1): request validation, analysis-id minting,
//! non-blocking background execution, idempotent result retrieval, and
//! optional callback delivery.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{Admission, RateLimitCategory, RateLimiter};
use crate::config::PipelineConfig;
use crate::domain::AnalysisRequest;
use crate::engine::WorkflowEngine;
use crate::error::{Error, Result};
use crate::result::AnalysisResult;
use crate::stages::Services;
use crate::state::AnalysisState;
use crate::store::StateStore;

fn build_result(state: &AnalysisState) -> AnalysisResult {
    let assessment = state.final_assessment.as_ref();
    AnalysisResult {
        analysis_id: state.analysis_id,
        status: state.status,
        coordination_confidence: assessment.map(|a| a.confidence),
        evidence: assessment.map(|a| a.evidence_breakdown),
        enrichment_applied: !state.intermediate.tool_results.is_empty(),
        reasoning: assessment.map(|a| a.reasoning.clone()),
        key_factors: assessment.map(|a| a.key_factors.clone()),
        model_used: assessment.and_then(|a| a.model_used.clone()),
    }
}

/// Milestone percentages logged during background processing (§4.1).
const MILESTONES: [(u8, &str); 5] = [(10, "progress"), (20, "progress"), (80, "progress"), (90, "progress"), (100, "success")];

/// Synchronous-accept, asynchronous-execute front door to the pipeline.
pub struct Dispatcher {
    config: Arc<PipelineConfig>,
    store: Arc<StateStore>,
    engine: Arc<WorkflowEngine>,
    admission: Arc<Semaphore>,
    rate_limiter: Arc<RateLimiter>,
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new(store: Arc<StateStore>, services: Services) -> Self {
        let config = Arc::clone(&services.config);
        let admission = Arc::new(Semaphore::new(config.max_concurrent_analyses));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store), services));
        Self {
            http: reqwest::Client::new(),
            admission,
            rate_limiter,
            engine,
            store,
            config,
        }
    }

    /// `Submit` (§4.1): validates, mints an id, persists the initial state,
    /// and spawns background execution. Returns immediately. `caller_id`
    /// identifies the submitting client (§4.1 "every submission logs client
    /// identity"; §4.9 per-caller sliding-window admission).
    pub async fn submit(&self, caller_id: &str, request: AnalysisRequest) -> Result<Uuid> {
        request.validate(&self.config)?;

        match self
            .rate_limiter
            .check(RateLimitCategory::User, caller_id, self.config.rate_limit_max_requests)
            .await
        {
            Admission::Accepted { .. } => {}
            Admission::Denied { retry_after } => {
                return Err(Error::rate_limited(caller_id, retry_after.as_secs()));
            }
        }

        let permit = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| Error::rate_limited("dispatcher_queue", 5))?;

        let analysis_id = Uuid::new_v4();
        info!(
            analysis_id = %analysis_id,
            caller_id = %caller_id,
            session_count = request.attack_sessions.len(),
            depth = ?request.analysis_depth,
            "analysis submitted"
        );

        let mut state = AnalysisState::new(analysis_id, request);
        state.metadata.user_id = Some(caller_id.to_string());
        self.store.save(&state, self.config.cache_ttls.workflow)?;

        let engine = Arc::clone(&self.engine);
        let http = self.http.clone();
        let callback_timeout = self.config.callback_timeout;

        tokio::spawn(async move {
            let _permit = permit;
            Self::run_background(engine, http, callback_timeout, state).await;
        });

        Ok(analysis_id)
    }

    async fn run_background(
        engine: Arc<WorkflowEngine>,
        http: reqwest::Client,
        callback_timeout: std::time::Duration,
        state: AnalysisState,
    ) {
        let analysis_id = state.analysis_id;
        let callback_url = state.input.callback_url.clone();
        log_milestone(analysis_id, MILESTONES[0]);
        log_milestone(analysis_id, MILESTONES[1]);

        // The engine persists the final state itself at stage checkpoints
        // and on completion (§4.7); the dispatcher only needs it in hand to
        // build the callback payload.
        let final_state = engine.run(state).await;
        log_milestone(analysis_id, MILESTONES[2]);
        log_milestone(analysis_id, MILESTONES[3]);

        if let Some(url) = callback_url {
            let result = build_result(&final_state);
            if let Err(err) = deliver_callback(&http, &url, &result, callback_timeout).await {
                warn!(analysis_id = %analysis_id, callback_url = %url, error = %err, "callback delivery failed");
            }
        }

        log_milestone(analysis_id, MILESTONES[4]);
    }

    /// `BulkSubmit` (§4.1, SPEC_FULL.md supplement): one outcome per batch,
    /// isolated so a single invalid batch doesn't abort the others. Limit
    /// `max_bulk_batches` per call.
    pub async fn bulk_submit(&self, caller_id: &str, requests: Vec<AnalysisRequest>) -> Result<Vec<Result<Uuid>>> {
        if requests.len() > self.config.max_bulk_batches {
            return Err(Error::validation(format!(
                "at most {} batches are allowed per bulk submit",
                self.config.max_bulk_batches
            )));
        }

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.submit(caller_id, request).await);
        }
        Ok(outcomes)
    }

    /// `Get` (§4.1): idempotent lookup by analysis id.
    pub async fn get(&self, analysis_id: Uuid) -> Result<AnalysisResult> {
        let state = self.store.load(analysis_id)?.ok_or(Error::not_found(analysis_id))?;
        Ok(build_result(&state))
    }
}

fn log_milestone(analysis_id: Uuid, milestone: (u8, &str)) {
    info!(analysis_id = %analysis_id, percent = milestone.0, state = milestone.1, "background processing progress");
}

async fn deliver_callback(
    http: &reqwest::Client,
    url: &str,
    result: &AnalysisResult,
    timeout: std::time::Duration,
) -> Result<()> {
    let response = http.post(url).json(result).timeout(timeout).send().await?;
    if !response.status().is_success() {
        warn!(callback_url = %url, status = %response.status(), "callback sink returned non-success status");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::domain::{AnalysisDepth, AttackSession};
    use crate::error::Result as PipelineResult;
    use crate::llm::{GenerateOptions, GenerateResponse, LlmClient};
    use crate::tools::ToolCoordinator;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, model: &str, _prompt: &str, _options: &GenerateOptions) -> PipelineResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: r#"{"score": 0.5, "reasoning": "n/a"}"#.to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
                inference_time: Duration::from_millis(1),
                model: model.to_string(),
            })
        }
        async fn health_check(&self) -> bool {
            true
        }
        async fn list_models(&self) -> PipelineResult<Vec<String>> {
            Ok(vec![])
        }
    }

    fn build_dispatcher() -> Dispatcher {
        let config = Arc::new(PipelineConfig::default());
        let cache = Arc::new(Cache::new(config.cache_ttls));
        let store = Arc::new(StateStore::in_memory().unwrap());
        let services = Services {
            llm: Arc::new(StubLlm),
            tools: Arc::new(ToolCoordinator::with_defaults(8, Arc::clone(&cache))),
            config,
            cache,
        };
        Dispatcher::new(store, services)
    }

    fn request(session_count: usize) -> AnalysisRequest {
        let now = Utc::now();
        let sessions = (0..session_count)
            .map(|i| AttackSession {
                source_ip: format!("10.0.0.{}", i + 1),
                timestamp: now,
                payload: "GET / HTTP/1.1".to_string(),
                target_port: None,
                protocol: None,
            })
            .collect();
        AnalysisRequest {
            attack_sessions: sessions,
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        }
    }

    #[tokio::test]
    async fn submit_then_get_returns_same_id() {
        let dispatcher = build_dispatcher();
        let id = dispatcher.submit("test-caller", request(2)).await.unwrap();
        let result = dispatcher.get(id).await.unwrap();
        assert_eq!(result.analysis_id, id);
    }

    #[tokio::test]
    async fn submit_records_caller_identity_on_state() {
        let dispatcher = build_dispatcher();
        let id = dispatcher.submit("operator-7", request(2)).await.unwrap();
        let loaded = dispatcher.store.load(id).unwrap().unwrap();
        assert_eq!(loaded.metadata.user_id.as_deref(), Some("operator-7"));
    }

    #[tokio::test]
    async fn submit_rejects_single_session() {
        let dispatcher = build_dispatcher();
        let err = dispatcher.submit("test-caller", request(1)).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn submit_denies_caller_over_rate_limit() {
        let mut config = PipelineConfig::default();
        config.rate_limit_max_requests = 1;
        let config = Arc::new(config);
        let cache = Arc::new(Cache::new(config.cache_ttls));
        let dispatcher = Dispatcher::new(
            Arc::new(StateStore::in_memory().unwrap()),
            Services {
                llm: Arc::new(StubLlm),
                tools: Arc::new(ToolCoordinator::with_defaults(8, Arc::clone(&cache))),
                config,
                cache,
            },
        );

        dispatcher.submit("heavy-caller", request(2)).await.unwrap();
        let err = dispatcher.submit("heavy-caller", request(2)).await.unwrap_err();
        assert!(matches!(err, Error::RateLimitError { .. }));
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let dispatcher = build_dispatcher();
        let err = dispatcher.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn bulk_submit_rejects_over_limit() {
        let mut config = PipelineConfig::default();
        config.max_bulk_batches = 1;
        let config = Arc::new(config);
        let cache = Arc::new(Cache::new(config.cache_ttls));
        let dispatcher = Dispatcher::new(
            Arc::new(StateStore::in_memory().unwrap()),
            Services {
                llm: Arc::new(StubLlm),
                tools: Arc::new(ToolCoordinator::with_defaults(8, Arc::clone(&cache))),
                config,
                cache,
            },
        );
        let err = dispatcher
            .bulk_submit("test-caller", vec![request(2), request(2)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn bulk_submit_isolates_per_batch_failures() {
        let dispatcher = build_dispatcher();
        let outcomes = dispatcher
            .bulk_submit("test-caller", vec![request(2), request(1)])
            .await
            .unwrap();
        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_err());
    }
}
