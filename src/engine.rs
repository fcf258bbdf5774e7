//! Workflow Engine (C6, §4.2): a typed DAG executor over `AnalysisState`.
//! Nodes are plain async functions (§9: dispatch table, not polymorphic
//! `process` methods); edges are the routing predicates evaluated here.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::result::{AssessmentLabel, EvidenceBreakdown, FinalAssessment};
use crate::stages::{analyze_patterns, enrich, orchestrate, score_confidence, Services};
use crate::state::{AnalysisState, AnalysisStatus};
use crate::store::StateStore;
use crate::tools::ToolCoordinator;

/// Fraction of the overall per-analysis deadline allotted to each node
/// (§5: "divided across stages proportional to their typical cost").
const ORCHESTRATOR_SHARE: f64 = 0.05;
const PATTERN_ANALYZER_SHARE: f64 = 0.35;
const TOOL_COORDINATOR_SHARE: f64 = 0.30;
const CONFIDENCE_SCORER_SHARE: f64 = 0.25;
const ENRICHER_SHARE: f64 = 0.05;

fn stage_deadline(total: Duration, share: f64) -> Duration {
    Duration::from_secs_f64((total.as_secs_f64() * share).max(0.1))
}

fn neutral_default() -> FinalAssessment {
    let evidence = EvidenceBreakdown {
        temporal_correlation: 0.0,
        behavioral_similarity: 0.0,
        infrastructure_clustering: 0.0,
        geographic_proximity: 0.0,
        payload_similarity: 0.0,
    };
    FinalAssessment {
        confidence: 0.5,
        evidence_breakdown: evidence,
        assessment: AssessmentLabel::PossiblyCoordinated,
        reasoning: "all stages failed; neutral default applied".to_string(),
        key_factors: Vec::new(),
        model_used: None,
    }
}

/// Glue between the Tool Coordinator (C4) and the workflow state: fans out
/// lookups, then merges the synthesized scores into `enrichment_data`.
async fn run_tool_coordination(mut state: AnalysisState, tools: &ToolCoordinator) -> AnalysisState {
    let addr_strings: Vec<String> = state
        .input
        .distinct_source_addresses()
        .into_iter()
        .map(String::from)
        .collect();
    let addrs: BTreeSet<&str> = addr_strings.iter().map(String::as_str).collect();
    let include_asn = state.input.analysis_depth.is_deep();

    let (results, synthesis) = tools.coordinate(&addrs, include_asn).await;

    for (tool_name, per_addr) in results {
        let value = serde_json::to_value(&per_addr).unwrap_or(serde_json::Value::Null);
        state.intermediate.tool_results.insert(tool_name, value);
    }
    state
        .intermediate
        .enrichment_data
        .insert("infrastructure_clustering".to_string(), synthesis.infrastructure_clustering);
    state
        .intermediate
        .enrichment_data
        .insert("geographic_proximity".to_string(), synthesis.geographic_proximity);
    state
        .intermediate
        .enrichment_data
        .insert("threat_correlation".to_string(), synthesis.threat_correlation);

    state.record_step("tool_coordinator");
    state
}

type BoxedStageFuture = Pin<Box<dyn Future<Output = AnalysisState> + Send>>;

/// Drives an analysis through the routing DAG described in §4.2.
pub struct WorkflowEngine {
    store: Arc<StateStore>,
    services: Services,
}

impl WorkflowEngine {
    pub fn new(store: Arc<StateStore>, services: Services) -> Self {
        Self { store, services }
    }

    /// Run `state` under `deadline`. A deadline firing mid-stage is treated
    /// as a stage error (§5): the engine keeps the state as it was *before*
    /// the stage started (the in-flight attempt's partial mutations are
    /// unrecoverable once its future is cancelled) and records the timeout.
    async fn run_stage<F>(&self, state: AnalysisState, deadline: Duration, name: &str, f: F) -> AnalysisState
    where
        F: FnOnce(AnalysisState) -> BoxedStageFuture,
    {
        let backup = state.clone();
        match tokio::time::timeout(deadline, f(state)).await {
            Ok(new_state) => new_state,
            Err(_) => {
                warn!(stage = name, deadline_ms = deadline.as_millis() as u64, "stage deadline exceeded");
                let mut state = backup;
                state.record_error(format!("stage '{name}' exceeded its deadline"));
                state
            }
        }
    }

    /// Write a checkpoint. A write failure is a `FatalError` (§7: "Terminate
    /// pipeline; status `failed`; error persisted") rather than a warning the
    /// engine keeps running past: returns `false` so `run` can stop advancing
    /// the DAG and finalize immediately.
    fn checkpoint(&self, state: &mut AnalysisState) -> bool {
        if let Err(err) = self.store.checkpoint(state, self.services.config.cache_ttls.workflow) {
            warn!(analysis_id = %state.analysis_id, error = %err, "checkpoint write failed, terminating pipeline");
            state.status = AnalysisStatus::Failed;
            state.record_error(format!("checkpoint failed: {err}"));
            false
        } else {
            true
        }
    }

    /// Apply the neutral default if no stage produced a `final_assessment`,
    /// set the terminal status, and persist the final state. `status` is
    /// `failed` if every stage failed to complete (§4.2: "if every stage
    /// fails, the final assessment is the neutral default ... and status is
    /// `failed`") or if a prior checkpoint already marked the run fatal;
    /// otherwise `completed`.
    async fn finalize(&self, mut state: AnalysisState) -> AnalysisState {
        if state.final_assessment.is_none() {
            state.final_assessment = Some(neutral_default());
        }
        state.metadata.end_time = Some(Utc::now());
        if state.status != AnalysisStatus::Failed {
            state.status = if state.metadata.processing_steps.is_empty() {
                state.record_error("every stage failed to complete");
                AnalysisStatus::Failed
            } else {
                AnalysisStatus::Completed
            };
        }

        // Failed analyses retain 2x the default TTL (§3 lifecycle); `save`
        // applies that multiplier based on `state.status`.
        if let Err(err) = self.store.save(&state, self.services.config.cache_ttls.analysis) {
            warn!(analysis_id = %state.analysis_id, error = %err, "final state save failed");
        }

        info!(
            analysis_id = %state.analysis_id,
            status = ?state.status,
            confidence = state.final_assessment.as_ref().map(|a| a.confidence),
            "workflow finished"
        );
        state
    }

    /// Execute the full DAG for one analysis (§4.2 execution contract):
    /// Orchestrator always runs first; PatternAnalyzer always runs next;
    /// ToolCoordinator runs only when deep analysis is needed; ConfidenceScorer
    /// always runs after those; Enricher runs only when `analysis_depth == deep`.
    #[instrument(skip(self, state), fields(analysis_id = %state.analysis_id))]
    pub async fn run(&self, mut state: AnalysisState) -> AnalysisState {
        let total = self.services.config.analysis_timeout;
        state.status = AnalysisStatus::Processing;
        state.metadata.start_time = Some(Utc::now());
        info!(analysis_id = %state.analysis_id, "workflow started");

        state = self
            .run_stage(state, stage_deadline(total, ORCHESTRATOR_SHARE), "orchestrator", |s| {
                Box::pin(orchestrate(s))
            })
            .await;
        if !self.checkpoint(&mut state) {
            return self.finalize(state).await;
        }

        let services = self.services.clone();
        state = self
            .run_stage(state, stage_deadline(total, PATTERN_ANALYZER_SHARE), "pattern_analyzer", move |s| {
                Box::pin(async move { analyze_patterns(s, &services).await })
            })
            .await;
        if !self.checkpoint(&mut state) {
            return self.finalize(state).await;
        }

        if state.routing.needs_deep_analysis {
            let tools = Arc::clone(&self.services.tools);
            state = self
                .run_stage(state, stage_deadline(total, TOOL_COORDINATOR_SHARE), "tool_coordinator", move |s| {
                    Box::pin(async move { run_tool_coordination(s, &tools).await })
                })
                .await;
            if !self.checkpoint(&mut state) {
                return self.finalize(state).await;
            }
        }

        let services = self.services.clone();
        state = self
            .run_stage(state, stage_deadline(total, CONFIDENCE_SCORER_SHARE), "confidence_scorer", move |s| {
                Box::pin(async move { score_confidence(s, &services).await })
            })
            .await;
        if !self.checkpoint(&mut state) {
            return self.finalize(state).await;
        }

        if state.input.analysis_depth.is_deep() {
            state = self
                .run_stage(state, stage_deadline(total, ENRICHER_SHARE), "enricher", |s| Box::pin(enrich(s)))
                .await;
            if !self.checkpoint(&mut state) {
                return self.finalize(state).await;
            }
        }

        self.finalize(state).await
    }
}
