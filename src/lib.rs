//! # coordination-pipeline
//!
//! A directed, stateful, multi-stage pipeline that decides, for a batch of
//! honeypot attack sessions, whether the sessions represent a coordinated
//! campaign, coincidental timing, or a single actor with multiple sources.
//!
//! ## Core components
//!
//! - **State Store**: per-analysis mutable state, checkpoints, recovery
//! - **Cache & Rate Layer**: namespaced TTL cache and a sliding-window rate limiter
//! - **LLM Reasoning Client**: structured reasoning requests to a local inference endpoint
//! - **Tool Coordinator**: concurrent enrichment lookups and clustering synthesis
//! - **Stage Agents**: Orchestrator, PatternAnalyzer, ConfidenceScorer, Enricher
//! - **Workflow Engine**: the DAG executor that drives stages in routing order
//! - **Dispatcher**: request validation, id minting, background execution, result lookup
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coordination_pipeline::{
//!     AnalysisDepth, AnalysisRequest, AttackSession, Cache, CachedLlmClient, Dispatcher,
//!     HealthCheck, LocalLlmClient, PipelineConfig, Services, StateStore, ToolCoordinator,
//! };
//! use chrono::Utc;
//!
//! # async fn run() -> coordination_pipeline::Result<()> {
//! let config = Arc::new(PipelineConfig::default());
//! let store = Arc::new(StateStore::in_memory()?);
//! let cache = Arc::new(Cache::new(config.cache_ttls));
//! let llm = Arc::new(CachedLlmClient::new(
//!     Arc::new(LocalLlmClient::new(&config.llm_base_url, config.llm_timeout)),
//!     Arc::clone(&cache),
//! ));
//! let services = Services {
//!     llm: llm.clone(),
//!     tools: Arc::new(ToolCoordinator::with_defaults(config.max_concurrent_tool_lookups, Arc::clone(&cache))),
//!     config: Arc::clone(&config),
//!     cache: Arc::clone(&cache),
//! };
//! let health = HealthCheck::new(Arc::clone(&store), Arc::clone(&cache), llm.clone());
//! let dispatcher = Dispatcher::new(store, services);
//!
//! let request = AnalysisRequest {
//!     attack_sessions: vec![
//!         AttackSession { source_ip: "10.0.0.1".into(), timestamp: Utc::now(), payload: "GET /admin HTTP/1.1".into(), target_port: None, protocol: None },
//!         AttackSession { source_ip: "10.0.0.2".into(), timestamp: Utc::now(), payload: "GET /admin HTTP/1.1".into(), target_port: None, protocol: None },
//!     ],
//!     analysis_depth: AnalysisDepth::Standard,
//!     callback_url: None,
//! };
//! let analysis_id = dispatcher.submit("client-42", request).await?;
//! let _result = dispatcher.get(analysis_id).await?;
//! let _readiness = health.readiness().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod error;
pub mod health;
pub mod llm;
pub mod result;
pub mod stages;
pub mod state;
pub mod store;
pub mod tools;

pub use cache::{fingerprint, Admission, Cache, Namespace, RateLimitCategory, RateLimiter};
pub use config::{CacheTtls, PipelineConfig};
pub use dispatcher::Dispatcher;
pub use domain::{AnalysisDepth, AnalysisRequest, AttackSession, MAX_PAYLOAD_BYTES};
pub use engine::WorkflowEngine;
pub use error::{Error, Result};
pub use health::{HealthCheck, LivenessReport, ReadinessReport};
pub use llm::{
    coordination_prompt, extract_json_object, parse_score_reasoning, AnalysisKind, CachedLlmClient,
    CoordinationAnalysis, GenerateOptions, GenerateResponse, LlmClient, LocalLlmClient,
};
pub use result::{AnalysisResult, AssessmentLabel, EvidenceBreakdown, FinalAssessment};
pub use stages::Services;
pub use state::{
    AnalysisState, AnalysisStatus, CorrelationDimension, CorrelationResult, Intermediate,
    Metadata, ProcessingStep, RecordedError, Routing, ScoreMethod,
};
pub use store::StateStore;
pub use tools::{EnrichmentTool, EnrichmentSynthesis, LookupOutcome, ToolCoordinator, ToolName};
