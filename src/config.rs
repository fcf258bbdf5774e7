//! Explicit configuration record (SPEC_FULL.md §9: no duck-typed env config).

use std::time::Duration;

/// Process-wide pipeline configuration. Constructed once at startup and
/// shared by reference (`Arc<PipelineConfig>`) across the dispatcher, the
/// engine, and every service it hands stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum sessions accepted in a single AnalysisRequest (§3).
    pub max_sessions: usize,
    /// Maximum batches accepted in a single BulkSubmit call (§4.1).
    pub max_bulk_batches: usize,
    /// Bound on analyses the dispatcher will run concurrently (§5 backpressure).
    pub max_concurrent_analyses: usize,
    /// Bound on concurrent per-address lookups within a tool stage (§5).
    pub max_concurrent_tool_lookups: usize,
    /// Overall per-analysis deadline, divided across stages (§5).
    pub analysis_timeout: Duration,
    /// Timeout for a single callback POST delivery (§4.1).
    pub callback_timeout: Duration,

    /// Base URL of the local LLM inference endpoint (§4.8).
    pub llm_base_url: String,
    /// Model name requested for `generate` calls.
    pub llm_model: String,
    /// Per-request timeout for the LLM client.
    pub llm_timeout: Duration,
    /// Retry budget for a single LLM `generate` call.
    pub llm_max_retries: u32,

    /// TTL cache namespace defaults (§4.9).
    pub cache_ttls: CacheTtls,
    /// Default sliding-window size for the rate limiter (§4.9).
    pub rate_limit_window: Duration,
    /// Requests admitted per caller per `rate_limit_window` (§4.9 P4).
    pub rate_limit_max_requests: u32,
}

/// Namespace-specific cache TTLs, defaults per SPEC_FULL.md §4.9.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub analysis: Duration,
    pub campaign: Duration,
    pub threat: Duration,
    pub workflow: Duration,
    pub enrichment: Duration,
    pub rate: Duration,
    pub user_session: Duration,
    pub llm: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            analysis: Duration::from_secs(24 * 3600),
            campaign: Duration::from_secs(6 * 3600),
            threat: Duration::from_secs(3600),
            workflow: Duration::from_secs(3600),
            enrichment: Duration::from_secs(2 * 3600),
            rate: Duration::from_secs(60),
            user_session: Duration::from_secs(30 * 60),
            llm: Duration::from_secs(300),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_bulk_batches: 100,
            max_concurrent_analyses: 64,
            max_concurrent_tool_lookups: 8,
            analysis_timeout: Duration::from_secs(300),
            callback_timeout: Duration::from_secs(30),
            llm_base_url: "http://localhost:11434".to_string(),
            llm_model: "llama3".to_string(),
            llm_timeout: Duration::from_secs(30),
            llm_max_retries: 3,
            cache_ttls: CacheTtls::default(),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 100,
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from environment variables, falling back to
    /// the documented defaults for anything unset. Parse failures fall back
    /// to the default rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("COORDINATION_LLM_BASE_URL") {
            config.llm_base_url = url;
        }
        if let Ok(model) = std::env::var("COORDINATION_LLM_MODEL") {
            config.llm_model = model;
        }
        if let Ok(secs) = std::env::var("COORDINATION_ANALYSIS_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.analysis_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(n) = std::env::var("COORDINATION_MAX_CONCURRENT_ANALYSES") {
            if let Ok(n) = n.parse::<usize>() {
                config.max_concurrent_analyses = n;
            }
        }

        config
    }

    pub fn with_llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.llm_base_url = url.into();
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }
}
