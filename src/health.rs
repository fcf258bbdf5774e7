//! Health/readiness surface (C8, SPEC_FULL.md §6 ADDED): the in-process
//! equivalent of the three HTTP health probes. This crate is a library, not
//! a server, so there is no route to mount them on; instead `HealthCheck` is
//! a typed collaborator an embedding service can poll directly.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cache::{Cache, Namespace};
use crate::llm::LlmClient;
use crate::store::StateStore;

/// Liveness probe response: "is the process up at all" (§6).
#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub status: &'static str,
    pub uptime_seconds: u64,
}

/// Readiness probe response: per-dependency health plus an aggregate flag
/// (§6: "ready iff all healthy").
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub state_store: bool,
    pub cache: bool,
    pub llm: bool,
}

/// Aggregates dependency health for the three collaborators the pipeline
/// cannot run without (§6).
pub struct HealthCheck {
    started_at: Instant,
    store: Arc<StateStore>,
    cache: Arc<Cache>,
    llm: Arc<dyn LlmClient>,
}

impl HealthCheck {
    pub fn new(store: Arc<StateStore>, cache: Arc<Cache>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            started_at: Instant::now(),
            store,
            cache,
            llm,
        }
    }

    /// `liveness` (§6): always succeeds while the process is running; no
    /// dependency calls.
    pub fn liveness(&self) -> LivenessReport {
        LivenessReport {
            status: "alive",
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// `readiness` (§6): probes each dependency. The state store check reads
    /// its active-id index (cheap, no table scan); the cache check is a
    /// round-trip set/get against a reserved key; the LLM check delegates to
    /// the client's own `health_check`.
    pub async fn readiness(&self) -> ReadinessReport {
        let state_store = self.store.active_analysis_ids().is_ok();

        let cache_probe = "__health__";
        let cache = self
            .cache
            .set(Namespace::Workflow, cache_probe, &true, None)
            .await
            .is_ok()
            && self.cache.get::<bool>(Namespace::Workflow, cache_probe).await == Some(true);

        let llm = self.llm.health_check().await;

        ReadinessReport {
            ready: state_store && cache && llm,
            state_store,
            cache,
            llm,
        }
    }
}
