//! Stage Agents (C5, §4.3-§4.6): per-stage logic as plain async functions
//! over shared state, registered with the engine's dispatch table rather
//! than as polymorphic `process` methods (§9 redesign).

pub mod confidence_scorer;
pub mod enricher;
pub mod orchestrator;
pub mod pattern_analyzer;

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::PipelineConfig;
use crate::llm::LlmClient;
use crate::tools::ToolCoordinator;

pub use confidence_scorer::score_confidence;
pub use enricher::enrich;
pub use orchestrator::orchestrate;
pub use pattern_analyzer::analyze_patterns;

/// External collaborators a stage may need, handed down by the engine
/// (§9 "singletons... handed to components by reference").
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolCoordinator>,
    pub config: Arc<PipelineConfig>,
    pub cache: Arc<Cache>,
}
