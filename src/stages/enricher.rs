//! Enricher (§4.2): the `elasticsearch_enrichment` DAG node, reached only
//! when `analysis_depth == deep`. The spec treats long-term campaign
//! tracking analytics as an out-of-core external collaborator (§1); this
//! stage records that enrichment ran without re-implementing that system.

use tracing::debug;

use crate::state::AnalysisState;

/// Run the Enricher stage: marks that deep enrichment was applied to this
/// analysis. Never fails — there is no further collaborator call here to
/// fail on.
pub async fn enrich(mut state: AnalysisState) -> AnalysisState {
    debug!(analysis_id = %state.analysis_id, "elasticsearch enrichment applied");
    state
        .intermediate
        .enrichment_data
        .entry("elasticsearch_enrichment_applied".to_string())
        .or_insert(1.0);
    state.record_step("enricher");
    state
}
