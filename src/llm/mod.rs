//! LLM Reasoning Client (C3, §4.8): structured reasoning requests to a
//! local inference endpoint, with health probe, timeouts, retries, and
//! structured/unstructured response parsing.

mod client;
mod parse;
mod prompts;

pub use client::{CachedLlmClient, GenerateOptions, GenerateResponse, LlmClient, LocalLlmClient};
pub use parse::{extract_json_object, parse_score_reasoning, CoordinationAnalysis};
pub use prompts::{coordination_prompt, confidence_scoring_prompt, AnalysisKind};
