//! Client for a local LLM inference endpoint (§4.8). The wire contract is
//! Ollama-shaped: `GET /api/tags` for health/model listing, `POST
//! /api/generate` for generation — the endpoint shape the distilled spec
//! left ambiguous, resolved against the original implementation's client.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::cache::{fingerprint, Cache, Namespace};
use crate::error::{Error, Result};

use super::parse::{parse_confidence_line, parse_coordination_analysis, CoordinationAnalysis};
use super::prompts::{coordination_prompt, AnalysisKind};
use crate::domain::AttackSession;

/// Sampling options for a `generate` call (§4.8).
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// In [0, 2].
    pub temperature: f64,
    /// In [0, 1].
    pub top_p: f64,
    /// >= 1.
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Output of a single `generate` call (§4.8).
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub inference_time: Duration,
    pub model: String,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaGenerateOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    total_duration: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

/// Trait boundary for the LLM Reasoning Client, so stages can depend on
/// `Arc<dyn LlmClient>` and tests can substitute a mock.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str, options: &GenerateOptions) -> Result<GenerateResponse>;

    async fn health_check(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<String>>;

    /// Higher-level operation (§4.8): builds a type-specific prompt, calls
    /// `generate`, and parses a structured or synthesized result.
    async fn analyze_coordination(
        &self,
        kind: AnalysisKind,
        sessions: &[AttackSession],
        model: &str,
        options: &GenerateOptions,
    ) -> Result<CoordinationAnalysis> {
        let prompt = coordination_prompt(kind, sessions);
        let response = self.generate(model, &prompt, options).await?;
        Ok(parse_coordination_analysis(&response.text, &response.model))
    }

    /// `score_confidence` (§4.8): returns `None` on parse failure so the
    /// caller can fall back to the weighted-mean estimate (§4.6).
    async fn score_confidence(&self, prompt: &str, model: &str, options: &GenerateOptions) -> Option<f64> {
        let response = self.generate(model, prompt, options).await.ok()?;
        parse_confidence_line(&response.text)
    }
}

fn build_http_client(timeout: Duration) -> Client {
    // Some sandboxed environments panic during proxy auto-detection in
    // reqwest's default client builder; fall back to no-proxy.
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("failed to construct HTTP client"),
    }
}

/// Client for a single local inference endpoint (not a multi-provider
/// cloud client — this domain has exactly one collaborator, per §4.8).
pub struct LocalLlmClient {
    base_url: String,
    http: Client,
}

impl LocalLlmClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            http: build_http_client(timeout),
        }
    }
}

#[async_trait]
impl LlmClient for LocalLlmClient {
    #[instrument(skip(self, prompt, options), fields(model = %model))]
    async fn generate(&self, model: &str, prompt: &str, options: &GenerateOptions) -> Result<GenerateResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            stream: false,
            options: OllamaGenerateOptions {
                temperature: options.temperature.clamp(0.0, 2.0),
                top_p: options.top_p.clamp(0.0, 1.0),
                num_predict: options.max_tokens.max(1),
            },
        };

        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .json(&body)
                .timeout(options.timeout)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let parsed: OllamaGenerateResponse = response.json().await?;
                    return Ok(GenerateResponse {
                        text: parsed.response,
                        prompt_tokens: parsed.prompt_eval_count,
                        completion_tokens: parsed.eval_count,
                        inference_time: if parsed.total_duration > 0 {
                            Duration::from_nanos(parsed.total_duration)
                        } else {
                            start.elapsed()
                        },
                        model: model.to_string(),
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt >= options.max_retries {
                        return Err(Error::external_unavailable(
                            "llm",
                            format!("generate returned status {status}"),
                        ));
                    }
                }
                Err(err) => {
                    if attempt >= options.max_retries {
                        return Err(err.into());
                    }
                    debug!(error = %err, attempt, "llm generate failed, retrying");
                }
            }

            attempt += 1;
            sleep(Duration::from_millis(200 * attempt as u64)).await;
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(error = %err, "llm health check failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response: OllamaTagsResponse = self.http.get(&url).send().await?.json().await?;
        Ok(response.models.into_iter().map(|m| m.name).collect())
    }
}

/// Lightweight, serializable mirror of [`GenerateResponse`] for cache
/// storage. `inference_time` is a `Duration`, which doesn't implement
/// `Serialize`; a cache hit has no fresh inference time to report anyway, so
/// it's dropped here and reconstructed as zero on replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedGeneration {
    text: String,
    prompt_tokens: u64,
    completion_tokens: u64,
    model: String,
}

impl From<&GenerateResponse> for CachedGeneration {
    fn from(response: &GenerateResponse) -> Self {
        Self {
            text: response.text.clone(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            model: response.model.clone(),
        }
    }
}

impl From<CachedGeneration> for GenerateResponse {
    fn from(cached: CachedGeneration) -> Self {
        Self {
            text: cached.text,
            prompt_tokens: cached.prompt_tokens,
            completion_tokens: cached.completion_tokens,
            inference_time: Duration::ZERO,
            model: cached.model,
        }
    }
}

/// Decorator that memoizes `generate` calls under the `llm` cache namespace
/// (§4.8), keyed by a fingerprint of `model`+`prompt`+sampling options. Wraps
/// any `LlmClient`, including `LocalLlmClient`, so stages that only see
/// `Arc<dyn LlmClient>` get caching transparently through the trait's
/// default `analyze_coordination`/`score_confidence` methods.
pub struct CachedLlmClient {
    inner: Arc<dyn LlmClient>,
    cache: Arc<Cache>,
}

impl CachedLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, cache: Arc<Cache>) -> Self {
        Self { inner, cache }
    }

    fn cache_key(model: &str, prompt: &str, options: &GenerateOptions) -> String {
        fingerprint(&format!(
            "{model}:{prompt}:{}:{}:{}",
            options.temperature, options.top_p, options.max_tokens
        ))
    }
}

#[async_trait]
impl LlmClient for CachedLlmClient {
    async fn generate(&self, model: &str, prompt: &str, options: &GenerateOptions) -> Result<GenerateResponse> {
        let key = Self::cache_key(model, prompt, options);
        if let Some(cached) = self.cache.get::<CachedGeneration>(Namespace::Llm, &key).await {
            debug!(model, "llm cache hit");
            return Ok(cached.into());
        }

        let response = self.inner.generate(model, prompt, options).await?;
        let cached = CachedGeneration::from(&response);
        if let Err(err) = self.cache.set(Namespace::Llm, &key, &cached, None).await {
            warn!(error = %err, "failed to cache llm response");
        }
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.inner.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheTtls;

    struct MockClient {
        healthy: bool,
        response_text: String,
    }

    #[async_trait]
    impl LlmClient for MockClient {
        async fn generate(&self, model: &str, _prompt: &str, _options: &GenerateOptions) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: self.response_text.clone(),
                prompt_tokens: 10,
                completion_tokens: 10,
                inference_time: Duration::from_millis(5),
                model: model.to_string(),
            })
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["llama3".to_string()])
        }
    }

    #[tokio::test]
    async fn analyze_coordination_uses_trait_default() {
        let client = MockClient {
            healthy: true,
            response_text: r#"{"score": 0.8, "reasoning": "tight timing"}"#.to_string(),
        };
        let sessions = vec![AttackSession {
            source_ip: "10.0.0.1".to_string(),
            timestamp: chrono::Utc::now(),
            payload: "GET /".to_string(),
            target_port: None,
            protocol: None,
        }];
        // The coordination prompt schema differs (score vs confidence) so
        // parsing falls back to keyword synthesis here, which is fine: this
        // test exercises plumbing, not the real model's output shape.
        let result = client
            .analyze_coordination(AnalysisKind::Temporal, &sessions, "llama3", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(result.model, "llama3");
    }

    #[tokio::test]
    async fn score_confidence_parses_line() {
        let client = MockClient {
            healthy: true,
            response_text: "overall confidence: 0.42".to_string(),
        };
        let score = client
            .score_confidence("prompt", "llama3", &GenerateOptions::default())
            .await;
        assert_eq!(score, Some(0.42));
    }

    struct CountingClient {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for CountingClient {
        async fn generate(&self, model: &str, _prompt: &str, _options: &GenerateOptions) -> Result<GenerateResponse> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(GenerateResponse {
                text: "cached response".to_string(),
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

    #[tokio::test]
    async fn cached_client_only_invokes_inner_once_for_repeated_prompt() {
        let inner = Arc::new(CountingClient {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let cached = CachedLlmClient::new(inner.clone(), Arc::new(Cache::new(CacheTtls::default())));
        let options = GenerateOptions::default();

        let first = cached.generate("llama3", "same prompt", &options).await.unwrap();
        let second = cached.generate("llama3", "same prompt", &options).await.unwrap();

        assert_eq!(first.text, second.text);
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_client_misses_for_different_prompts() {
        let inner = Arc::new(CountingClient {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let cached = CachedLlmClient::new(inner.clone(), Arc::new(Cache::new(CacheTtls::default())));
        let options = GenerateOptions::default();

        cached.generate("llama3", "prompt a", &options).await.unwrap();
        cached.generate("llama3", "prompt b", &options).await.unwrap();

        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
