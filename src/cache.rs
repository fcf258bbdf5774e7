//! Cache & Rate Layer (C2, §4.9): namespaced TTL cache and a sliding-window
//! rate limiter. Both are in-process, best-effort, and fail open.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::CacheTtls;
use crate::error::Result;

/// Deterministic content fingerprint for cache keys (§4.8 LLM prompt
/// memoization): the same prompt always hashes to the same key, so repeated
/// requests hit the `llm` namespace instead of re-invoking the model.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Namespaces a cache key can belong to (§3, §4.9, §6 persisted-key list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Analysis,
    Campaign,
    Threat,
    Workflow,
    Enrichment,
    Rate,
    UserSession,
    Llm,
}

impl Namespace {
    fn as_str(&self) -> &'static str {
        match self {
            Namespace::Analysis => "analysis",
            Namespace::Campaign => "campaign",
            Namespace::Threat => "threat",
            Namespace::Workflow => "workflow",
            Namespace::Enrichment => "enrichment",
            Namespace::Rate => "rate",
            Namespace::UserSession => "user_session",
            Namespace::Llm => "llm",
        }
    }

    fn ttl(&self, ttls: &CacheTtls) -> Duration {
        match self {
            Namespace::Analysis => ttls.analysis,
            Namespace::Campaign => ttls.campaign,
            Namespace::Threat => ttls.threat,
            Namespace::Workflow => ttls.workflow,
            Namespace::Enrichment => ttls.enrichment,
            Namespace::Rate => ttls.rate,
            Namespace::UserSession => ttls.user_session,
            Namespace::Llm => ttls.llm,
        }
    }
}

struct CacheEntry {
    value: String,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Keyed TTL cache over JSON-serialized values (§3, §4.9). Best-effort: a
/// backend failure degrades (miss) rather than failing the caller.
pub struct Cache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttls: CacheTtls,
}

impl Cache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttls,
        }
    }

    fn key(namespace: Namespace, identifier: &str) -> String {
        format!("{}:{}", namespace.as_str(), identifier)
    }

    /// Store a value with the namespace's default TTL. `extend_ttl` (§4.7
    /// error-state 2x retention) multiplies the namespace TTL when `Some`.
    pub async fn set<T: Serialize>(
        &self,
        namespace: Namespace,
        identifier: &str,
        value: &T,
        extend_ttl: Option<u32>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        let mut ttl = namespace.ttl(&self.ttls);
        if let Some(multiplier) = extend_ttl {
            ttl *= multiplier;
        }

        let mut entries = self.entries.write().await;
        entries.insert(
            Self::key(namespace, identifier),
            CacheEntry {
                value: serialized,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    /// Fetch and deserialize a value; a miss or deserialization failure
    /// returns `Ok(None)` rather than an error (best-effort contract).
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        identifier: &str,
    ) -> Option<T> {
        let key = Self::key(namespace, identifier);
        let entries = self.entries.read().await;
        let entry = entries.get(&key)?;
        if entry.is_expired() {
            debug!(key = %key, "cache entry expired");
            return None;
        }
        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %key, error = %err, "cache entry failed to deserialize");
                None
            }
        }
    }

    pub async fn invalidate(&self, namespace: Namespace, identifier: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(&Self::key(namespace, identifier));
    }

    /// Bulk-write entries in one pipelined operation (§4.9 warming).
    pub async fn warm<T: Serialize>(
        &self,
        namespace: Namespace,
        values: impl IntoIterator<Item = (String, T)>,
    ) -> Result<()> {
        let ttl = namespace.ttl(&self.ttls);
        let mut serialized = Vec::new();
        for (identifier, value) in values {
            serialized.push((Self::key(namespace, &identifier), serde_json::to_string(&value)?));
        }
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        for (key, value) in serialized {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    created_at: now,
                    ttl,
                },
            );
        }
        Ok(())
    }

    /// Sweep expired entries. Not required for correctness (lazy expiry on
    /// read is sufficient) but exposed so callers can bound memory growth.
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired());
    }
}

/// Category a rate-limit key belongs to (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    ApiKey,
    Endpoint,
    ApiKeyEndpoint,
    Global,
    Ip,
    User,
}

impl RateLimitCategory {
    fn as_str(&self) -> &'static str {
        match self {
            RateLimitCategory::ApiKey => "ratelimit:api",
            RateLimitCategory::Endpoint => "ratelimit:endpoint",
            RateLimitCategory::ApiKeyEndpoint => "ratelimit:api_endpoint",
            RateLimitCategory::Global => "ratelimit:global",
            RateLimitCategory::Ip => "ratelimit:ip",
            RateLimitCategory::User => "ratelimit:user",
        }
    }
}

/// Outcome of a rate-limit admission check (§4.9 steps 4-5).
#[derive(Debug, Clone, Copy)]
pub enum Admission {
    Accepted { remaining: u32 },
    Denied { retry_after: Duration },
}

/// Sliding-window rate limiter (§4.9). Fails open: if the limiter's
/// internal lock were ever poisoned, admission defaults to `Accepted`
/// rather than denying traffic.
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            window,
        }
    }

    fn key(category: RateLimitCategory, identifier: &str) -> String {
        format!("{}:{}", category.as_str(), identifier)
    }

    /// Check and record admission for `identifier` under `category` against
    /// limit `limit`, following the five-step algorithm in §4.9.
    pub async fn check(
        &self,
        category: RateLimitCategory,
        identifier: &str,
        limit: u32,
    ) -> Admission {
        let key = Self::key(category, identifier);
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let entries = windows.entry(key).or_default();

        entries.retain(|&ts| now.duration_since(ts) < self.window);

        let n = entries.len() as u32;
        if n >= limit {
            let oldest = entries.first().copied().unwrap_or(now);
            let retry_after = self
                .window
                .checked_sub(now.duration_since(oldest))
                .unwrap_or(Duration::ZERO);
            Admission::Denied { retry_after }
        } else {
            entries.push(now);
            Admission::Accepted {
                remaining: limit - n - 1,
            }
        }
    }
}
