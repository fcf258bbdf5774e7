//! Tool Coordinator (C4, §4.5): concurrent fan-out to enrichment lookups and
//! synthesis of clustering/proximity/correlation scores.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::cache::{Cache, Namespace};
use crate::error::Result;

/// Enrichment tool identifiers (§4.5 tool set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolName {
    BgpLookup,
    ThreatIntel,
    Geolocation,
    AsnAnalysis,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::BgpLookup => "bgp_lookup",
            ToolName::ThreatIntel => "threat_intel",
            ToolName::Geolocation => "geolocation",
            ToolName::AsnAnalysis => "asn_analysis",
        }
    }
}

/// Per-address lookup result for one tool; serialized into
/// `intermediate.tool_results` keyed by tool name (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupOutcome {
    Bgp { asn: u32, prefix: String },
    Threat { threat_score: f64, reputation: String },
    Geo { country: String, city: String },
    Asn { asn: u32, org: String },
    Error { error: String },
}

/// A single enrichment lookup collaborator, invoked once per address.
#[async_trait]
pub trait EnrichmentTool: Send + Sync {
    async fn lookup(&self, addr: &str) -> Result<LookupOutcome>;
}

/// Deterministic mock for `bgp_lookup` (§4.5, §9 "no live network
/// dependency" ambient concern): ASN derived from the address's octets so
/// repeated runs over the same input are stable.
pub struct MockBgpLookup;

#[async_trait]
impl EnrichmentTool for MockBgpLookup {
    async fn lookup(&self, addr: &str) -> Result<LookupOutcome> {
        let asn = 64000 + (fnv_hash(addr) % 10) as u32;
        Ok(LookupOutcome::Bgp {
            asn,
            prefix: format!("{}/24", prefix_of(addr)),
        })
    }
}

/// Deterministic mock for `threat_intel`.
pub struct MockThreatIntel;

#[async_trait]
impl EnrichmentTool for MockThreatIntel {
    async fn lookup(&self, addr: &str) -> Result<LookupOutcome> {
        let score = ((fnv_hash(addr) % 100) as f64) / 100.0;
        let reputation = if score > 0.7 {
            "malicious"
        } else if score > 0.3 {
            "suspicious"
        } else {
            "neutral"
        };
        Ok(LookupOutcome::Threat {
            threat_score: score,
            reputation: reputation.to_string(),
        })
    }
}

/// Deterministic mock for `geolocation`.
pub struct MockGeolocation;

#[async_trait]
impl EnrichmentTool for MockGeolocation {
    async fn lookup(&self, addr: &str) -> Result<LookupOutcome> {
        const COUNTRIES: [(&str, &str); 3] = [("US", "Ashburn"), ("NL", "Amsterdam"), ("SG", "Singapore")];
        let (country, city) = COUNTRIES[(fnv_hash(addr) % 3) as usize];
        Ok(LookupOutcome::Geo {
            country: country.to_string(),
            city: city.to_string(),
        })
    }
}

/// Deterministic mock for `asn_analysis` (§4.5, only invoked when depth=deep).
pub struct MockAsnAnalysis;

#[async_trait]
impl EnrichmentTool for MockAsnAnalysis {
    async fn lookup(&self, addr: &str) -> Result<LookupOutcome> {
        let asn = 64000 + (fnv_hash(addr) % 10) as u32;
        Ok(LookupOutcome::Asn {
            asn,
            org: format!("AS{asn} Hosting"),
        })
    }
}

fn fnv_hash(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn prefix_of(addr: &str) -> String {
    let octets: Vec<&str> = addr.splitn(4, '.').collect();
    if octets.len() == 4 {
        format!("{}.{}.{}.0", octets[0], octets[1], octets[2])
    } else {
        addr.to_string()
    }
}

/// Synthesized enrichment scores written to `intermediate.enrichment_data`
/// (§4.5).
#[derive(Debug, Clone)]
pub struct EnrichmentSynthesis {
    pub infrastructure_clustering: f64,
    pub geographic_proximity: f64,
    pub threat_correlation: f64,
}

/// Coordinates concurrent enrichment lookups and result synthesis (§4.5).
pub struct ToolCoordinator {
    tools: HashMap<ToolName, Arc<dyn EnrichmentTool>>,
    max_concurrent: usize,
    cache: Arc<Cache>,
}

impl ToolCoordinator {
    /// Build with the default mock implementations.
    pub fn with_defaults(max_concurrent: usize, cache: Arc<Cache>) -> Self {
        let mut tools: HashMap<ToolName, Arc<dyn EnrichmentTool>> = HashMap::new();
        tools.insert(ToolName::BgpLookup, Arc::new(MockBgpLookup));
        tools.insert(ToolName::ThreatIntel, Arc::new(MockThreatIntel));
        tools.insert(ToolName::Geolocation, Arc::new(MockGeolocation));
        tools.insert(ToolName::AsnAnalysis, Arc::new(MockAsnAnalysis));
        Self { tools, max_concurrent, cache }
    }

    /// The tool set for a given depth (§4.5): base three, plus
    /// `asn_analysis` when deep.
    pub fn tool_set(include_asn: bool) -> Vec<ToolName> {
        let mut tools = vec![ToolName::BgpLookup, ToolName::ThreatIntel, ToolName::Geolocation];
        if include_asn {
            tools.push(ToolName::AsnAnalysis);
        }
        tools
    }

    /// Fan out all per-address lookups for `tool` concurrently, bounded by
    /// `max_concurrent` (§5 resource model). A single address's failure
    /// yields an `Error` outcome for that address only; other addresses
    /// proceed (§4.5 per-tool isolation extended to per-address).
    async fn run_tool(&self, tool: ToolName, addrs: &BTreeSet<&str>) -> BTreeMap<String, LookupOutcome> {
        let Some(implementation) = self.tools.get(&tool) else {
            return addrs
                .iter()
                .map(|addr| {
                    (
                        addr.to_string(),
                        LookupOutcome::Error {
                            error: format!("tool {} not registered", tool.as_str()),
                        },
                    )
                })
                .collect();
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let futures = addrs.iter().map(|&addr| {
            let implementation = Arc::clone(implementation);
            let semaphore = Arc::clone(&semaphore);
            let cache = Arc::clone(&self.cache);
            let cache_key = format!("{}:{}", tool.as_str(), addr);
            let addr = addr.to_string();
            async move {
                if let Some(cached) = cache.get::<LookupOutcome>(Namespace::Enrichment, &cache_key).await {
                    return (addr, cached);
                }

                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let outcome = implementation
                    .lookup(&addr)
                    .await
                    .unwrap_or_else(|err| LookupOutcome::Error { error: err.to_string() });
                if let Err(err) = cache.set(Namespace::Enrichment, &cache_key, &outcome, None).await {
                    tracing::warn!(error = %err, tool = %cache_key, "failed to cache enrichment lookup");
                }
                (addr, outcome)
            }
        });

        join_all(futures).await.into_iter().collect()
    }

    /// Run the full tool set over `addrs` and synthesize the enrichment
    /// scores (§4.5). Deterministic in the tool outputs regardless of
    /// fan-out ordering (O3: merged by key).
    pub async fn coordinate(
        &self,
        addrs: &BTreeSet<&str>,
        include_asn: bool,
    ) -> (HashMap<String, BTreeMap<String, LookupOutcome>>, EnrichmentSynthesis) {
        let tools = Self::tool_set(include_asn);
        let mut results = HashMap::new();
        for tool in tools {
            let outcome = self.run_tool(tool, addrs).await;
            results.insert(tool.as_str().to_string(), outcome);
        }

        let synthesis = synthesize(addrs.len(), &results);
        (results, synthesis)
    }
}

fn synthesize(address_count: usize, results: &HashMap<String, BTreeMap<String, LookupOutcome>>) -> EnrichmentSynthesis {
    let asns: BTreeSet<u32> = results
        .get(ToolName::BgpLookup.as_str())
        .into_iter()
        .flat_map(|m| m.values())
        .filter_map(|outcome| match outcome {
            LookupOutcome::Bgp { asn, .. } => Some(*asn),
            _ => None,
        })
        .collect();

    let infrastructure_clustering = if address_count == 0 {
        0.0
    } else if asns.len() == 1 {
        0.8
    } else if asns.len() < address_count {
        0.5
    } else {
        0.0
    };

    let countries: BTreeSet<&str> = results
        .get(ToolName::Geolocation.as_str())
        .into_iter()
        .flat_map(|m| m.values())
        .filter_map(|outcome| match outcome {
            LookupOutcome::Geo { country, .. } => Some(country.as_str()),
            _ => None,
        })
        .collect();

    let geographic_proximity = if address_count == 0 {
        0.0
    } else if countries.len() == 1 {
        0.8
    } else if countries.len() < address_count {
        0.5
    } else {
        0.0
    };

    let threat_scores: Vec<f64> = results
        .get(ToolName::ThreatIntel.as_str())
        .into_iter()
        .flat_map(|m| m.values())
        .filter_map(|outcome| match outcome {
            LookupOutcome::Threat { threat_score, .. } => Some(*threat_score),
            _ => None,
        })
        .collect();

    let threat_correlation = if threat_scores.is_empty() {
        0.0
    } else {
        threat_scores.iter().sum::<f64>() / threat_scores.len() as f64
    };

    EnrichmentSynthesis {
        infrastructure_clustering,
        geographic_proximity,
        threat_correlation,
    }
}
