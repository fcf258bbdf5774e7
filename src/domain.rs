//! Input data model: `AttackSession` and `AnalysisRequest` (§3).

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

/// Allowable payload size, in octets (§3).
pub const MAX_PAYLOAD_BYTES: usize = 10_000;

/// Analysis depth requested for a batch (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Minimal,
    Standard,
    Deep,
}

impl AnalysisDepth {
    pub fn is_deep(&self) -> bool {
        matches!(self, AnalysisDepth::Deep)
    }
}

/// A single observed hostile interaction with a honeypot (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackSession {
    pub source_ip: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl AttackSession {
    /// Validate a single session against the structural rules in §3.
    /// Does not check `now` — the request-level validator checks "not in
    /// the future" against a single captured timestamp for determinism.
    fn validate_fields(&self) -> Result<()> {
        IpAddr::from_str(&self.source_ip)
            .map_err(|_| Error::validation(format!("invalid source_ip: {}", self.source_ip)))?;

        if self.payload.is_empty() {
            return Err(Error::validation("payload must not be empty"));
        }
        if self.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(Error::validation(format!(
                "payload exceeds {MAX_PAYLOAD_BYTES} octets"
            )));
        }

        if let Some(port) = self.target_port {
            if port == 0 {
                return Err(Error::validation("target_port must be in 1..65535"));
            }
        }

        if let Some(ref proto) = self.protocol {
            let len_ok = (2..=10).contains(&proto.len());
            let upper_ok = proto.chars().all(|c| c.is_ascii_uppercase());
            if !len_ok || !upper_ok {
                return Err(Error::validation(
                    "protocol must be 2-10 uppercase characters",
                ));
            }
        }

        Ok(())
    }
}

/// An immutable request to analyze a batch of attack sessions (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub attack_sessions: Vec<AttackSession>,
    pub analysis_depth: AnalysisDepth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl AnalysisRequest {
    /// Structural and semantic validation (§4.1, boundary behaviors §8).
    pub fn validate(&self, config: &PipelineConfig) -> Result<()> {
        let now = Utc::now();
        let count = self.attack_sessions.len();

        if count < 2 {
            return Err(Error::validation(
                "at least 2 attack sessions are required",
            ));
        }
        if count > config.max_sessions {
            return Err(Error::validation(format!(
                "at most {} attack sessions are allowed",
                config.max_sessions
            )));
        }

        for session in &self.attack_sessions {
            session.validate_fields()?;
            if session.timestamp > now {
                return Err(Error::validation("session timestamp is in the future"));
            }
        }

        if let Some(ref url) = self.callback_url {
            let is_http = url.starts_with("http://") || url.starts_with("https://");
            if !is_http {
                return Err(Error::validation(
                    "callback_url must be an http(s) URL",
                ));
            }
        }

        Ok(())
    }

    /// Distinct source addresses across the batch, used by the orchestrator
    /// and tool coordinator routing logic (§4.3, §4.5).
    pub fn distinct_source_addresses(&self) -> std::collections::BTreeSet<&str> {
        self.attack_sessions
            .iter()
            .map(|s| s.source_ip.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(ip: &str, ts: DateTime<Utc>) -> AttackSession {
        AttackSession {
            source_ip: ip.to_string(),
            timestamp: ts,
            payload: "GET /admin HTTP/1.1".to_string(),
            target_port: Some(80),
            protocol: Some("TCP".to_string()),
        }
    }

    #[test]
    fn rejects_single_session() {
        let config = PipelineConfig::default();
        let req = AnalysisRequest {
            attack_sessions: vec![session("10.0.0.1", Utc::now())],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        assert!(req.validate(&config).is_err());
    }

    #[test]
    fn accepts_max_sessions_rejects_over() {
        let config = PipelineConfig::default().with_max_sessions(3);
        let now = Utc::now();
        let ok = AnalysisRequest {
            attack_sessions: vec![
                session("10.0.0.1", now),
                session("10.0.0.2", now),
                session("10.0.0.3", now),
            ],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        assert!(ok.validate(&config).is_ok());

        let over = AnalysisRequest {
            attack_sessions: vec![
                session("10.0.0.1", now),
                session("10.0.0.2", now),
                session("10.0.0.3", now),
                session("10.0.0.4", now),
            ],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        assert!(over.validate(&config).is_err());
    }

    #[test]
    fn rejects_future_timestamp() {
        let config = PipelineConfig::default();
        let future = Utc::now() + chrono::Duration::days(1);
        let req = AnalysisRequest {
            attack_sessions: vec![session("10.0.0.1", Utc::now()), session("10.0.0.2", future)],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        assert!(req.validate(&config).is_err());
    }

    #[test]
    fn rejects_non_http_callback() {
        let config = PipelineConfig::default();
        let now = Utc::now();
        let req = AnalysisRequest {
            attack_sessions: vec![session("10.0.0.1", now), session("10.0.0.2", now)],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: Some("ftp://example.com".to_string()),
        };
        assert!(req.validate(&config).is_err());
    }

    #[test]
    fn rejects_invalid_source_ip() {
        let config = PipelineConfig::default();
        let now = Utc::now();
        let req = AnalysisRequest {
            attack_sessions: vec![session("not-an-ip", now), session("10.0.0.2", now)],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        assert!(req.validate(&config).is_err());
    }
}
