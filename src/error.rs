//! Error taxonomy for the coordination analysis pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the pipeline's public operations and internal stages.
///
/// Cross-stage, errors never propagate: the workflow engine catches at the
/// stage boundary and converts failures into a recorded `StageError` plus
/// stage-specific defaults. Only `ValidationError`, `AuthError`,
/// `RateLimitError`, `NotFound`, and `FatalError` are ever visible to a
/// caller synchronously or via a terminal `failed` status.
#[derive(Error, Debug)]
pub enum Error {
    /// Submit input failed structural or semantic validation; no state created.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing or invalid API key.
    #[error("authentication error: {0}")]
    AuthError(String),

    /// Rate limiter denied the request.
    #[error("rate limit exceeded for {key}, retry after {retry_after_secs}s")]
    RateLimitError { key: String, retry_after_secs: u64 },

    /// Get for an unknown or expired analysis id.
    #[error("analysis not found: {0}")]
    NotFound(Uuid),

    /// A pipeline stage failed; captured into state.errors, defaults applied.
    #[error("stage '{stage}' failed: {message}")]
    StageError { stage: String, message: String },

    /// An external collaborator (LLM or enrichment tool) was unreachable or errored.
    #[error("external service '{service}' unavailable: {message}")]
    ExternalUnavailable { service: String, message: String },

    /// The cache or rate-limiter backend failed.
    #[error("cache error: {0}")]
    CacheError(String),

    /// A suspendable operation exceeded its deadline.
    #[error("operation timed out after {duration_ms}ms")]
    TimeoutError { duration_ms: u64 },

    /// State Store write failure or invariant breach; pipeline terminates.
    #[error("fatal error: {0}")]
    FatalError(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthError(message.into())
    }

    pub fn rate_limited(key: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::RateLimitError {
            key: key.into(),
            retry_after_secs,
        }
    }

    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(id)
    }

    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageError {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn external_unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::CacheError(message.into())
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::TimeoutError { duration_ms }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::FatalError(message.into())
    }

    /// Whether this error should be recorded and absorbed by the engine
    /// rather than escalated to the caller (§7 propagation policy).
    pub fn is_recoverable_stage_error(&self) -> bool {
        matches!(
            self,
            Error::StageError { .. }
                | Error::ExternalUnavailable { .. }
                | Error::TimeoutError { .. }
        )
    }

    /// HTTP-ish status code an embedding HTTP layer would map this to (§6).
    pub fn http_status_hint(&self) -> u16 {
        match self {
            Error::ValidationError(_) => 400,
            Error::AuthError(_) => 401,
            Error::NotFound(_) => 404,
            Error::RateLimitError { .. } => 429,
            Error::StageError { .. }
            | Error::ExternalUnavailable { .. }
            | Error::TimeoutError { .. } => 500,
            Error::CacheError(_) => 503,
            Error::FatalError(_) => 500,
            Error::Serialization(_) => 422,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::FatalError(format!("state store error: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::TimeoutError {
                duration_ms: 0,
            }
        } else {
            Error::ExternalUnavailable {
                service: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.to_string(),
            }
        }
    }
}
