//! Error types for the Hegelion core.
//!
//! Uses `thiserror` with structured variants. Backend errors carry an
//! explicit transient/permanent classification that drives the per-phase
//! retry policy; engine errors always identify the phase that failed.

use crate::types::Phase;

/// Errors from the text-generation backend.
///
/// Variants are classified as transient (retried with backoff) or
/// permanent (surfaced immediately); see [`BackendError::is_transient`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("provider connection failed: {message}")]
    Connection { message: String },

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },
}

impl BackendError {
    /// Whether this error is transient and eligible for the retry budget.
    ///
    /// Rate limits, timeouts, and connection failures are transient;
    /// invalid requests, auth failures, and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimited { .. }
                | BackendError::Timeout { .. }
                | BackendError::Connection { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    #[error("configuration parse error: {0}")]
    Parse(#[from] Box<figment::Error>),
}

/// Top-level error type for the Hegelion core library.
#[derive(Debug, thiserror::Error)]
pub enum HegelionError {
    /// A phase exhausted its error budget. Identifies the failing phase.
    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: BackendError,
    },

    /// The run was cancelled by the caller.
    #[error("run was cancelled")]
    Cancelled,

    /// The query or its options violated an invariant.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HegelionError {
    /// The label of the failing phase, when one is attributable.
    pub fn failing_phase(&self) -> Option<String> {
        match self {
            HegelionError::Phase { phase, .. } => Some(phase.label()),
            _ => None,
        }
    }
}

/// A type alias for results using the top-level [`HegelionError`].
pub type Result<T> = std::result::Result<T, HegelionError>;
