//! SideGate Error Types
//!
//! Two layers of errors live here. [`ClassifiedError`] is the outcome of a single
//! provider attempt and drives the gateway state machine. [`GatewayError`] is the
//! single terminal error a caller sees when a call cannot be completed.

use std::time::Duration;
use thiserror::Error;

/// Classification of one failed completion attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    /// Credential invalid or revoked
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Credential is throttled; another key from the same pool may work
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure, timeout or server-side error
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Hard quota exhaustion for the whole provider account
    #[error("provider quota exhausted: {0}")]
    Exhausted(String),

    /// Malformed request or unrecoverable client error
    #[error("fatal request error: {0}")]
    Fatal(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

impl ClassifiedError {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedError::Auth(_) => "auth",
            ClassifiedError::RateLimited { .. } => "rate_limited",
            ClassifiedError::Unavailable(_) => "unavailable",
            ClassifiedError::Exhausted(_) => "exhausted",
            ClassifiedError::Fatal(_) => "fatal",
        }
    }
}

/// Terminal error returned by the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every credential of the provider is cooling down
    #[error(
        "All credentials for '{provider}' are cooling down{}. Retry later or add keys to the pool.",
        retry_hint(.retry_after)
    )]
    AllCredentialsCooling {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// No model or provider left to fail over to
    #[error("No eligible fallback after {attempts} attempt(s); last failure: {last}")]
    NoEligibleFallback { attempts: usize, last: String },

    /// The request would leave the isolated (offline) provider
    #[error("Isolated mode violation: {0}")]
    IsolationViolation(String),

    /// The request itself is invalid; retrying will not help
    #[error("Fatal request error from '{provider}': {message}")]
    Fatal { provider: String, message: String },

    /// The caller cancelled the call
    #[error("Call cancelled by caller")]
    Cancelled,

    /// The caller's deadline passed before a result was available
    #[error("Caller deadline exceeded")]
    DeadlineExceeded,

    /// Provider not found in configuration
    #[error("Provider '{0}' not found. Add it to sidegate.json with a `base_url` and `kind`.")]
    ProviderNotFound(String),

    /// Configuration errors (invalid JSON, dangling references, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// True when the same call may succeed later without changing the request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::AllCredentialsCooling { .. } | GatewayError::NoEligibleFallback { .. }
        )
    }

    /// Soonest moment a retry is expected to find a usable credential
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::AllCredentialsCooling { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Config(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Config(format!("IO error: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
