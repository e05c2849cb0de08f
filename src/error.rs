//! Error Types
//!
//! Store-level failures and the caller-facing usage error taxonomy.

use std::time::Duration;

/// Errors raised by a shared state store backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the store
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command
    #[error("Store command failed: {0}")]
    Command(String),

    /// The store did not answer in time
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value could not be interpreted
    #[error("Malformed value at key '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            StoreError::Connection(err.to_string())
        } else if err.is_timeout() {
            StoreError::Command(format!("timeout: {}", err))
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Errors surfaced by the usage-accounting core
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// Missing, invalid or expired session, or rejected credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller exceeded its allowed call cadence
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Shared state store unreachable or misbehaving
    #[error("Shared state store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Leaderboard read failed
    #[error("Leaderboard unavailable: {0}")]
    LeaderboardUnavailable(#[source] StoreError),

    /// Distinct-caller estimate read failed
    #[error("Distinct-caller estimator unavailable: {0}")]
    EstimatorUnavailable(#[source] StoreError),

    /// Credential lookup failed
    #[error("Credential store unavailable: {0}")]
    CredentialsUnavailable(String),
}

impl UsageError {
    /// Whether this failure is an operational signal rather than a caller error
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            UsageError::StoreUnavailable(_)
                | UsageError::LeaderboardUnavailable(_)
                | UsageError::EstimatorUnavailable(_)
                | UsageError::CredentialsUnavailable(_)
        )
    }
}

impl From<StoreError> for UsageError {
    fn from(err: StoreError) -> Self {
        UsageError::StoreUnavailable(err)
    }
}
