//! Usage Service
//!
//! Request-level entry points composed from the session gate, limiter,
//! recorder and the two read paths. Every call runs its steps
//! sequentially and stops at the first failure.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cardinality::CardinalityReader;
use super::clock::{Clock, SystemClock};
use super::credentials::{CredentialVerifier, Credentials, StaticCredentials};
use super::leaderboard::{LeaderboardEntry, LeaderboardReader};
use super::limiter::{Decision, RateLimiter};
use super::recorder::UsageRecorder;
use super::session::SessionGate;
use crate::config::Config;
use crate::error::UsageError;
use crate::metrics;
use crate::store::{KeySpace, SharedStore};

/// Result of an allowed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub message: String,
    pub caller: String,
    pub score: u64,
}

/// Usage accounting facade
#[derive(Clone)]
pub struct UsageService {
    store: Arc<dyn SharedStore>,
    sessions: SessionGate,
    limiter: RateLimiter,
    recorder: UsageRecorder,
    leaderboard: LeaderboardReader,
    cardinality: CardinalityReader,
    credentials: Arc<dyn CredentialVerifier>,
    clock: Arc<dyn Clock>,
    leaderboard_size: usize,
}

impl UsageService {
    /// Build a service with explicit collaborators
    pub fn new(
        config: &Config,
        store: Arc<dyn SharedStore>,
        credentials: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let keys = KeySpace::new(&config.store.key_prefix);

        Self {
            sessions: SessionGate::new(store.clone(), keys.clone(), config.session.ttl()),
            limiter: RateLimiter::new(
                store.clone(),
                keys.clone(),
                config.rate_limit.window_secs,
                config.rate_limit.max_acquire_attempts,
            ),
            recorder: UsageRecorder::new(
                store.clone(),
                keys.leaderboard(&config.leaderboard.key),
                keys.sketch(&config.leaderboard.sketch_key),
            ),
            leaderboard: LeaderboardReader::new(
                store.clone(),
                keys.leaderboard(&config.leaderboard.key),
            ),
            cardinality: CardinalityReader::new(
                store.clone(),
                keys.sketch(&config.leaderboard.sketch_key),
            ),
            store,
            credentials,
            clock,
            leaderboard_size: config.leaderboard.size,
        }
    }

    /// Build a service using the configured user table and the system clock
    pub fn from_config(config: &Config, store: Arc<dyn SharedStore>) -> Self {
        let credentials = StaticCredentials::new(&config.users);
        if credentials.is_empty() {
            warn!("No users configured; every login will be rejected");
        }
        Self::new(config, store, Arc::new(credentials), Arc::new(SystemClock))
    }

    pub fn session_ttl(&self) -> Duration {
        self.sessions.ttl()
    }

    pub fn leaderboard_size(&self) -> usize {
        self.leaderboard_size
    }

    /// Verify credentials and open a session
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<String, UsageError> {
        if !self.credentials.verify(credentials).await? {
            metrics::AUTH_FAILURES_TOTAL.inc();
            warn!(username = %credentials.username, "Rejected login");
            return Err(UsageError::Unauthorized(
                "Wrong username or password".to_string(),
            ));
        }

        let token = self.sessions.issue(&credentials.username).await?;
        metrics::SESSIONS_ISSUED_TOTAL.inc();
        info!(caller = %credentials.username, "Logged in");
        Ok(token)
    }

    /// Validate the session, apply the rate limit and record the call
    pub async fn perform_rate_limited_action(
        &self,
        token: &str,
    ) -> Result<ActionResult, UsageError> {
        let outcome = self.run_action(token).await;

        let label = match &outcome {
            Ok(_) => "allowed",
            Err(UsageError::RateLimited { .. }) => "blocked",
            Err(UsageError::Unauthorized(_)) => "unauthorized",
            Err(_) => "error",
        };
        metrics::PING_REQUESTS_TOTAL.with_label_values(&[label]).inc();

        outcome
    }

    async fn run_action(&self, token: &str) -> Result<ActionResult, UsageError> {
        let caller = match self.sessions.validate(token).await {
            Ok(caller) => caller,
            Err(e) => {
                if matches!(e, UsageError::Unauthorized(_)) {
                    metrics::AUTH_FAILURES_TOTAL.inc();
                }
                return Err(e);
            }
        };

        let now = self.clock.now_epoch_secs();
        match self.limiter.try_acquire(&caller, now).await? {
            Decision::Allowed => {}
            Decision::Blocked { retry_after_secs } => {
                return Err(UsageError::RateLimited { retry_after_secs });
            }
        }

        let score = self.recorder.record(&caller).await?;
        debug!(caller = %caller, score, "Action performed");

        Ok(ActionResult {
            message: "Ping succeeded.".to_string(),
            caller,
            score,
        })
    }

    /// Top callers, with `k` capped at the configured leaderboard size
    pub async fn get_leaderboard(&self, k: usize) -> Result<Vec<LeaderboardEntry>, UsageError> {
        self.leaderboard.top_k(k.min(self.leaderboard_size)).await
    }

    pub async fn get_distinct_caller_estimate(&self) -> Result<u64, UsageError> {
        let estimate = self.cardinality.estimate_distinct_count().await?;
        metrics::DISTINCT_CALLERS_ESTIMATE.set(estimate.min(i64::MAX as u64) as i64);
        Ok(estimate)
    }

    /// Revoke a session; unknown tokens are not an error
    pub async fn logout(&self, token: &str) -> Result<bool, UsageError> {
        let revoked = self.sessions.revoke(token).await?;
        debug!(revoked, "Logout");
        Ok(revoked)
    }

    /// Store liveness
    pub async fn health(&self) -> Result<(), UsageError> {
        Ok(self.store.ping().await?)
    }

    /// Sweep expired store entries every `every` until the handle is aborted
    pub fn start_cleanup_task(&self, every: Duration) -> JoinHandle<()> {
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = store.cleanup().await;
                if removed > 0 {
                    debug!(removed, "Swept expired store entries");
                }
            }
        })
    }
}

impl std::fmt::Debug for UsageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageService")
            .field("sessions", &self.sessions)
            .field("limiter", &self.limiter)
            .field("leaderboard_size", &self.leaderboard_size)
            .finish()
    }
}
