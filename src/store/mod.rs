//! Shared State Store
//!
//! Every piece of cross-request state (sessions, per-caller rate state, the
//! leaderboard and the distinct-caller sketch) lives behind [`SharedStore`].
//! Core components hold no local cache; each read is authoritative at the
//! time it is made.
//!
//! # Backends
//!
//! - [`RedisStore`]: Redis/Dragonfly, shared by every process serving the workload
//! - [`InMemoryStore`]: single-process backend for development and tests
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Session Gate │  │ Rate Limiter │  │   Recorder   │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ strings         │ hashes          │ zset + sketch
//! ┌──────┴─────────────────┴─────────────────┴───────┐
//! │                  SharedStore                      │
//! └───────────────────────────────────────────────────┘
//! ```

pub mod memory;
pub mod redis_store;
pub mod sketch;
#[cfg(test)]
pub(crate) mod testing;
pub mod timeout;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

pub use self::memory::InMemoryStore;
pub use self::redis_store::RedisStore;
pub use self::timeout::StoreTimeout;

/// Guard for a conditional hash write
///
/// The write only happens when `field` currently holds `expected`
/// (`None` meaning the field is absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGuard<'a> {
    pub field: &'a str,
    pub expected: Option<&'a str>,
}

impl<'a> FieldGuard<'a> {
    /// Guard requiring the field to be absent
    pub fn absent(field: &'a str) -> Self {
        Self {
            field,
            expected: None,
        }
    }

    /// Guard requiring the field to hold `value`
    pub fn equals(field: &'a str, value: &'a str) -> Self {
        Self {
            field,
            expected: Some(value),
        }
    }
}

/// Primitive operations the usage core needs from its backing store
///
/// Each operation is atomic on its own; no cross-key transactions exist.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string value that expires after `ttl`
    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete a key of any type, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Read every field of a hash (empty when the key is absent)
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Set a single hash field
    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Set several hash fields at once if the guard holds
    ///
    /// Returns `false` without writing anything when the guard fails.
    async fn hash_set_if(
        &self,
        key: &str,
        guard: FieldGuard<'_>,
        fields: &[(&str, String)],
    ) -> Result<bool, StoreError>;

    /// Atomically add `delta` to a member's score, inserting it at 0 first
    async fn ordered_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, StoreError>;

    /// Read a member's score
    async fn ordered_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;

    /// Highest-scored members first, at most `count` of them
    async fn ordered_set_top_descending(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Register a member in a probabilistic set, returning whether the sketch changed
    async fn probabilistic_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Estimated number of distinct members ever added
    async fn probabilistic_estimate(&self, key: &str) -> Result<u64, StoreError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), StoreError>;

    /// Drop expired entries, returning how many were removed
    ///
    /// Backends with native key expiry keep the default no-op.
    async fn cleanup(&self) -> usize {
        0
    }
}

/// Builds namespaced store keys
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches(':').to_string(),
        }
    }

    fn join(&self, rest: &str) -> String {
        if self.prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}:{}", self.prefix, rest)
        }
    }

    pub fn session(&self, token: &str) -> String {
        self.join(&format!("session:{}", token))
    }

    pub fn rate_state(&self, caller: &str) -> String {
        self.join(&format!("ratelimit:{}", caller))
    }

    pub fn leaderboard(&self, name: &str) -> String {
        self.join(name)
    }

    pub fn sketch(&self, name: &str) -> String {
        self.join(name)
    }
}

/// Open the store selected by configuration
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn SharedStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory shared state store (single process only)");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Redis => {
            let timeout = StoreTimeout::from_millis(config.operation_timeout_ms);
            let store = RedisStore::connect(&config.url, timeout).await?;
            Ok(Arc::new(store))
        }
    }
}
