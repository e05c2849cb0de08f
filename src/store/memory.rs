//! In-Memory Store
//!
//! Single-process implementation of [`SharedStore`] for development and
//! tests. Semantics mirror the Redis backend, including the reverse
//! lexicographic tie-break on equal ordered-set scores.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use super::sketch::DistinctSketch;
use super::{FieldGuard, SharedStore};
use crate::error::StoreError;

/// String entry with expiration
#[derive(Debug, Clone)]
struct ExpiringValue {
    value: String,
    expires_at: Instant,
}

impl ExpiringValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory shared state store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    strings: Arc<RwLock<HashMap<String, ExpiringValue>>>,
    hashes: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    ordered_sets: Arc<RwLock<HashMap<String, HashMap<String, f64>>>>,
    sketches: Arc<RwLock<HashMap<String, DistinctSketch>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

/// Descending score, then descending member, as ZREVRANGE orders ties
fn rank_descending(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.0.cmp(&a.0))
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let strings = self.strings.read().await;
        Ok(strings
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut strings = self.strings.write().await;
        strings.insert(
            key.to_string(),
            ExpiringValue {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let string_hit = {
            let mut strings = self.strings.write().await;
            strings.remove(key).is_some_and(|e| e.is_live(now))
        };
        let hash_hit = self.hashes.write().await.remove(key).is_some();
        let zset_hit = self.ordered_sets.write().await.remove(key).is_some();
        let sketch_hit = self.sketches.write().await.remove(key).is_some();

        Ok(string_hit || hash_hit || zset_hit || sketch_hit)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let hashes = self.hashes.read().await;
        Ok(hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut hashes = self.hashes.write().await;
        hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_if(
        &self,
        key: &str,
        guard: FieldGuard<'_>,
        fields: &[(&str, String)],
    ) -> Result<bool, StoreError> {
        let mut hashes = self.hashes.write().await;
        let current = hashes
            .get(key)
            .and_then(|hash| hash.get(guard.field))
            .map(String::as_str);

        if current != guard.expected {
            return Ok(false);
        }

        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(true)
    }

    async fn ordered_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        let mut sets = self.ordered_sets.write().await;
        let score = sets
            .entry(key.to_string())
            .or_default()
            .entry(member.to_string())
            .or_insert(0.0);
        *score += delta;
        Ok(*score)
    }

    async fn ordered_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let sets = self.ordered_sets.read().await;
        Ok(sets.get(key).and_then(|set| set.get(member)).copied())
    }

    async fn ordered_set_top_descending(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let sets = self.ordered_sets.read().await;
        let mut entries: Vec<(String, f64)> = match sets.get(key) {
            Some(set) => set.iter().map(|(m, s)| (m.clone(), *s)).collect(),
            None => return Ok(Vec::new()),
        };
        drop(sets);

        entries.sort_by(rank_descending);
        entries.truncate(count);
        Ok(entries)
    }

    async fn probabilistic_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut sketches = self.sketches.write().await;
        Ok(sketches
            .entry(key.to_string())
            .or_default()
            .insert(member))
    }

    async fn probabilistic_estimate(&self, key: &str) -> Result<u64, StoreError> {
        let sketches = self.sketches.read().await;
        Ok(sketches.get(key).map(DistinctSketch::estimate).unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut strings = self.strings.write().await;
        let before = strings.len();
        strings.retain(|_, entry| entry.is_live(now));
        let removed = before - strings.len();

        debug!(removed, "Completed in-memory store cleanup");
        removed
    }
}
