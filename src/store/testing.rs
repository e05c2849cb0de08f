//! Store double for failure-path tests
//!
//! Wraps an [`InMemoryStore`] and can be told to fail chosen operations or
//! lose every conditional write. Write attempts are counted whether or not
//! they succeed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{FieldGuard, InMemoryStore, SharedStore};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetString,
    SetString,
    Delete,
    HashGetAll,
    HashSetField,
    HashSetIf,
    OrderedSetIncrement,
    OrderedSetScore,
    OrderedSetTop,
    ProbabilisticAdd,
    ProbabilisticEstimate,
    Ping,
}

#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    failures: Mutex<HashMap<StoreOp, StoreError>>,
    contended: bool,
    writes: AtomicUsize,
    cas_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every conditional write loses the race
    pub fn contended() -> Self {
        Self {
            contended: true,
            ..Self::default()
        }
    }

    /// Make `op` time out from now on
    pub fn fail(&self, op: StoreOp) -> &Self {
        self.fail_with(op, StoreError::Timeout(Duration::from_millis(250)))
    }

    pub fn fail_with(&self, op: StoreOp, err: StoreError) -> &Self {
        self.failures.lock().unwrap().insert(op, err);
        self
    }

    /// Write operations attempted so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn cas_calls(&self) -> usize {
        self.cas_calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        match self.failures.lock().unwrap().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn write(&self, op: StoreOp) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check(op)
    }
}

#[async_trait]
impl SharedStore for FaultyStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(StoreOp::GetString)?;
        self.inner.get_string(key).await
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.write(StoreOp::SetString)?;
        self.inner.set_string(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.write(StoreOp::Delete)?;
        self.inner.delete(key).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check(StoreOp::HashGetAll)?;
        self.inner.hash_get_all(key).await
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.write(StoreOp::HashSetField)?;
        self.inner.hash_set_field(key, field, value).await
    }

    async fn hash_set_if(
        &self,
        key: &str,
        guard: FieldGuard<'_>,
        fields: &[(&str, String)],
    ) -> Result<bool, StoreError> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        self.write(StoreOp::HashSetIf)?;
        if self.contended {
            return Ok(false);
        }
        self.inner.hash_set_if(key, guard, fields).await
    }

    async fn ordered_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        self.write(StoreOp::OrderedSetIncrement)?;
        self.inner.ordered_set_increment(key, member, delta).await
    }

    async fn ordered_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.check(StoreOp::OrderedSetScore)?;
        self.inner.ordered_set_score(key, member).await
    }

    async fn ordered_set_top_descending(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.check(StoreOp::OrderedSetTop)?;
        self.inner.ordered_set_top_descending(key, count).await
    }

    async fn probabilistic_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.write(StoreOp::ProbabilisticAdd)?;
        self.inner.probabilistic_add(key, member).await
    }

    async fn probabilistic_estimate(&self, key: &str) -> Result<u64, StoreError> {
        self.check(StoreOp::ProbabilisticEstimate)?;
        self.inner.probabilistic_estimate(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check(StoreOp::Ping)
    }
}
