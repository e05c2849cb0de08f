//! Redis Store
//!
//! [`SharedStore`] backed by Redis or Dragonfly. All processes pointing at
//! the same instance share sessions, rate state, the leaderboard and the
//! distinct-caller sketch.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::timeout::StoreTimeout;
use super::{FieldGuard, SharedStore};
use crate::error::StoreError;
use crate::metrics;

/// Conditional multi-field HSET.
///
/// KEYS[1] hash key
/// ARGV[1] guard field, ARGV[2] "1" if a value is expected, ARGV[3] expected value,
/// ARGV[4..] field/value pairs.
const HASH_SET_IF_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if ARGV[2] == '1' then
    if current ~= ARGV[3] then
        return 0
    end
elseif current then
    return 0
end
for i = 4, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;

/// Redis/Dragonfly store backend
pub struct RedisStore {
    connection_manager: ConnectionManager,
    timeout: StoreTimeout,
    hash_set_if: Script,
}

impl RedisStore {
    /// Connect and verify the server answers PING
    pub async fn connect(url: &str, timeout: StoreTimeout) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            StoreError::Connection(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = timeout
            .run(async {
                ConnectionManager::new(client).await.map_err(|e| {
                    warn!("Failed to create connection manager: {}", e);
                    StoreError::Connection(format!("Failed to create connection manager: {}", e))
                })
            })
            .await?;

        let store = Self {
            connection_manager,
            timeout,
            hash_set_if: Script::new(HASH_SET_IF_SCRIPT),
        };
        store.ping().await?;

        debug!("Successfully connected to shared state store at {}", url);
        Ok(store)
    }

    /// Run one command under the operation timeout and record its outcome
    async fn query<T>(&self, operation: &'static str, cmd: redis::Cmd) -> Result<T, StoreError>
    where
        T: redis::FromRedisValue,
    {
        let mut conn = self.connection_manager.clone();
        let started = Instant::now();

        let result = self
            .timeout
            .run(async move {
                cmd.query_async::<T>(&mut conn)
                    .await
                    .map_err(StoreError::from)
            })
            .await;

        observe(operation, started, &result);
        result
    }
}

fn observe<T>(operation: &str, started: Instant, result: &Result<T, StoreError>) {
    metrics::STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());

    if let Err(e) = result {
        metrics::STORE_ERRORS_TOTAL
            .with_label_values(&[operation])
            .inc();
        warn!(operation = operation, error = %e, "Shared state store operation failed");
    }
}

fn parse_score(key: &str, raw: &str) -> Result<f64, StoreError> {
    raw.parse::<f64>().map_err(|e| StoreError::Malformed {
        key: key.to_string(),
        reason: format!("score '{}' is not a number: {}", raw, e),
    })
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("get", cmd).await
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        // EX rejects 0, so sub-second TTLs go through PX.
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64);
        self.query::<()>("set", cmd).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let deleted: i64 = self.query("del", cmd).await?;
        Ok(deleted > 0)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.query("hgetall", cmd).await
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        self.query::<i64>("hset", cmd).await.map(|_| ())
    }

    async fn hash_set_if(
        &self,
        key: &str,
        guard: FieldGuard<'_>,
        fields: &[(&str, String)],
    ) -> Result<bool, StoreError> {
        let mut invocation = self.hash_set_if.key(key);
        invocation.arg(guard.field);
        match guard.expected {
            Some(expected) => invocation.arg("1").arg(expected),
            None => invocation.arg("0").arg(""),
        };
        for (field, value) in fields {
            invocation.arg(*field).arg(value.as_str());
        }

        let mut conn = self.connection_manager.clone();
        let started = Instant::now();
        let result = self
            .timeout
            .run(async move {
                let applied: i64 = invocation
                    .invoke_async(&mut conn)
                    .await
                    .map_err(StoreError::from)?;
                Ok(applied)
            })
            .await;

        observe("hash_set_if", started, &result);
        Ok(result? == 1)
    }

    async fn ordered_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        let mut cmd = redis::cmd("ZINCRBY");
        cmd.arg(key).arg(delta).arg(member);
        let raw: String = self.query("zincrby", cmd).await?;
        parse_score(key, &raw)
    }

    async fn ordered_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let mut cmd = redis::cmd("ZSCORE");
        cmd.arg(key).arg(member);
        let raw: Option<String> = self.query("zscore", cmd).await?;
        raw.map(|s| parse_score(key, &s)).transpose()
    }

    async fn ordered_set_top_descending(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(key)
            .arg(0)
            .arg(count as i64 - 1)
            .arg("WITHSCORES");
        let pairs: Vec<(String, String)> = self.query("zrevrange", cmd).await?;

        pairs
            .into_iter()
            .map(|(member, raw)| parse_score(key, &raw).map(|score| (member, score)))
            .collect()
    }

    async fn probabilistic_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("PFADD");
        cmd.arg(key).arg(member);
        let changed: i64 = self.query("pfadd", cmd).await?;
        Ok(changed == 1)
    }

    async fn probabilistic_estimate(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("PFCOUNT");
        cmd.arg(key);
        self.query("pfcount", cmd).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let pong: String = self.query("ping", redis::cmd("PING")).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Command(format!("unexpected PING reply: {}", pong)))
        }
    }
}
