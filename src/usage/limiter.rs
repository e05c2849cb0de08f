//! Rate Limiter
//!
//! One call per window per caller. Each caller's timing lives in a store
//! hash with two fields:
//!
//! - `last_call_epoch`: epoch seconds of the last allowed call
//! - `block_until_offset`: seconds after `last_call_epoch` during which
//!   further calls are blocked
//!
//! A call is allowed once `now - last_call_epoch > block_until_offset`. The
//! new offset is `max(0, last_call_epoch + window - now)`, so a caller who
//! waited out the window gets an offset of zero and the block renews only
//! from the next call onwards.
//!
//! A caller's very first call stores an offset of a full window rather than
//! zero. With zero, a second call one second later would pass, and a first
//! call at t=0 must still block a call at t=10.
//!
//! Writes are compare-and-set on `last_call_epoch`. Two processes racing on
//! the same observed state cannot both win; the loser re-reads and decides
//! again against the winner's write.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{StoreError, UsageError};
use crate::store::{FieldGuard, KeySpace, SharedStore};

pub const BLOCK_FIELD: &str = "block_until_offset";
pub const LAST_CALL_FIELD: &str = "last_call_epoch";

/// Persisted per-caller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    pub block_until_offset: u64,
    pub last_call_epoch: i64,
}

impl RateState {
    /// Decode the stored hash; `None` when the caller has never called
    pub fn from_fields(
        key: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Option<Self>, StoreError> {
        let block = fields.get(BLOCK_FIELD);
        let last = fields.get(LAST_CALL_FIELD);

        let (block, last) = match (block, last) {
            (None, None) => return Ok(None),
            (Some(block), Some(last)) => (block, last),
            _ => {
                return Err(StoreError::Malformed {
                    key: key.to_string(),
                    reason: "rate state is missing a field".to_string(),
                })
            }
        };

        let malformed = |field: &str, value: &str| StoreError::Malformed {
            key: key.to_string(),
            reason: format!("{} '{}' is not an integer", field, value),
        };

        Ok(Some(Self {
            block_until_offset: block
                .parse()
                .map_err(|_| malformed(BLOCK_FIELD, block))?,
            last_call_epoch: last
                .parse()
                .map_err(|_| malformed(LAST_CALL_FIELD, last))?,
        }))
    }

    fn to_fields(self) -> [(&'static str, String); 2] {
        [
            (BLOCK_FIELD, self.block_until_offset.to_string()),
            (LAST_CALL_FIELD, self.last_call_epoch.to_string()),
        ]
    }
}

/// Outcome of an acquire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Blocked { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Pure transition for one call at `now`
///
/// Returns the state to persist when the call is allowed.
pub fn evaluate(
    previous: Option<&RateState>,
    now: i64,
    window_secs: u64,
) -> Result<RateState, u64> {
    let Some(state) = previous else {
        // First call opens a full window
        return Ok(RateState {
            block_until_offset: window_secs,
            last_call_epoch: now,
        });
    };

    // Stored values may be hand-edited; saturate instead of overflowing.
    let elapsed = now.saturating_sub(state.last_call_epoch);
    let block = i64::try_from(state.block_until_offset).unwrap_or(i64::MAX);
    let window = i64::try_from(window_secs).unwrap_or(i64::MAX);

    if elapsed > block {
        let remaining = state
            .last_call_epoch
            .saturating_add(window)
            .saturating_sub(now);
        Ok(RateState {
            block_until_offset: remaining.max(0) as u64,
            last_call_epoch: now,
        })
    } else {
        Err(block.saturating_sub(elapsed).saturating_add(1) as u64)
    }
}

/// Store-backed per-caller limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    window_secs: u64,
    max_attempts: u32,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        keys: KeySpace,
        window_secs: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            keys,
            window_secs,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Decide whether `caller` may call at `now`, recording the call if so
    ///
    /// Blocked calls leave the stored state untouched. Store failures abort
    /// the attempt; nothing is written unless the preceding read succeeded.
    pub async fn try_acquire(&self, caller: &str, now: i64) -> Result<Decision, UsageError> {
        let key = self.keys.rate_state(caller);

        for attempt in 1..=self.max_attempts {
            let fields = self.store.hash_get_all(&key).await?;
            let previous = RateState::from_fields(&key, &fields)?;

            let next = match evaluate(previous.as_ref(), now, self.window_secs) {
                Ok(next) => next,
                Err(retry_after_secs) => {
                    debug!(caller = %caller, retry_after_secs, "Call blocked");
                    return Ok(Decision::Blocked { retry_after_secs });
                }
            };

            let expected = previous.map(|s| s.last_call_epoch.to_string());
            let guard = match &expected {
                Some(last) => FieldGuard::equals(LAST_CALL_FIELD, last),
                None => FieldGuard::absent(LAST_CALL_FIELD),
            };

            if self
                .store
                .hash_set_if(&key, guard, &next.to_fields())
                .await?
            {
                debug!(
                    caller = %caller,
                    block_until_offset = next.block_until_offset,
                    "Call allowed"
                );
                return Ok(Decision::Allowed);
            }

            debug!(caller = %caller, attempt, "Rate state changed underneath us, re-reading");
        }

        Ok(Decision::Blocked {
            retry_after_secs: 1,
        })
    }

    /// Current stored state for `caller`
    pub async fn state(&self, caller: &str) -> Result<Option<RateState>, UsageError> {
        let key = self.keys.rate_state(caller);
        let fields = self.store.hash_get_all(&key).await?;
        Ok(RateState::from_fields(&key, &fields)?)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window_secs", &self.window_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
