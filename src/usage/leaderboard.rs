//! Leaderboard Reader
//!
//! Top-k callers by cumulative allowed calls. Equal scores keep the store's
//! ordering, which is reverse lexicographic by caller.

use serde::Serialize;
use std::sync::Arc;

use crate::error::UsageError;
use crate::store::SharedStore;

/// One ranked caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub caller: String,
    pub score: u64,
}

#[derive(Clone)]
pub struct LeaderboardReader {
    store: Arc<dyn SharedStore>,
    key: String,
}

impl LeaderboardReader {
    pub fn new(store: Arc<dyn SharedStore>, key: String) -> Self {
        Self { store, key }
    }

    /// At most `k` entries, highest score first
    pub async fn top_k(&self, k: usize) -> Result<Vec<LeaderboardEntry>, UsageError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let ranked = self
            .store
            .ordered_set_top_descending(&self.key, k)
            .await
            .map_err(UsageError::LeaderboardUnavailable)?;

        Ok(ranked
            .into_iter()
            .map(|(caller, score)| LeaderboardEntry {
                caller,
                score: score.round() as u64,
            })
            .collect())
    }
}

impl std::fmt::Debug for LeaderboardReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardReader")
            .field("key", &self.key)
            .finish()
    }
}
