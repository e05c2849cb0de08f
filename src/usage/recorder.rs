//! Usage Recorder
//!
//! Counts an allowed call on the leaderboard and registers the caller in
//! the distinct-caller sketch. The two writes touch separate keys and are
//! not transactional; a failure after the increment leaves the score
//! counted but the caller possibly missing from the sketch.

use std::sync::Arc;
use tracing::debug;

use crate::error::UsageError;
use crate::store::SharedStore;

#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn SharedStore>,
    leaderboard_key: String,
    sketch_key: String,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn SharedStore>, leaderboard_key: String, sketch_key: String) -> Self {
        Self {
            store,
            leaderboard_key,
            sketch_key,
        }
    }

    /// Record one allowed call, returning the caller's new score
    pub async fn record(&self, caller: &str) -> Result<u64, UsageError> {
        let score = self
            .store
            .ordered_set_increment(&self.leaderboard_key, caller, 1.0)
            .await?;
        self.store
            .probabilistic_add(&self.sketch_key, caller)
            .await?;

        debug!(caller = %caller, score, "Recorded call");
        Ok(score.round() as u64)
    }
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder")
            .field("leaderboard_key", &self.leaderboard_key)
            .field("sketch_key", &self.sketch_key)
            .finish()
    }
}
