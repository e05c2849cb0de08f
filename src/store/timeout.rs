//! Store Operation Timeout
//!
//! Bounds every round-trip to the shared state store so a stalled backend
//! fails the request instead of hanging it.

use std::future::Future;
use std::time::Duration;
use tokio::time;

use crate::error::StoreError;

/// Per-operation timeout for store round-trips
#[derive(Debug, Clone, Copy)]
pub struct StoreTimeout {
    duration: Duration,
}

impl Default for StoreTimeout {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl StoreTimeout {
    /// Create a new store timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use pingboard::store::StoreTimeout;
    ///
    /// let timeout = StoreTimeout::new(Duration::from_millis(500));
    /// assert_eq!(timeout.duration(), Duration::from_millis(500));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run a store operation under the timeout
    ///
    /// When the deadline passes the future is dropped and
    /// [`StoreError::Timeout`] is returned; callers must not derive any
    /// write from an operation that timed out.
    pub async fn run<F, T>(&self, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match time::timeout(self.duration, future).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.duration)),
        }
    }
}
