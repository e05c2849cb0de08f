//! Usage Accounting Module
//!
//! Session-gated access to a rate-limited action, with per-caller usage
//! counts ranked on a leaderboard and an approximate count of distinct
//! callers. All state lives in the [`SharedStore`](crate::store::SharedStore),
//! so any number of processes can serve the same workload.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        UsageService                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │ SessionGate │ → │ RateLimiter │ → │UsageRecorder│        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │  ┌───────────────────┐   ┌───────────────────┐              │
//! │  │ LeaderboardReader │   │ CardinalityReader │   (reads)    │
//! │  └───────────────────┘   └───────────────────┘              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cardinality;
pub mod clock;
pub mod credentials;
pub mod leaderboard;
pub mod limiter;
pub mod recorder;
pub mod service;
pub mod session;

#[cfg(test)]
mod proptests;

pub use cardinality::CardinalityReader;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialVerifier, Credentials, StaticCredentials};
pub use leaderboard::{LeaderboardEntry, LeaderboardReader};
pub use limiter::{Decision, RateLimiter, RateState};
pub use recorder::UsageRecorder;
pub use service::{ActionResult, UsageService};
pub use session::SessionGate;
