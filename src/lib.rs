//! Pingboard Library
//!
//! Session-gated access to a rate-limited action, backed by a shared
//! TTL store, with a usage leaderboard and a distinct-caller estimate.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod store;
pub mod usage;

pub use config::Config;
pub use error::{StoreError, UsageError};
pub use usage::UsageService;
