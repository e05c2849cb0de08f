//! Session Gate
//!
//! Resolves an opaque session token to the caller it was issued for.
//! Sessions are store strings with a fixed TTL and no renewal.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::UsageError;
use crate::store::{KeySpace, SharedStore};

/// Issues, validates and revokes sessions
#[derive(Clone)]
pub struct SessionGate {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    ttl: Duration,
}

impl SessionGate {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, ttl: Duration) -> Self {
        Self { store, keys, ttl }
    }

    /// Session lifetime applied at issue time
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve `token` to its caller identity
    ///
    /// Missing, unknown and expired tokens are all `Unauthorized`. A
    /// successful lookup has no side effects.
    pub async fn validate(&self, token: &str) -> Result<String, UsageError> {
        if token.is_empty() {
            return Err(UsageError::Unauthorized("missing session token".to_string()));
        }

        match self.store.get_string(&self.keys.session(token)).await? {
            Some(caller) => Ok(caller),
            None => {
                debug!("Rejected unknown or expired session token");
                Err(UsageError::Unauthorized(
                    "invalid or expired session".to_string(),
                ))
            }
        }
    }

    /// Create a session for `caller` and return its token
    pub async fn issue(&self, caller: &str) -> Result<String, UsageError> {
        let token = uuid::Uuid::new_v4().to_string();
        self.store
            .set_string(&self.keys.session(&token), caller, self.ttl)
            .await?;

        debug!(caller = %caller, ttl_secs = self.ttl.as_secs(), "Issued session");
        Ok(token)
    }

    /// Invalidate a session, returning whether it was still live
    pub async fn revoke(&self, token: &str) -> Result<bool, UsageError> {
        if token.is_empty() {
            return Ok(false);
        }
        Ok(self.store.delete(&self.keys.session(token)).await?)
    }
}

impl std::fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate")
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish()
    }
}
