//! Credential Verification
//!
//! Plain equality lookup against a configured user table. Password hashing
//! is out of scope; the trait is the seam for a real identity backend.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::UserCredential;
use crate::error::UsageError;

/// Username/password pair presented at login
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Checks presented credentials
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(false)` for a mismatch; `Err` only when the check itself failed
    async fn verify(&self, credentials: &Credentials) -> Result<bool, UsageError>;
}

/// Fixed user table loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(users: &[UserCredential]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.username.clone(), u.password.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, credentials: &Credentials) -> Result<bool, UsageError> {
        Ok(self
            .users
            .get(&credentials.username)
            .is_some_and(|password| *password == credentials.password))
    }
}
