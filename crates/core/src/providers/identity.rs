use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

/// The authenticated owner of a dataset. The core trusts `id` as the
/// owner key and stores it alongside the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
}

/// Login credentials handed to an identity provider.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// An authenticated session issued by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// External identity/session provider. Session internals (hashing, rate
/// limiting, persistence) live behind this boundary; failures surface as
/// `CoreError::Unauthorized` with a user-presentable reason.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Exchange credentials for a session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, CoreError>;

    /// Validate an existing session token.
    async fn validate(&self, token: &str) -> Result<Session, CoreError>;
}
