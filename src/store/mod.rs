//! Refresh token persistence
//!
//! The store is the only shared mutable state of the service. Implementations
//! must enforce uniqueness of `token` and make `rotate` atomic: the old record
//! is revoked and its successor inserted together or not at all, and a record
//! that is already revoked is never revoked a second time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::RefreshToken;
use crate::error::DatabaseError;

mod memory;
mod postgres;

pub use memory::InMemoryRefreshTokenStore;
pub use postgres::PgRefreshTokenStore;

/// Outcome of a conditional revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    /// Another caller revoked the record first; nothing was written.
    AlreadyRevoked,
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    /// `DatabaseError::UniqueConstraintViolation` if the token digest exists
    async fn insert(&self, token: &RefreshToken) -> Result<(), DatabaseError>;

    /// Exact match on all three of digest, owner and issuing client.
    async fn find_by_token_user_client(
        &self,
        token_hash: &str,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<RefreshToken>, DatabaseError>;

    /// Revoke a single record if it is not revoked yet.
    async fn mark_revoked(
        &self,
        id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
        replaced_by_token: Option<&str>,
    ) -> Result<RevokeOutcome, DatabaseError>;

    /// Revoke `current_id`, point it at `successor` and insert `successor`,
    /// as one atomic write.
    async fn rotate(
        &self,
        current_id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
        successor: &RefreshToken,
    ) -> Result<RevokeOutcome, DatabaseError>;

    /// Revoke every unrevoked record owned by `user_id`; returns the count.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
    ) -> Result<u64, DatabaseError>;
}
