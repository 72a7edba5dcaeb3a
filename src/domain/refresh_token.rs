use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Lifecycle state of a stored refresh token.
///
/// `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Expired,
    RevokedReplaced,
    RevokedManually,
}

/// Persisted refresh token record.
///
/// `token` and `replaced_by_token` hold SHA-256 digests of the values handed
/// to clients, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub client_id: String,
    pub user_agent: Option<String>,
    pub created_by_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    pub replaced_by_token: Option<String>,
}

impl RefreshToken {
    pub fn new(
        user_id: Uuid,
        token_hash: String,
        client_id: impl Into<String>,
        created_by_ip: Option<String>,
        user_agent: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token: token_hash,
            client_id: client_id.into(),
            user_agent,
            created_by_ip,
            created_at: now,
            expires_at: now + ttl,
            revoked_at: None,
            revoked_by_ip: None,
            replaced_by_token: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// A token expiring exactly at `now` is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }

    /// Revocation wins over expiry: reuse of a rotated token is the stronger
    /// signal.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        match (&self.revoked_at, &self.replaced_by_token) {
            (Some(_), Some(_)) => TokenState::RevokedReplaced,
            (Some(_), None) => TokenState::RevokedManually,
            (None, _) if self.is_expired_at(now) => TokenState::Expired,
            (None, _) => TokenState::Active,
        }
    }
}
