//! In-memory refresh token store for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RefreshTokenStore, RevokeOutcome};
use crate::domain::RefreshToken;
use crate::error::DatabaseError;

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, RefreshToken>,
    /// token digest -> record id; doubles as the uniqueness constraint
    by_token: HashMap<String, Uuid>,
}

impl Records {
    fn insert(&mut self, token: &RefreshToken) -> Result<(), DatabaseError> {
        if self.by_token.contains_key(&token.token) || self.by_id.contains_key(&token.id) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens.token".to_string(),
            ));
        }
        self.by_token.insert(token.token.clone(), token.id);
        self.by_id.insert(token.id, token.clone());
        Ok(())
    }
}

/// All state sits behind one mutex, so every trait method is a single
/// critical section.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<Records>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by digest alone, for inspection in tests.
    pub async fn find_by_token(&self, token_hash: &str) -> Option<RefreshToken> {
        let records = self.records.lock().await;
        records
            .by_token
            .get(token_hash)
            .and_then(|id| records.by_id.get(id))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: &RefreshToken) -> Result<(), DatabaseError> {
        self.records.lock().await.insert(token)
    }

    async fn find_by_token_user_client(
        &self,
        token_hash: &str,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<RefreshToken>, DatabaseError> {
        let records = self.records.lock().await;
        Ok(records
            .by_token
            .get(token_hash)
            .and_then(|id| records.by_id.get(id))
            .filter(|t| t.user_id == user_id && t.client_id == client_id)
            .cloned())
    }

    async fn mark_revoked(
        &self,
        id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
        replaced_by_token: Option<&str>,
    ) -> Result<RevokeOutcome, DatabaseError> {
        let mut records = self.records.lock().await;
        let record = records
            .by_id
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("refresh token {}", id)))?;

        if record.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        record.revoked_at = Some(revoked_at);
        record.revoked_by_ip = Some(revoked_by_ip.to_string());
        record.replaced_by_token = replaced_by_token.map(str::to_string);
        Ok(RevokeOutcome::Revoked)
    }

    async fn rotate(
        &self,
        current_id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
        successor: &RefreshToken,
    ) -> Result<RevokeOutcome, DatabaseError> {
        let mut records = self.records.lock().await;

        match records.by_id.get(&current_id) {
            None => {
                return Err(DatabaseError::NotFound(format!(
                    "refresh token {}",
                    current_id
                )))
            }
            Some(current) if current.revoked_at.is_some() => {
                return Ok(RevokeOutcome::AlreadyRevoked)
            }
            Some(_) => {}
        }

        // Insert first: a collision leaves the current record untouched.
        records.insert(successor)?;

        if let Some(current) = records.by_id.get_mut(&current_id) {
            current.revoked_at = Some(revoked_at);
            current.revoked_by_ip = Some(revoked_by_ip.to_string());
            current.replaced_by_token = Some(successor.token.clone());
        }
        Ok(RevokeOutcome::Revoked)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
    ) -> Result<u64, DatabaseError> {
        let mut records = self.records.lock().await;
        let mut revoked = 0;
        for record in records
            .by_id
            .values_mut()
            .filter(|t| t.user_id == user_id && t.revoked_at.is_none())
        {
            record.revoked_at = Some(revoked_at);
            record.revoked_by_ip = Some(revoked_by_ip.to_string());
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user_id: Uuid, digest: &str, client_id: &str) -> RefreshToken {
        RefreshToken::new(
            user_id,
            digest.to_string(),
            client_id,
            Some("10.0.0.1".to_string()),
            Some("test-agent".to_string()),
            Duration::days(7),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();

        store.insert(&record(user_id, "a", "web-client")).await.unwrap();
        let result = store.insert(&record(user_id, "a", "web-client")).await;

        assert!(matches!(
            result,
            Err(DatabaseError::UniqueConstraintViolation(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_requires_matching_user_and_client() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        store.insert(&record(user_id, "a", "web-client")).await.unwrap();

        let found = store
            .find_by_token_user_client("a", user_id, "web-client")
            .await
            .unwrap();
        assert!(found.is_some());

        let other_client = store
            .find_by_token_user_client("a", user_id, "ios-client")
            .await
            .unwrap();
        assert!(other_client.is_none());

        let other_user = store
            .find_by_token_user_client("a", Uuid::new_v4(), "web-client")
            .await
            .unwrap();
        assert!(other_user.is_none());
    }

    #[tokio::test]
    async fn test_rotate_links_and_revokes() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let current = record(user_id, "a", "web-client");
        let successor = record(user_id, "b", "web-client");
        store.insert(&current).await.unwrap();

        let outcome = store
            .rotate(current.id, Utc::now(), "10.0.0.2", &successor)
            .await
            .unwrap();
        assert_eq!(outcome, RevokeOutcome::Revoked);

        let old = store.find_by_token("a").await.unwrap();
        assert!(old.revoked_at.is_some());
        assert_eq!(old.revoked_by_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(old.replaced_by_token.as_deref(), Some("b"));
        assert!(store.find_by_token("b").await.is_some());

        let again = store
            .rotate(current.id, Utc::now(), "10.0.0.2", &record(user_id, "c", "web-client"))
            .await
            .unwrap();
        assert_eq!(again, RevokeOutcome::AlreadyRevoked);
        assert!(store.find_by_token("c").await.is_none());
    }

    #[tokio::test]
    async fn test_rotate_collision_leaves_current_active() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let current = record(user_id, "a", "web-client");
        store.insert(&current).await.unwrap();
        store.insert(&record(user_id, "b", "web-client")).await.unwrap();

        let result = store
            .rotate(current.id, Utc::now(), "10.0.0.2", &record(user_id, "b", "web-client"))
            .await;

        assert!(result.is_err());
        assert!(store.find_by_token("a").await.unwrap().revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.insert(&record(user_id, "a", "web-client")).await.unwrap();
        store.insert(&record(user_id, "b", "ios-client")).await.unwrap();
        store.insert(&record(other, "c", "web-client")).await.unwrap();

        let count = store
            .revoke_all_for_user(user_id, Utc::now(), "10.0.0.1")
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert!(store.find_by_token("c").await.unwrap().revoked_at.is_none());
    }
}
