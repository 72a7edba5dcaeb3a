use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    verify_password, ClientRegistry, CredentialVerifier, DummyHash, LockoutPolicy, PasswordCheck,
    RoleProvider, UserDirectory,
};
use crate::domain::{Client, User};
use crate::error::DatabaseError;

/// PostgreSQL identity store over the `users`, `roles` and `user_roles` tables
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
    policy: LockoutPolicy,
    dummy_hash: Arc<DummyHash>,
}

impl PgIdentityStore {
    /// Stored hashes are expected at `bcrypt::DEFAULT_COST`; unknown
    /// accounts are checked against a dummy hash of the same cost.
    pub fn new(pool: PgPool, policy: LockoutPolicy) -> Self {
        Self {
            pool,
            policy,
            dummy_hash: Arc::new(DummyHash::new(bcrypt::DEFAULT_COST)),
        }
    }
}

#[async_trait]
impl UserDirectory for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, full_name, is_active FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, full_name, is_active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl CredentialVerifier for PgIdentityStore {
    async fn verify_password(
        &self,
        user: &User,
        password: &str,
    ) -> Result<PasswordCheck, DatabaseError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Row lock keeps concurrent failures from losing counter updates.
        let row = sqlx::query_as::<_, (String, bool, i32, Option<DateTime<Utc>>)>(
            r#"
            SELECT password_hash, email_confirmed, failed_login_count, lockout_end
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user.id)
        .fetch_optional(&mut tx)
        .await?;

        let (password_hash, email_confirmed, failed_login_count, lockout_end) = match row {
            Some(row) => row,
            None => return Ok(PasswordCheck::Failed),
        };

        if self.policy.is_locked(lockout_end, now) {
            return Ok(PasswordCheck::LockedOut);
        }

        if !verify_password(password, &password_hash) {
            let (count, lockout_end) = self.policy.register_failure(failed_login_count, now);
            sqlx::query(
                "UPDATE users SET failed_login_count = $2, lockout_end = COALESCE($3, lockout_end) WHERE id = $1",
            )
            .bind(user.id)
            .bind(count)
            .bind(lockout_end)
            .execute(&mut tx)
            .await?;
            tx.commit().await?;

            if lockout_end.is_some() {
                tracing::warn!(user_id = %user.id, "Account locked after repeated login failures");
                return Ok(PasswordCheck::LockedOut);
            }
            return Ok(PasswordCheck::Failed);
        }

        sqlx::query("UPDATE users SET failed_login_count = 0, lockout_end = NULL WHERE id = $1")
            .bind(user.id)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;

        if self.policy.require_confirmed_email && !email_confirmed {
            return Ok(PasswordCheck::NotAllowed);
        }
        Ok(PasswordCheck::Success)
    }
    async fn verify_unknown_user(&self, password: &str) {
        self.dummy_hash.verify(password).await;
    }
}

#[async_trait]
impl RoleProvider for PgIdentityStore {
    async fn roles_for(&self, user: &User) -> Result<Vec<String>, DatabaseError> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }
}

#[derive(Clone)]
pub struct PgClientRegistry {
    pool: PgPool,
}

impl PgClientRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRegistry for PgClientRegistry {
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, DatabaseError> {
        let client =
            sqlx::query_as::<_, Client>("SELECT id, name, is_active FROM clients WHERE id = $1")
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(client)
    }
}
