use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RefreshTokenStore, RevokeOutcome};
use crate::domain::RefreshToken;
use crate::error::DatabaseError;

/// PostgreSQL-backed refresh token store.
///
/// Relies on `UNIQUE (token)` in the schema. Revocation is a conditional
/// `UPDATE ... WHERE revoked_at IS NULL`; under concurrent rotations of the
/// same record the row lock serialises the updates and the loser matches
/// zero rows.
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_TOKEN: &str = r#"
    INSERT INTO refresh_tokens
        (id, user_id, token, client_id, user_agent, created_by_ip, created_at, expires_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const REVOKE_TOKEN: &str = r#"
    UPDATE refresh_tokens
    SET revoked_at = $2, revoked_by_ip = $3, replaced_by_token = $4
    WHERE id = $1 AND revoked_at IS NULL
"#;

fn bind_insert<'q>(
    token: &'q RefreshToken,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(INSERT_TOKEN)
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(&token.client_id)
        .bind(&token.user_agent)
        .bind(&token.created_by_ip)
        .bind(token.created_at)
        .bind(token.expires_at)
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: &RefreshToken) -> Result<(), DatabaseError> {
        bind_insert(token).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_token_user_client(
        &self,
        token_hash: &str,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<RefreshToken>, DatabaseError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token, client_id, user_agent, created_by_ip,
                   created_at, expires_at, revoked_at, revoked_by_ip, replaced_by_token
            FROM refresh_tokens
            WHERE token = $1 AND user_id = $2 AND client_id = $3
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn mark_revoked(
        &self,
        id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
        replaced_by_token: Option<&str>,
    ) -> Result<RevokeOutcome, DatabaseError> {
        let result = sqlx::query(REVOKE_TOKEN)
            .bind(id)
            .bind(revoked_at)
            .bind(revoked_by_ip)
            .bind(replaced_by_token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        Ok(RevokeOutcome::Revoked)
    }

    async fn rotate(
        &self,
        current_id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
        successor: &RefreshToken,
    ) -> Result<RevokeOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(REVOKE_TOKEN)
            .bind(current_id)
            .bind(revoked_at)
            .bind(revoked_by_ip)
            .bind(&successor.token)
            .execute(&mut tx)
            .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        bind_insert(successor).execute(&mut tx).await?;
        tx.commit().await?;

        Ok(RevokeOutcome::Revoked)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: &str,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_by_ip = $3
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(revoked_at)
        .bind(revoked_by_ip)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, count = result.rows_affected(), "All refresh tokens revoked for user");
        Ok(result.rows_affected())
    }
}
