//! Refresh Token Rotation
//!
//! The state machine behind login and refresh:
//! - `issue_pair` mints an access token and a fresh Active refresh token
//! - `rotate` validates a presented (access, refresh) pair and, on success,
//!   atomically revokes the refresh token and issues its successor
//!
//! A refresh token is only ever redeemed once. A second redemption of the
//! same token observes it as revoked and is rejected; because the token was
//! already rotated, this is logged as a possible theft.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::auth::refresh_token::{generate_refresh_token, hash_token};
use crate::auth::signer::{SignedAccessToken, Signer};
use crate::domain::{RefreshToken, TokenState, User};
use crate::error::{AppError, AuthError};
use crate::identity::IdentityProvider;
use crate::store::{RefreshTokenStore, RevokeOutcome};

/// Where a token pair is being issued to
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub client_id: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

/// A freshly issued token pair.
///
/// `refresh_token` is the plaintext value; it exists only here and in the
/// response to the client.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access_token: SignedAccessToken,
    pub refresh_token: String,
    pub record: RefreshToken,
    pub user: User,
    pub roles: Vec<String>,
}

pub struct RotationEngine {
    signer: Signer,
    store: Arc<dyn RefreshTokenStore>,
    identity: Arc<dyn IdentityProvider>,
    refresh_token_ttl: Duration,
}

impl RotationEngine {
    pub fn new(
        signer: Signer,
        store: Arc<dyn RefreshTokenStore>,
        identity: Arc<dyn IdentityProvider>,
        refresh_token_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            store,
            identity,
            refresh_token_ttl,
        }
    }

    /// Issue an access token and a new Active refresh token for `user`.
    ///
    /// The caller has already resolved the client in `context`.
    ///
    /// # Errors
    /// - `AccountDeactivated` if the user is inactive
    /// - store or signing failures
    pub async fn issue_pair(
        &self,
        user: &User,
        roles: Vec<String>,
        context: &ClientContext,
    ) -> Result<IssuedPair, AppError> {
        if !user.is_active {
            return Err(AuthError::AccountDeactivated.into());
        }

        let access_token = self.signer.sign_access_token(user, &roles)?;
        let (refresh_token, record) = self.mint_refresh_token(
            user.id,
            &context.client_id,
            &context.ip_address,
            context.user_agent.clone(),
            Utc::now(),
        );
        self.store.insert(&record).await?;

        tracing::info!(
            user_id = %user.id,
            client_id = %context.client_id,
            token_id = %record.id,
            "Token pair issued"
        );

        Ok(IssuedPair {
            access_token,
            refresh_token,
            record,
            user: user.clone(),
            roles,
        })
    }

    /// Exchange a (possibly expired) access token and its refresh token for a
    /// new pair.
    ///
    /// Checks run in a fixed order and each failure has its own reason:
    /// `InvalidAccessToken`, `UserNotFound`, `InvalidRefreshToken`,
    /// `RefreshTokenRevoked`, `RefreshTokenExpired`.
    pub async fn rotate(
        &self,
        access_token: &str,
        refresh_token: &str,
        client_id: &str,
        ip_address: &str,
    ) -> Result<IssuedPair, AppError> {
        let claims = self
            .signer
            .verify_expired(access_token)
            .ok_or(AuthError::InvalidAccessToken)?;
        let user_id = claims.user_id()?;

        let user = match self.identity.find_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Err(AuthError::UserNotFound.into()),
        };

        let current = self
            .store
            .find_by_token_user_client(&hash_token(refresh_token), user.id, client_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let now = Utc::now();
        match current.state_at(now) {
            TokenState::Active => {}
            TokenState::RevokedReplaced | TokenState::RevokedManually => {
                tracing::warn!(
                    target: "security_audit",
                    user_id = %user.id,
                    client_id = %client_id,
                    token_id = %current.id,
                    replaced = current.replaced_by_token.is_some(),
                    ip_address = %ip_address,
                    "Revoked refresh token presented"
                );
                return Err(AuthError::RefreshTokenRevoked.into());
            }
            TokenState::Expired => {
                tracing::info!(user_id = %user.id, token_id = %current.id, "Refresh token expired");
                return Err(AuthError::RefreshTokenExpired.into());
            }
        }

        // Everything that can fail happens before the commit, so a committed
        // rotation always reaches the client.
        let roles = self.identity.roles_for(&user).await?;
        let access_token = self.signer.sign_access_token(&user, &roles)?;
        let (new_refresh_token, successor) = self.mint_refresh_token(
            user.id,
            client_id,
            ip_address,
            current.user_agent.clone(),
            now,
        );

        match self
            .store
            .rotate(current.id, now, ip_address, &successor)
            .await?
        {
            RevokeOutcome::Revoked => {}
            RevokeOutcome::AlreadyRevoked => {
                tracing::warn!(
                    target: "security_audit",
                    user_id = %user.id,
                    token_id = %current.id,
                    ip_address = %ip_address,
                    "Concurrent redemption of refresh token rejected"
                );
                return Err(AuthError::RefreshTokenRevoked.into());
            }
        }

        tracing::info!(
            user_id = %user.id,
            client_id = %client_id,
            token_id = %current.id,
            successor_id = %successor.id,
            "Refresh token rotated"
        );

        Ok(IssuedPair {
            access_token,
            refresh_token: new_refresh_token,
            record: successor,
            user,
            roles,
        })
    }

    /// Revoke one of the user's own refresh tokens (logout).
    pub async fn revoke(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client_id: &str,
        ip_address: &str,
    ) -> Result<(), AppError> {
        let current = self
            .store
            .find_by_token_user_client(&hash_token(refresh_token), user_id, client_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        match self
            .store
            .mark_revoked(current.id, Utc::now(), ip_address, None)
            .await?
        {
            RevokeOutcome::Revoked => {
                tracing::info!(user_id = %user_id, token_id = %current.id, "Refresh token revoked");
                Ok(())
            }
            RevokeOutcome::AlreadyRevoked => Err(AuthError::RefreshTokenRevoked.into()),
        }
    }

    /// Revoke every active refresh token of the user (logout everywhere).
    pub async fn revoke_all(&self, user_id: Uuid, ip_address: &str) -> Result<u64, AppError> {
        let count = self
            .store
            .revoke_all_for_user(user_id, Utc::now(), ip_address)
            .await?;
        Ok(count)
    }

    fn mint_refresh_token(
        &self,
        user_id: Uuid,
        client_id: &str,
        ip_address: &str,
        user_agent: Option<String>,
        now: DateTime<Utc>,
    ) -> (String, RefreshToken) {
        let value = generate_refresh_token();
        let record = RefreshToken::new(
            user_id,
            hash_token(&value),
            client_id,
            Some(ip_address.to_string()),
            user_agent,
            self.refresh_token_ttl,
            now,
        );
        (value, record)
    }
}
