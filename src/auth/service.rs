//! Authentication Facade
//!
//! `AuthService` is the boundary between the HTTP layer and the rotation
//! engine. Every outcome, including infrastructure failures, comes back as an
//! `AuthResult`; nothing is propagated as an error past this point.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::rotation::{ClientContext, IssuedPair, RotationEngine};
use crate::error::{AppError, AuthError};
use crate::identity::{ClientRegistry, IdentityProvider, PasswordCheck};

/// POST /auth/login body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub client_id: String,
}

/// POST /auth/refresh body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
}

/// POST /api/logout body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub refresh_token: String,
    pub client_id: String,
}

/// Transport metadata recorded on issued refresh tokens
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

impl From<IssuedPair> for TokenResponse {
    fn from(pair: IssuedPair) -> Self {
        Self {
            access_token: pair.access_token.token,
            refresh_token: pair.refresh_token,
            access_token_expires_at: pair.access_token.expires_at,
            refresh_token_expires_at: pair.record.expires_at,
            user: UserSummary {
                id: pair.user.id,
                email: pair.user.email,
                full_name: pair.user.full_name,
                roles: pair.roles,
            },
        }
    }
}

/// Why a request failed; drives the HTTP status, never serialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Rejected(AuthError),
    Internal,
}

/// Uniform success/failure envelope
#[derive(Debug, Clone, Serialize)]
pub struct AuthResult<T> {
    pub success: bool,
    pub message: String,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl<T> AuthResult<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: Vec::new(),
            data: Some(data),
            failure: None,
        }
    }

    pub fn rejected(reason: AuthError) -> Self {
        Self {
            success: false,
            message: reason.to_string(),
            errors: vec![reason.code().to_string()],
            data: None,
            failure: Some(FailureKind::Rejected(reason)),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: "Validation failed".to_string(),
            errors,
            data: None,
            failure: Some(FailureKind::Validation),
        }
    }

    pub fn internal() -> Self {
        Self {
            success: false,
            message: "An unexpected error occurred".to_string(),
            errors: vec!["INTERNAL_ERROR".to_string()],
            data: None,
            failure: Some(FailureKind::Internal),
        }
    }

    /// Collapse an engine result into the envelope.
    pub fn from_result(result: Result<T, AppError>, message: &str, operation: &str) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(AppError::Auth(reason)) => Self::rejected(reason),
            Err(AppError::Validation(e)) => Self::invalid(vec![e.to_string()]),
            Err(e) => {
                tracing::error!(operation = operation, error = %e, "Authentication request failed");
                Self::internal()
            }
        }
    }
}

/// The operations exposed to the HTTP layer. Implemented by `AuthService`
/// and by the decorators wrapping it.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: LoginRequest, meta: RequestMeta) -> AuthResult<TokenResponse>;

    async fn refresh(&self, request: RefreshRequest, meta: RequestMeta)
        -> AuthResult<TokenResponse>;

    async fn revoke(
        &self,
        user_id: Uuid,
        request: RevokeRequest,
        meta: RequestMeta,
    ) -> AuthResult<()>;

    async fn revoke_all(&self, user_id: Uuid, meta: RequestMeta) -> AuthResult<u64>;
}

pub struct AuthService {
    engine: RotationEngine,
    identity: Arc<dyn IdentityProvider>,
    clients: Arc<dyn ClientRegistry>,
}

impl AuthService {
    pub fn new(
        engine: RotationEngine,
        identity: Arc<dyn IdentityProvider>,
        clients: Arc<dyn ClientRegistry>,
    ) -> Self {
        Self {
            engine,
            identity,
            clients,
        }
    }

    /// Known and active, or `InvalidClient`.
    async fn resolve_client(&self, client_id: &str) -> Result<(), AppError> {
        match self.clients.find_client(client_id).await? {
            Some(client) if client.is_active => Ok(()),
            _ => Err(AuthError::InvalidClient.into()),
        }
    }

    async fn try_login(
        &self,
        request: LoginRequest,
        meta: RequestMeta,
    ) -> Result<TokenResponse, AppError> {
        self.resolve_client(&request.client_id).await?;

        let user = match self.identity.find_by_email(&request.email).await? {
            Some(user) => user,
            None => {
                self.identity.verify_unknown_user(&request.password).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        match self.identity.verify_password(&user, &request.password).await? {
            PasswordCheck::Success => {}
            PasswordCheck::Failed => return Err(AuthError::InvalidCredentials.into()),
            PasswordCheck::LockedOut => return Err(AuthError::AccountLockedOut.into()),
            PasswordCheck::NotAllowed => return Err(AuthError::LoginNotAllowed.into()),
        }

        let roles = self.identity.roles_for(&user).await?;
        let context = ClientContext {
            client_id: request.client_id,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        };

        let pair = self.engine.issue_pair(&user, roles, &context).await?;
        Ok(pair.into())
    }

    async fn try_refresh(
        &self,
        request: RefreshRequest,
        meta: RequestMeta,
    ) -> Result<TokenResponse, AppError> {
        self.resolve_client(&request.client_id).await?;

        let pair = self
            .engine
            .rotate(
                &request.access_token,
                &request.refresh_token,
                &request.client_id,
                &meta.ip_address,
            )
            .await?;
        Ok(pair.into())
    }
}

#[async_trait]
impl AuthApi for AuthService {
    async fn login(&self, request: LoginRequest, meta: RequestMeta) -> AuthResult<TokenResponse> {
        AuthResult::from_result(self.try_login(request, meta).await, "Login successful", "login")
    }

    async fn refresh(
        &self,
        request: RefreshRequest,
        meta: RequestMeta,
    ) -> AuthResult<TokenResponse> {
        AuthResult::from_result(
            self.try_refresh(request, meta).await,
            "Token refreshed",
            "refresh",
        )
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        request: RevokeRequest,
        meta: RequestMeta,
    ) -> AuthResult<()> {
        let result = self
            .engine
            .revoke(
                user_id,
                &request.refresh_token,
                &request.client_id,
                &meta.ip_address,
            )
            .await;
        AuthResult::from_result(result, "Token revoked", "revoke")
    }

    async fn revoke_all(&self, user_id: Uuid, meta: RequestMeta) -> AuthResult<u64> {
        let result = self.engine.revoke_all(user_id, &meta.ip_address).await;
        AuthResult::from_result(result, "All tokens revoked", "revoke_all")
    }
}
