//! Cross-cutting behaviour around `AuthApi`
//!
//! Each decorator implements `AuthApi` by wrapping another implementation,
//! so they compose in plain code: `Traced::new(Validated::new(service))`.

use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::service::{
    AuthApi, AuthResult, LoginRequest, RefreshRequest, RequestMeta, RevokeRequest, TokenResponse,
};
use crate::validators::{is_valid_client_id, is_valid_email, require_non_empty};

/// Rejects malformed requests before they reach the wrapped service.
pub struct Validated<A> {
    inner: A,
}

impl<A> Validated<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn collect_errors<const N: usize>(checks: [Result<(), String>; N]) -> Vec<String> {
    checks.into_iter().filter_map(Result::err).collect()
}

#[async_trait]
impl<A: AuthApi> AuthApi for Validated<A> {
    async fn login(
        &self,
        mut request: LoginRequest,
        meta: RequestMeta,
    ) -> AuthResult<TokenResponse> {
        let email = is_valid_email(&request.email);
        let errors = collect_errors([
            email.as_ref().map(|_| ()).map_err(|e| e.to_string()),
            require_non_empty("password", &request.password).map_err(|e| e.to_string()),
            is_valid_client_id(&request.client_id).map_err(|e| e.to_string()),
        ]);
        if !errors.is_empty() {
            return AuthResult::invalid(errors);
        }
        if let Ok(email) = email {
            request.email = email;
        }
        self.inner.login(request, meta).await
    }

    async fn refresh(
        &self,
        request: RefreshRequest,
        meta: RequestMeta,
    ) -> AuthResult<TokenResponse> {
        let errors = collect_errors([
            require_non_empty("accessToken", &request.access_token).map_err(|e| e.to_string()),
            require_non_empty("refreshToken", &request.refresh_token).map_err(|e| e.to_string()),
            is_valid_client_id(&request.client_id).map_err(|e| e.to_string()),
        ]);
        if !errors.is_empty() {
            return AuthResult::invalid(errors);
        }
        self.inner.refresh(request, meta).await
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        request: RevokeRequest,
        meta: RequestMeta,
    ) -> AuthResult<()> {
        let errors = collect_errors([
            require_non_empty("refreshToken", &request.refresh_token).map_err(|e| e.to_string()),
            is_valid_client_id(&request.client_id).map_err(|e| e.to_string()),
        ]);
        if !errors.is_empty() {
            return AuthResult::invalid(errors);
        }
        self.inner.revoke(user_id, request, meta).await
    }

    async fn revoke_all(&self, user_id: Uuid, meta: RequestMeta) -> AuthResult<u64> {
        self.inner.revoke_all(user_id, meta).await
    }
}

/// Logs every call with its outcome and latency. Never logs credentials or
/// token values.
pub struct Traced<A> {
    inner: A,
}

impl<A> Traced<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn log_outcome<T>(
    operation: &str,
    client_id: Option<&str>,
    started: Instant,
    result: &AuthResult<T>,
) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if result.success {
        tracing::info!(operation, client_id, elapsed_ms, "Auth request succeeded");
    } else {
        tracing::warn!(
            operation,
            client_id,
            elapsed_ms,
            errors = ?result.errors,
            "Auth request failed"
        );
    }
}

#[async_trait]
impl<A: AuthApi> AuthApi for Traced<A> {
    async fn login(&self, request: LoginRequest, meta: RequestMeta) -> AuthResult<TokenResponse> {
        let started = Instant::now();
        let client_id = request.client_id.clone();
        let result = self.inner.login(request, meta).await;
        log_outcome("login", Some(&client_id), started, &result);
        result
    }

    async fn refresh(
        &self,
        request: RefreshRequest,
        meta: RequestMeta,
    ) -> AuthResult<TokenResponse> {
        let started = Instant::now();
        let client_id = request.client_id.clone();
        let result = self.inner.refresh(request, meta).await;
        log_outcome("refresh", Some(&client_id), started, &result);
        result
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        request: RevokeRequest,
        meta: RequestMeta,
    ) -> AuthResult<()> {
        let started = Instant::now();
        let client_id = request.client_id.clone();
        let result = self.inner.revoke(user_id, request, meta).await;
        log_outcome("revoke", Some(&client_id), started, &result);
        result
    }

    async fn revoke_all(&self, user_id: Uuid, meta: RequestMeta) -> AuthResult<u64> {
        let started = Instant::now();
        let result = self.inner.revoke_all(user_id, meta).await;
        log_outcome("revoke_all", None, started, &result);
        result
    }
}
