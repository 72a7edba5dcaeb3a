//! Authentication Routes
//!
//! Thin HTTP adapters over `AuthApi`: extract transport metadata, call the
//! facade, pick a status code from the failure kind.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{
    AuthApi, AuthResult, Claims, FailureKind, LoginRequest, RefreshRequest, RequestMeta,
    RevokeRequest,
};
use crate::error::{AppError, AuthError};
use crate::identity::IdentityProvider;

/// Current user information response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<String>,
    pub permission: String,
}

/// Client address is the socket peer; forwarding headers are caller-controlled
/// and never recorded.
fn request_meta(req: &HttpRequest) -> RequestMeta {
    let ip_address = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    RequestMeta {
        ip_address,
        user_agent,
    }
}

fn respond<T: Serialize>(result: AuthResult<T>) -> HttpResponse {
    let status = match result.failure {
        None => StatusCode::OK,
        Some(FailureKind::Validation) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Rejected(reason)) => reason.status_code(),
        Some(FailureKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(result)
}

/// POST /auth/login
///
/// # Errors (in the response envelope)
/// - 400: malformed request or unknown/inactive client
/// - 401: invalid credentials (unknown email and wrong password look alike)
/// - 403: account deactivated, locked out, or not allowed to sign in
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    auth: web::Data<dyn AuthApi>,
) -> HttpResponse {
    let result = auth.login(form.into_inner(), request_meta(&req)).await;
    respond(result)
}

/// POST /auth/refresh
///
/// Exchanges an access token (expired or not) and its refresh token for a new
/// pair. The presented refresh token is revoked and linked to its successor.
///
/// # Errors (in the response envelope)
/// - 400: malformed request or unknown/inactive client
/// - 401: invalid access token, unknown user, or an invalid, revoked or
///   expired refresh token
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    auth: web::Data<dyn AuthApi>,
) -> HttpResponse {
    let result = auth.refresh(form.into_inner(), request_meta(&req)).await;
    respond(result)
}

/// POST /api/logout
///
/// Revokes one of the caller's refresh tokens. **Requires a valid access
/// token.**
pub async fn logout(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    form: web::Json<RevokeRequest>,
    auth: web::Data<dyn AuthApi>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let result = auth
        .revoke(user_id, form.into_inner(), request_meta(&req))
        .await;
    Ok(respond(result))
}

/// POST /api/logout-all
///
/// Revokes every active refresh token of the caller.
pub async fn logout_all(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    auth: web::Data<dyn AuthApi>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let result = auth.revoke_all(user_id, request_meta(&req)).await;
    Ok(respond(result))
}

/// GET /api/me
///
/// Current user's profile from the identity store, roles and permission from
/// the token.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    identity: web::Data<dyn IdentityProvider>,
) -> Result<HttpResponse, AppError> {
    let user_id: Uuid = claims.user_id()?;

    let user = identity
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AuthError::UserNotFound)?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        full_name: user.full_name,
        roles: claims.roles.clone(),
        permission: claims.permission.clone(),
    }))
}
