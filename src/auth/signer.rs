//! Access Token Signing and Verification
//!
//! HMAC-SHA256 JWTs carrying identity and role claims. The signer is built
//! once at startup from `JwtSettings` and shared read-only afterwards.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::domain::User;
use crate::error::{AppError, AuthError, ConfigError};

/// A freshly signed access token and the metadata returned to clients.
#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Signer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_expiry_seconds: i64,
}

impl Signer {
    /// # Errors
    /// Returns `ConfigError::MissingRequired` if the signing secret is empty.
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        if config.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_seconds: config.access_token_expiry_minutes * 60,
        })
    }

    /// Sign an access token for `user` carrying `roles`.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if encoding fails
    pub fn sign_access_token(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<SignedAccessToken, AppError> {
        let claims = Claims::new(
            user,
            roles,
            self.access_token_expiry_seconds,
            self.issuer.clone(),
            self.audience.clone(),
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

        Ok(SignedAccessToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Verify signature, algorithm, issuer and audience while ignoring expiry.
    ///
    /// Used during refresh, where the presented access token is expected to
    /// have lapsed. Every failure yields `None`.
    pub fn verify_expired(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation(false)) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "Expired-token verification rejected");
                None
            }
        }
    }

    /// Full validation including expiry, for bearer-protected routes.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidAccessToken` on any failure
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation(true))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AuthError::InvalidAccessToken
            })
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        // Only HS256 is accepted; a token advertising any other algorithm
        // fails before the signature is checked.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = validate_exp;
        validation.leeway = 0;
        validation
    }
}
