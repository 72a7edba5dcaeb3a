//! JWT Claims structure
//!
//! Payload of an access token: identity, roles, the derived permission and
//! the standard registered claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Permission, User};
use crate::error::AuthError;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub unique_name: String,
    pub email: String,
    /// Unique token id, fresh per token
    pub jti: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub permission: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Create new claims for a user
    ///
    /// # Arguments
    /// * `user` - Token subject
    /// * `roles` - Role names, embedded verbatim
    /// * `expiry_seconds` - Token lifetime from now
    /// * `issuer` / `audience` - Registered claims checked on verification
    pub fn new(
        user: &User,
        roles: &[String],
        expiry_seconds: i64,
        issuer: String,
        audience: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.id.to_string(),
            unique_name: user.username.clone(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            roles: roles.to_vec(),
            permission: Permission::from_roles(roles).as_str().to_string(),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            aud: audience,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns `InvalidAccessToken` if the subject is not a UUID
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidAccessToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            full_name: "John Doe".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn test_claims_creation() {
        let user = user();
        let roles = vec!["User".to_string()];
        let claims = Claims::new(&user, &roles, 900, "iss".to_string(), "aud".to_string());

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.unique_name, "jdoe");
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.permission, "Standard");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_admin_claims_get_full_access() {
        let roles = vec!["Admin".to_string()];
        let claims = Claims::new(&user(), &roles, 900, "iss".to_string(), "aud".to_string());

        assert_eq!(claims.permission, "FullAccess");
    }

    #[test]
    fn test_each_claim_set_has_fresh_jti() {
        let user = user();
        let a = Claims::new(&user, &[], 900, "iss".to_string(), "aud".to_string());
        let b = Claims::new(&user, &[], 900, "iss".to_string(), "aud".to_string());

        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = Claims::new(&user(), &[], 900, "iss".to_string(), "aud".to_string());
        claims.sub = "invalid-uuid".to_string();

        assert_eq!(claims.user_id(), Err(AuthError::InvalidAccessToken));
    }
}
