//! Password Hashing and Verification
//!
//! bcrypt hashes with a strength policy applied at hashing time.

use bcrypt::verify;
use tokio::sync::OnceCell;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72; // bcrypt truncates beyond 72 bytes

/// Hash a password using bcrypt at the given cost
///
/// # Errors
/// Returns error if:
/// - Password fails validation (too short, weak, etc.)
/// - Bcrypt hashing fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    validate_password_strength(password)?;

    bcrypt::hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or_else(|e| {
        tracing::error!("Password verification failed: {}", e);
        false
    })
}

/// Bcrypt hash of a throwaway password, computed on first use.
///
/// Checking a password against it costs the same as a real check at the
/// same cost factor, so an unknown account is answered no faster than a
/// wrong password.
pub struct DummyHash {
    cost: u32,
    hash: OnceCell<String>,
}

impl DummyHash {
    const PASSWORD: &'static str = "Unknown-Account-Placeholder-1";

    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            hash: OnceCell::new(),
        }
    }

    /// Run a full bcrypt verification; never matches.
    pub async fn verify(&self, password: &str) -> bool {
        let hash = self
            .hash
            .get_or_try_init(|| async { bcrypt::hash(Self::PASSWORD, self.cost) })
            .await;

        match hash {
            Ok(hash) => {
                verify_password(password, hash);
            }
            Err(e) => tracing::error!("Dummy password hash unavailable: {}", e),
        }
        false
    }
}

/// Requirements:
/// - 8 to 72 bytes
/// - At least one digit, one lowercase and one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat("password".to_string()));
    }

    Ok(())
}
