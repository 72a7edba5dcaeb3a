//! Input validators for authentication requests
//!
//! Cheap shape checks applied before any store lookup: length limits,
//! email format and client identifier format.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 3;
const MAX_CLIENT_ID_LENGTH: usize = 64;
const MAX_SECRET_LENGTH: usize = 4096;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref CLIENT_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap();
}

/// Validates and normalises an email address (trimmed)
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    // Overlong local part is never legitimate
    if let Some(at_pos) = trimmed.find('@') {
        if at_pos > 64 {
            return Err(ValidationError::SuspiciousContent("email".to_string()));
        }
    }

    Ok(trimmed.to_string())
}

/// Client identifiers: ASCII letters, digits, `-` and `_`.
pub fn is_valid_client_id(client_id: &str) -> Result<(), ValidationError> {
    if client_id.is_empty() {
        return Err(ValidationError::EmptyField("clientId".to_string()));
    }

    if client_id.len() > MAX_CLIENT_ID_LENGTH {
        return Err(ValidationError::TooLong(
            "clientId".to_string(),
            MAX_CLIENT_ID_LENGTH,
        ));
    }

    if !CLIENT_ID_REGEX.is_match(client_id) {
        return Err(ValidationError::InvalidFormat("clientId".to_string()));
    }

    Ok(())
}

/// Passwords and token strings: present, bounded, no NUL bytes.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if value.len() > MAX_SECRET_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_SECRET_LENGTH));
    }

    if value.contains('\0') {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(())
}
