//! Refresh Token Values
//!
//! Refresh tokens are:
//! - 64 bytes from the operating system RNG, base64-encoded (512 bits)
//! - Hashed with SHA-256 before storage (never store plaintext)
//! - Single-use: every refresh rotates the token (see `rotation`)

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const REFRESH_TOKEN_BYTES: usize = 64;

/// Generate a new cryptographically secure refresh token
///
/// The token is returned in plaintext (this is what the client stores).
/// The server stores only the SHA-256 hash.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Hash a refresh token using SHA-256, hex-encoded
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
