//! Authentication module
//!
//! Access token signing/validation, refresh token generation, the rotation
//! state machine and the facade exposed to the HTTP layer.

mod claims;
mod decorators;
mod refresh_token;
mod rotation;
mod service;
mod signer;

pub use claims::Claims;
pub use decorators::{Traced, Validated};
pub use refresh_token::{generate_refresh_token, hash_token};
pub use rotation::{ClientContext, IssuedPair, RotationEngine};
pub use service::{
    AuthApi, AuthResult, AuthService, FailureKind, LoginRequest, RefreshRequest, RequestMeta,
    RevokeRequest, TokenResponse, UserSummary,
};
pub use signer::{SignedAccessToken, Signer};
