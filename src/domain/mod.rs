//! Domain model
//!
//! Plain value types shared by the signer, the rotation engine and the
//! persistence collaborators.

mod client;
mod refresh_token;
mod user;

pub use client::Client;
pub use refresh_token::{RefreshToken, TokenState};
pub use user::{Permission, User, ADMIN_ROLE};
