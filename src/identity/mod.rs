//! Identity collaborators
//!
//! User lookup, password verification with lockout, role lookup and the
//! client registry. The rotation core only sees these traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Client, User};
use crate::error::DatabaseError;

mod lockout;
mod memory;
mod password;
mod postgres;

pub use lockout::LockoutPolicy;
pub use memory::{InMemoryClientRegistry, InMemoryIdentityStore};
pub use password::{hash_password, verify_password, DummyHash};
pub use postgres::{PgClientRegistry, PgIdentityStore};

/// Result of a password check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Success,
    Failed,
    LockedOut,
    /// Correct password, but the account may not sign in (e.g. unconfirmed).
    NotAllowed,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Check `password`, recording failures against the lockout policy.
    async fn verify_password(
        &self,
        user: &User,
        password: &str,
    ) -> Result<PasswordCheck, DatabaseError>;

    /// Spend the work of a real password check on an email with no account.
    async fn verify_unknown_user(&self, password: &str);
}

#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn roles_for(&self, user: &User) -> Result<Vec<String>, DatabaseError>;
}

/// Everything the auth core needs from the identity store.
pub trait IdentityProvider: UserDirectory + CredentialVerifier + RoleProvider {}

impl<T: UserDirectory + CredentialVerifier + RoleProvider> IdentityProvider for T {}

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, DatabaseError>;
}
