//! In-memory identity store and client registry for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    hash_password, verify_password, ClientRegistry, CredentialVerifier, DummyHash,
    LockoutPolicy, PasswordCheck, RoleProvider, UserDirectory,
};
use crate::domain::{Client, User};
use crate::error::{AppError, DatabaseError};

/// Low bcrypt cost keeps in-memory fixtures fast.
const HASH_COST: u32 = 4;

struct StoredUser {
    user: User,
    password_hash: String,
    roles: Vec<String>,
    email_confirmed: bool,
    failed_login_count: i32,
    lockout_end: Option<DateTime<Utc>>,
}

pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<Uuid, StoredUser>>,
    policy: LockoutPolicy,
    dummy_hash: DummyHash,
}

impl InMemoryIdentityStore {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            policy,
            dummy_hash: DummyHash::new(HASH_COST),
        }
    }

    /// Register a confirmed, active user.
    ///
    /// # Errors
    /// Returns a validation error if the password is too weak
    pub async fn add_user(
        &self,
        user: User,
        password: &str,
        roles: &[&str],
    ) -> Result<(), AppError> {
        let password_hash = hash_password(password, HASH_COST)?;
        self.users.write().await.insert(
            user.id,
            StoredUser {
                user,
                password_hash,
                roles: roles.iter().map(|r| r.to_string()).collect(),
                email_confirmed: true,
                failed_login_count: 0,
                lockout_end: None,
            },
        );
        Ok(())
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) {
        if let Some(stored) = self.users.write().await.get_mut(&id) {
            stored.user.is_active = is_active;
        }
    }

    pub async fn set_email_confirmed(&self, id: Uuid, confirmed: bool) {
        if let Some(stored) = self.users.write().await.get_mut(&id) {
            stored.email_confirmed = confirmed;
        }
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new(LockoutPolicy::default())
    }
}

#[async_trait]
impl UserDirectory for InMemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|s| s.user.email.eq_ignore_ascii_case(email))
            .map(|s| s.user.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.users.read().await.get(&id).map(|s| s.user.clone()))
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryIdentityStore {
    async fn verify_password(
        &self,
        user: &User,
        password: &str,
    ) -> Result<PasswordCheck, DatabaseError> {
        let now = Utc::now();
        let mut users = self.users.write().await;
        let stored = match users.get_mut(&user.id) {
            Some(stored) => stored,
            None => return Ok(PasswordCheck::Failed),
        };

        if self.policy.is_locked(stored.lockout_end, now) {
            return Ok(PasswordCheck::LockedOut);
        }

        if !verify_password(password, &stored.password_hash) {
            let (count, lockout_end) = self
                .policy
                .register_failure(stored.failed_login_count, now);
            stored.failed_login_count = count;
            if lockout_end.is_some() {
                stored.lockout_end = lockout_end;
                return Ok(PasswordCheck::LockedOut);
            }
            return Ok(PasswordCheck::Failed);
        }

        stored.failed_login_count = 0;
        stored.lockout_end = None;

        if self.policy.require_confirmed_email && !stored.email_confirmed {
            return Ok(PasswordCheck::NotAllowed);
        }
        Ok(PasswordCheck::Success)
    }
    async fn verify_unknown_user(&self, password: &str) {
        self.dummy_hash.verify(password).await;
    }
}

#[async_trait]
impl RoleProvider for InMemoryIdentityStore {
    async fn roles_for(&self, user: &User) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .users
            .read()
            .await
            .get(&user.id)
            .map(|s| s.roles.clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientRegistry {
    pub fn new(clients: Vec<Client>) -> Self {
        Self {
            clients: RwLock::new(clients.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }

    pub async fn set_active(&self, client_id: &str, is_active: bool) {
        if let Some(client) = self.clients.write().await.get_mut(client_id) {
            client.is_active = is_active;
        }
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, DatabaseError> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }
}
