use uuid::Uuid;

/// Role name granting the `FullAccess` permission claim.
pub const ADMIN_ROLE: &str = "Admin";

/// Identity record as exposed by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
}

/// Permission claim derived from the role set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    FullAccess,
    Standard,
}

impl Permission {
    pub fn from_roles<S: AsRef<str>>(roles: &[S]) -> Self {
        if roles.iter().any(|r| r.as_ref() == ADMIN_ROLE) {
            Permission::FullAccess
        } else {
            Permission::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FullAccess => "FullAccess",
            Permission::Standard => "Standard",
        }
    }
}
