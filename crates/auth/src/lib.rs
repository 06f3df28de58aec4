#![forbid(unsafe_code)]

//! Caller identity and hive-membership collaborators.
//!
//! The engine trusts whatever these resolve: it never re-derives who a caller
//! is or whether they belong to a hive.

mod directory;
pub mod role;

use async_trait::async_trait;
use hive_core::{ScopeId, UserId};

pub use directory::StaticDirectory;
pub use role::Role;

/// Resolved identity of the party making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    /// Site-wide administrators pass every hive check.
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("hive not found")]
    HiveNotFound,
    #[error("caller is not a member of the hive")]
    NotMember,
    #[error("caller lacks the {0} role")]
    Forbidden(Role),
    #[error("authorization backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ScopeAccess: Send + Sync {
    /// Confirms the hive exists and returns the caller's role in it.
    async fn check_member(&self, caller: &Caller, hive_id: ScopeId) -> Result<Role, AuthError>;

    /// Like [`ScopeAccess::check_member`] but also requires at least `required`.
    async fn require_role(
        &self,
        caller: &Caller,
        hive_id: ScopeId,
        required: Role,
    ) -> Result<Role, AuthError> {
        let role = self.check_member(caller, hive_id).await?;
        if !role.permits(required) {
            return Err(AuthError::Forbidden(required));
        }
        Ok(role)
    }
}
