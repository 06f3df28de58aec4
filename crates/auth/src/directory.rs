use std::collections::HashMap;

use async_trait::async_trait;
use hive_core::{ScopeId, UserId};
use tokio::sync::RwLock;

use crate::{AuthError, Caller, Role, ScopeAccess};

/// In-process hive roster.
///
/// Backs tests and single-node deployments that have no external membership
/// service.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    hives: RwLock<HashMap<ScopeId, HashMap<UserId, Role>>>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hive with `owner` as its first member.
    pub async fn create_hive(&self, hive_id: ScopeId, owner: &UserId) {
        let mut hives = self.hives.write().await;
        hives
            .entry(hive_id)
            .or_default()
            .insert(owner.clone(), Role::Owner);
    }

    pub async fn add_member(
        &self,
        hive_id: ScopeId,
        user_id: &UserId,
        role: Role,
    ) -> Result<(), AuthError> {
        let mut hives = self.hives.write().await;
        let members = hives.get_mut(&hive_id).ok_or(AuthError::HiveNotFound)?;
        members.insert(user_id.clone(), role);
        Ok(())
    }

    pub async fn remove_member(&self, hive_id: ScopeId, user_id: &UserId) {
        let mut hives = self.hives.write().await;
        if let Some(members) = hives.get_mut(&hive_id) {
            members.remove(user_id);
        }
    }
}

#[async_trait]
impl ScopeAccess for StaticDirectory {
    async fn check_member(&self, caller: &Caller, hive_id: ScopeId) -> Result<Role, AuthError> {
        let hives = self.hives.read().await;
        let members = hives.get(&hive_id).ok_or(AuthError::HiveNotFound)?;
        if caller.is_admin {
            return Ok(Role::Owner);
        }
        members
            .get(&caller.user_id)
            .copied()
            .ok_or(AuthError::NotMember)
    }
}
