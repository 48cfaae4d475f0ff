//! Registry write paths: enrollment, process registration and grants.
//!
//! Names are resolved through the same [`IdentityResolver`] the read paths
//! use, so a write naming an unknown entity fails with the same
//! [`AccessError::NotFound`] a check would.

use crate::error::AccessError;
use crate::resolver::IdentityResolver;
use concierge_core::capability::Capability;
use concierge_core::models::{ADMIN_ROLE, EntityId, NewProcess, NewUser, SITE_GROUP, USER_ROLE};
use concierge_core::store::ConciergeStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

type AccessResult<T> = std::result::Result<T, AccessError>;

/// A process to register, before its creator is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub run_command: String,
    pub kill_command: String,
}

/// Mutates users, memberships, role assignments, processes and grants.
#[derive(Clone)]
pub struct Registry {
    resolver: IdentityResolver,
}

impl Registry {
    pub fn new(store: Arc<dyn ConciergeStore>) -> Self {
        Self {
            resolver: IdentityResolver::new(store),
        }
    }

    fn store(&self) -> &Arc<dyn ConciergeStore> {
        self.resolver.store()
    }

    /// Insert a user and give them the `user` role in the `site` group.
    pub async fn enroll_user(&self, user: &NewUser) -> AccessResult<EntityId> {
        let user_id = self.store().insert_user(user).await?;

        let (site_id, role_id) = tokio::join!(
            self.resolver.resolve_group_id(SITE_GROUP),
            self.resolver.resolve_role_id(USER_ROLE),
        );
        let (site_id, role_id) = (site_id?, role_id?);

        self.store().insert_membership(user_id, site_id).await?;
        self.store()
            .insert_role_assignment(user_id, site_id, role_id)
            .await?;
        info!(user = %user.username, user_id, "Enrolled user");
        Ok(user_id)
    }

    /// Register a process owned by `creator` and grant full access on it to
    /// the `admin` role of `group`.
    pub async fn register_process(
        &self,
        creator: &str,
        group: &str,
        spec: &ProcessSpec,
    ) -> AccessResult<EntityId> {
        let (creator_id, group_id, admin_id) = tokio::join!(
            self.resolver.resolve_user_id(creator),
            self.resolver.resolve_group_id(group),
            self.resolver.resolve_role_id(ADMIN_ROLE),
        );
        let (creator_id, group_id, admin_id) = (creator_id?, group_id?, admin_id?);

        let process_id = self
            .store()
            .insert_process(&NewProcess {
                creator_id,
                name: spec.name.clone(),
                run_command: spec.run_command.clone(),
                kill_command: spec.kill_command.clone(),
            })
            .await?;
        self.store()
            .insert_grant(process_id, group_id, admin_id, &Capability::FULL.to_string())
            .await?;
        info!(process = %spec.name, process_id, creator = %creator, group = %group, "Registered process");
        Ok(process_id)
    }

    /// Remove a process and every grant on it.
    pub async fn unregister_process(&self, name: &str) -> AccessResult<()> {
        let process_id = self.resolver.resolve_process_id(name).await?;
        let grants = self.store().delete_grants(process_id).await?;
        self.store().delete_process(process_id).await?;
        info!(process = %name, grants, "Unregistered process");
        Ok(())
    }

    /// Grant `capability` on `process` to `role` within `group`.
    pub async fn grant(
        &self,
        process: &str,
        group: &str,
        role: &str,
        capability: Capability,
    ) -> AccessResult<()> {
        let (process_id, group_id, role_id) = tokio::join!(
            self.resolver.resolve_process_id(process),
            self.resolver.resolve_group_id(group),
            self.resolver.resolve_role_id(role),
        );
        let (process_id, group_id, role_id) = (process_id?, group_id?, role_id?);

        self.store()
            .insert_grant(process_id, group_id, role_id, &capability.to_string())
            .await?;
        info!(process = %process, group = %group, role = %role, capability = %capability, "Granted");
        Ok(())
    }

    pub async fn add_member(&self, user: &str, group: &str) -> AccessResult<()> {
        let (user_id, group_id) = self.resolve_pair(user, group).await?;
        self.store().insert_membership(user_id, group_id).await?;
        info!(user = %user, group = %group, "Added member");
        Ok(())
    }

    /// Fails with [`AccessError::NotMember`] when there was nothing to remove.
    pub async fn remove_member(&self, user: &str, group: &str) -> AccessResult<()> {
        let (user_id, group_id) = self.resolve_pair(user, group).await?;
        let removed = self.store().delete_membership(user_id, group_id).await?;
        if removed == 0 {
            return Err(AccessError::NotMember {
                user: user.to_string(),
                group: group.to_string(),
            });
        }
        info!(user = %user, group = %group, "Removed member");
        Ok(())
    }

    pub async fn assign_role(&self, user: &str, group: &str, role: &str) -> AccessResult<()> {
        let (user_id, group_id, role_id) = self.resolve_triple(user, group, role).await?;
        self.store()
            .insert_role_assignment(user_id, group_id, role_id)
            .await?;
        info!(user = %user, group = %group, role = %role, "Assigned role");
        Ok(())
    }

    /// Fails with [`AccessError::NotInRole`] when there was nothing to revoke.
    pub async fn revoke_role(&self, user: &str, group: &str, role: &str) -> AccessResult<()> {
        let (user_id, group_id, role_id) = self.resolve_triple(user, group, role).await?;
        let removed = self
            .store()
            .delete_role_assignment(user_id, group_id, role_id)
            .await?;
        if removed == 0 {
            return Err(AccessError::NotInRole {
                user: user.to_string(),
                group: group.to_string(),
                role: role.to_string(),
            });
        }
        info!(user = %user, group = %group, role = %role, "Revoked role");
        Ok(())
    }

    async fn resolve_pair(&self, user: &str, group: &str) -> AccessResult<(EntityId, EntityId)> {
        let (user_id, group_id) = tokio::join!(
            self.resolver.resolve_user_id(user),
            self.resolver.resolve_group_id(group),
        );
        Ok((user_id?, group_id?))
    }

    async fn resolve_triple(
        &self,
        user: &str,
        group: &str,
        role: &str,
    ) -> AccessResult<(EntityId, EntityId, EntityId)> {
        let (user_id, group_id, role_id) = tokio::join!(
            self.resolver.resolve_user_id(user),
            self.resolver.resolve_group_id(group),
            self.resolver.resolve_role_id(role),
        );
        Ok((user_id?, group_id?, role_id?))
    }
}
