//! Concrete bootstrap steps: table DDL and seed inserts.

use crate::pipeline::BootstrapStep;
use async_trait::async_trait;
use concierge_core::error::{StoreError, StoreResult};
use concierge_core::models::{EntityId, EntityKind, NewUser, Table};
use concierge_core::store::ConciergeStore;
use tracing::debug;

/// `DROP TABLE IF EXISTS` for one table.
pub struct DropTable(pub Table);

#[async_trait]
impl BootstrapStep for DropTable {
    fn name(&self) -> String {
        format!("drop {} table", self.0)
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        store.drop_table(self.0).await
    }
}

/// `CREATE TABLE IF NOT EXISTS` for one table.
pub struct CreateTable(pub Table);

#[async_trait]
impl BootstrapStep for CreateTable {
    fn name(&self) -> String {
        format!("create {} table", self.0)
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        store.create_table(self.0).await
    }
}

pub struct SeedGroups(pub Vec<String>);

#[async_trait]
impl BootstrapStep for SeedGroups {
    fn name(&self) -> String {
        "seed groups table".to_string()
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        for group in &self.0 {
            let id = store.insert_group(group).await?;
            debug!(group = %group, id, "Seeded group");
        }
        Ok(())
    }
}

pub struct SeedRoles(pub Vec<String>);

#[async_trait]
impl BootstrapStep for SeedRoles {
    fn name(&self) -> String {
        "seed roles table".to_string()
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        for role in &self.0 {
            let id = store.insert_role(role).await?;
            debug!(role = %role, id, "Seeded role");
        }
        Ok(())
    }
}

pub struct SeedUsers(pub Vec<NewUser>);

#[async_trait]
impl BootstrapStep for SeedUsers {
    fn name(&self) -> String {
        "seed users table".to_string()
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        for user in &self.0 {
            let id = store.insert_user(user).await?;
            debug!(user = %user.username, id, "Seeded user");
        }
        Ok(())
    }
}

/// (username, group) membership rows.
pub struct SeedMemberships(pub Vec<(String, String)>);

#[async_trait]
impl BootstrapStep for SeedMemberships {
    fn name(&self) -> String {
        "seed group users table".to_string()
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        for (user, group) in &self.0 {
            let user_id = lookup_one(store, EntityKind::User, user).await?;
            let group_id = lookup_one(store, EntityKind::Group, group).await?;
            store.insert_membership(user_id, group_id).await?;
        }
        Ok(())
    }
}

/// (username, group, role) assignment rows.
pub struct SeedRoleAssignments(pub Vec<(String, String, String)>);

#[async_trait]
impl BootstrapStep for SeedRoleAssignments {
    fn name(&self) -> String {
        "seed group user roles table".to_string()
    }

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()> {
        for (user, group, role) in &self.0 {
            let user_id = lookup_one(store, EntityKind::User, user).await?;
            let group_id = lookup_one(store, EntityKind::Group, group).await?;
            let role_id = lookup_one(store, EntityKind::Role, role).await?;
            store.insert_role_assignment(user_id, group_id, role_id).await?;
        }
        Ok(())
    }
}

/// Seed step for a table that starts empty.
pub struct NoopSeed(pub Table);

#[async_trait]
impl BootstrapStep for NoopSeed {
    fn name(&self) -> String {
        format!("seed {} table", self.0)
    }

    async fn run(&self, _store: &dyn ConciergeStore) -> StoreResult<()> {
        Ok(())
    }
}

async fn lookup_one(
    store: &dyn ConciergeStore,
    kind: EntityKind,
    name: &str,
) -> StoreResult<EntityId> {
    match store.find_ids(kind, name).await?.as_slice() {
        [id] => Ok(*id),
        [] => Err(StoreError::NotFound(format!("{} {}", kind, name))),
        ids => Err(StoreError::Conflict(format!(
            "{} {} matched {} rows",
            kind,
            name,
            ids.len()
        ))),
    }
}
