//! Schema bootstrap orchestrator.
//!
//! Runs up to three stages against a store:
//!
//! | stage  | waves |
//! |--------|-------|
//! | drop   | group user roles, group users, running processes, registered process permissions, registered processes, {users, roles, groups} |
//! | create | {users, roles, groups}, {group users, group user roles}, registered processes, registered process permissions, running processes |
//! | seed   | {users, roles, groups}, group users, group user roles, {registered processes, registered process permissions, running processes} |
//!
//! A failure aborts the remaining waves and stages; whatever was applied
//! stays applied. Seeds are plain inserts, so seeding an already-seeded
//! schema fails on the first unique constraint.

use crate::error::BootstrapError;
use crate::pipeline::{BootstrapStep, Stage, StageName};
use crate::steps::{
    CreateTable, DropTable, NoopSeed, SeedGroups, SeedMemberships, SeedRoleAssignments, SeedRoles,
    SeedUsers,
};
use concierge_core::config::ConciergeConfig;
use concierge_core::models::{SeedData, Table};
use concierge_core::store::ConciergeStore;
use std::sync::Arc;
use tracing::info;

fn boxed<S: BootstrapStep + 'static>(step: S) -> Box<dyn BootstrapStep> {
    Box::new(step)
}

/// Drops, creates and seeds the schema.
pub struct SchemaBootstrap {
    store: Arc<dyn ConciergeStore>,
    seed: SeedData,
}

impl SchemaBootstrap {
    pub fn new(store: Arc<dyn ConciergeStore>, seed: SeedData) -> Self {
        Self { store, seed }
    }

    /// Seed rows derived from the configured environment and site admin.
    pub fn from_config(store: Arc<dyn ConciergeStore>, config: &ConciergeConfig) -> Self {
        Self::new(store, config.seed_data())
    }

    /// Children before parents.
    pub fn drop_stage() -> Stage {
        Stage::new(StageName::Drop)
            .wave(vec![boxed(DropTable(Table::GroupUserRoles))])
            .wave(vec![boxed(DropTable(Table::GroupUsers))])
            .wave(vec![boxed(DropTable(Table::RunningProcesses))])
            .wave(vec![boxed(DropTable(Table::RegisteredProcessPermissions))])
            .wave(vec![boxed(DropTable(Table::RegisteredProcesses))])
            .wave(vec![
                boxed(DropTable(Table::Users)),
                boxed(DropTable(Table::Roles)),
                boxed(DropTable(Table::Groups)),
            ])
    }

    /// Parents before children.
    pub fn create_stage() -> Stage {
        Stage::new(StageName::Create)
            .wave(vec![
                boxed(CreateTable(Table::Users)),
                boxed(CreateTable(Table::Roles)),
                boxed(CreateTable(Table::Groups)),
            ])
            .wave(vec![
                boxed(CreateTable(Table::GroupUsers)),
                boxed(CreateTable(Table::GroupUserRoles)),
            ])
            .wave(vec![boxed(CreateTable(Table::RegisteredProcesses))])
            .wave(vec![boxed(CreateTable(Table::RegisteredProcessPermissions))])
            .wave(vec![boxed(CreateTable(Table::RunningProcesses))])
    }

    pub fn seed_stage(&self) -> Stage {
        let users = self.seed.users.iter().map(|user| user.to_new_user()).collect();
        let memberships = self
            .seed
            .memberships()
            .into_iter()
            .map(|(user, group)| (user.to_string(), group.to_string()))
            .collect();
        let assignments = self
            .seed
            .role_assignments()
            .into_iter()
            .map(|(user, group, role)| (user.to_string(), group.to_string(), role.to_string()))
            .collect();

        Stage::new(StageName::Seed)
            .wave(vec![
                boxed(SeedUsers(users)),
                boxed(SeedRoles(self.seed.roles.clone())),
                boxed(SeedGroups(self.seed.groups.clone())),
            ])
            .wave(vec![boxed(SeedMemberships(memberships))])
            .wave(vec![boxed(SeedRoleAssignments(assignments))])
            .wave(vec![
                boxed(NoopSeed(Table::RegisteredProcesses)),
                boxed(NoopSeed(Table::RegisteredProcessPermissions)),
                boxed(NoopSeed(Table::RunningProcesses)),
            ])
    }

    /// Run the pipeline. `reset` adds the drop stage in front of create and
    /// seed. Returns the stages that ran.
    pub async fn run(&self, reset: bool) -> Result<Vec<StageName>, BootstrapError> {
        let mut stages = Vec::with_capacity(3);
        if reset {
            stages.push(Self::drop_stage());
        }
        stages.push(Self::create_stage());
        stages.push(self.seed_stage());

        info!(
            backend = self.store.backend_name(),
            reset,
            stages = stages.len(),
            "Bootstrapping schema"
        );

        let mut completed = Vec::with_capacity(stages.len());
        for stage in &stages {
            stage.run(self.store.as_ref()).await?;
            completed.push(stage.name());
        }

        info!(stages = ?completed, "Schema bootstrap complete");
        Ok(completed)
    }

    /// Create any missing tables without dropping or seeding.
    pub async fn ensure_schema(&self) -> Result<(), BootstrapError> {
        Self::create_stage().run(self.store.as_ref()).await
    }

    /// Drop every table.
    pub async fn drop_all(&self) -> Result<(), BootstrapError> {
        Self::drop_stage().run(self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::error::StoreError;
    use concierge_core::models::{ADMIN_ROLE, EntityKind, SITE_GROUP};
    use concierge_core::store::memory::{MemoryStore, StoreCall};
    use tokio_test::assert_ok;

    fn bootstrap(store: &MemoryStore) -> SchemaBootstrap {
        SchemaBootstrap::from_config(Arc::new(store.clone()), &ConciergeConfig::development())
    }

    #[tokio::test]
    async fn test_fresh_bootstrap_seeds_everything() {
        let store = MemoryStore::new();
        let stages = bootstrap(&store).run(true).await.unwrap();
        assert_eq!(stages, vec![StageName::Drop, StageName::Create, StageName::Seed]);

        for table in Table::ALL {
            assert!(store.table_exists(table).await, "{} missing", table);
        }
        assert_eq!(store.row_count(Table::Users).await, 2);
        assert_eq!(store.row_count(Table::Roles).await, 2);
        assert_eq!(store.row_count(Table::Groups).await, 1);
        assert_eq!(store.row_count(Table::GroupUsers).await, 2);
        assert_eq!(store.row_count(Table::GroupUserRoles).await, 2);
        assert_eq!(store.find_ids(EntityKind::Role, ADMIN_ROLE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_without_reset_fails_at_seed() {
        let store = MemoryStore::new();
        bootstrap(&store).run(false).await.unwrap();

        let err = bootstrap(&store).run(false).await.unwrap_err();
        let BootstrapError::StageFailure {
            stage,
            substep,
            cause,
        } = err;
        assert_eq!(stage, StageName::Seed);
        assert_eq!(substep, "seed users table");
        assert!(cause.is_conflict());

        assert_eq!(store.find_ids(EntityKind::Group, SITE_GROUP).await.unwrap().len(), 1);
        assert_eq!(store.row_count(Table::Roles).await, 2);
        assert_eq!(store.row_count(Table::Users).await, 2);
    }

    #[tokio::test]
    async fn test_reset_rebuilds_seeded_schema() {
        let store = MemoryStore::new();
        bootstrap(&store).run(true).await.unwrap();
        bootstrap(&store).run(true).await.unwrap();
        assert_eq!(store.row_count(Table::Users).await, 2);
    }

    #[tokio::test]
    async fn test_drop_order_and_failure_reporting() {
        let store = MemoryStore::with_schema().with_journal();
        store.fail_table(Table::Roles);

        let err = bootstrap(&store).drop_all().await.unwrap_err();
        assert_eq!(err.stage(), StageName::Drop);
        assert_eq!(err.substep(), "drop roles table");
        // siblings in the failing wave still ran
        assert!(!store.table_exists(Table::Users).await);
        assert!(!store.table_exists(Table::Groups).await);
        assert!(store.table_exists(Table::Roles).await);

        let drops: Vec<Table> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::DropTable(table) => Some(table),
                _ => None,
            })
            .collect();
        assert_eq!(
            &drops[..5],
            &[
                Table::GroupUserRoles,
                Table::GroupUsers,
                Table::RunningProcesses,
                Table::RegisteredProcessPermissions,
                Table::RegisteredProcesses,
            ]
        );
    }

    #[tokio::test]
    async fn test_create_failure_stops_later_waves() {
        let store = MemoryStore::new();
        store.fail_table(Table::Groups);
        store.fail_table(Table::Roles);

        let err = bootstrap(&store).ensure_schema().await.unwrap_err();
        assert_eq!(err.substep(), "create roles table");
        assert!(matches!(
            err,
            BootstrapError::StageFailure {
                cause: StoreError::Unexpected(_),
                ..
            }
        ));
        assert!(store.table_exists(Table::Users).await);
        assert!(!store.table_exists(Table::GroupUsers).await);
        assert!(!store.table_exists(Table::RegisteredProcesses).await);
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let store = MemoryStore::new();
        let bootstrap = bootstrap(&store);
        assert_ok!(bootstrap.ensure_schema().await);
        assert_ok!(bootstrap.ensure_schema().await);
        assert_eq!(store.row_count(Table::Users).await, 0);
    }

    #[test]
    fn test_stage_plans() {
        let create = SchemaBootstrap::create_stage().plan();
        assert_eq!(create.len(), 5);
        assert_eq!(
            create[0],
            vec!["create users table", "create roles table", "create groups table"]
        );

        let store = MemoryStore::new();
        let seed = bootstrap(&store).seed_stage().plan();
        assert_eq!(seed.len(), 4);
        assert_eq!(seed[1], vec!["seed group users table"]);
        assert_eq!(seed[3].len(), 3);
    }
}
