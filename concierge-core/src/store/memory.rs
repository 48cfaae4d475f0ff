//! In-memory implementation of the access-control store.
//!
//! # Purpose
//! Implements [`ConciergeStore`] entirely in memory for tests and local
//! development. It behaves like the relational schema it stands in for:
//! - tables must be created before use and dropped in dependency order
//! - unique names are enforced (`StoreError::Conflict`)
//! - foreign keys are enforced on insert and delete (`StoreError::ForeignKey`)
//!
//! # Test hooks
//! - an opt-in journal ([`MemoryStore::with_journal`], [`MemoryStore::calls`])
//!   so tests can assert which queries an operation issued
//! - per-kind lookup latency ([`MemoryStore::set_latency`]) to exercise fan-out
//!   completion order
//! - per-table failure injection ([`MemoryStore::fail_table`])
//!
//! # Durability
//! Not durable: all state is lost when the store is dropped.

use super::ConciergeStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{EntityId, EntityKind, Grant, NewProcess, NewUser, RegisteredProcess, Table, User};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// A call recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    FindIds(EntityKind, String),
    MembershipExists,
    RoleAssignmentExists,
    GrantCapability,
    ListRoleNames,
    Insert(Table),
    Delete(Table),
    DropTable(Table),
    CreateTable(Table),
    HealthCheck,
}

#[derive(Debug, Clone)]
struct NamedRow {
    id: EntityId,
    name: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    present: HashSet<Table>,
    next_id: HashMap<Table, EntityId>,
    users: Vec<User>,
    roles: Vec<NamedRow>,
    groups: Vec<NamedRow>,
    group_users: Vec<(EntityId, EntityId)>,
    group_user_roles: Vec<(EntityId, EntityId, EntityId)>,
    processes: Vec<RegisteredProcess>,
    grants: Vec<Grant>,
}

impl MemoryState {
    fn allocate_id(&mut self, table: Table) -> EntityId {
        let next = self.next_id.entry(table).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn ids_named(&self, kind: EntityKind, name: &str) -> Vec<EntityId> {
        match kind {
            EntityKind::User => self
                .users
                .iter()
                .filter(|u| u.username == name)
                .map(|u| u.id)
                .collect(),
            EntityKind::Group => named_ids(&self.groups, name),
            EntityKind::Role => named_ids(&self.roles, name),
            EntityKind::Process => self
                .processes
                .iter()
                .filter(|p| p.name == name)
                .map(|p| p.id)
                .collect(),
        }
    }

    fn has_id(&self, table: Table, id: EntityId) -> bool {
        match table {
            Table::Users => self.users.iter().any(|u| u.id == id),
            Table::Roles => self.roles.iter().any(|r| r.id == id),
            Table::Groups => self.groups.iter().any(|g| g.id == id),
            Table::RegisteredProcesses => self.processes.iter().any(|p| p.id == id),
            _ => false,
        }
    }

    fn clear(&mut self, table: Table) {
        match table {
            Table::Users => self.users.clear(),
            Table::Roles => self.roles.clear(),
            Table::Groups => self.groups.clear(),
            Table::GroupUsers => self.group_users.clear(),
            Table::GroupUserRoles => self.group_user_roles.clear(),
            Table::RegisteredProcesses => self.processes.clear(),
            Table::RegisteredProcessPermissions => self.grants.clear(),
            Table::RunningProcesses => {}
        }
        self.next_id.remove(&table);
    }
}

fn named_ids(rows: &[NamedRow], name: &str) -> Vec<EntityId> {
    rows.iter().filter(|r| r.name == name).map(|r| r.id).collect()
}

#[derive(Debug, Default)]
struct Faults {
    latency: HashMap<EntityKind, Duration>,
    failing: HashSet<Table>,
}

/// In-memory store.
///
/// Cloning is cheap and clones share state, journal and fault configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    journal: Option<Arc<Mutex<Vec<StoreCall>>>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    /// Empty store with no tables; run the bootstrap create stage before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with every table already created and empty.
    pub fn with_schema() -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.try_write() {
            state.present.extend(Table::ALL);
        }
        store
    }

    /// Record every call from now on. The journal is unbounded, so only
    /// enable it on short-lived stores. Clones made afterwards share it.
    pub fn with_journal(mut self) -> Self {
        self.journal = Some(Arc::default());
        self
    }

    /// Calls recorded so far, oldest first. Empty unless the journal is on.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.journal_entries()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        if let Some(mut entries) = self.journal_entries() {
            entries.clear();
        }
    }

    /// Delay every `find_ids` lookup of `kind` by `delay`.
    pub fn set_latency(&self, kind: EntityKind, delay: Duration) {
        self.faults().latency.insert(kind, delay);
    }

    /// Make every statement touching `table` fail until [`heal_table`](Self::heal_table).
    pub fn fail_table(&self, table: Table) {
        self.faults().failing.insert(table);
    }

    /// Undo [`fail_table`](Self::fail_table).
    pub fn heal_table(&self, table: Table) {
        self.faults().failing.remove(&table);
    }

    /// Whether `table` currently exists.
    pub async fn table_exists(&self, table: Table) -> bool {
        self.state.read().await.present.contains(&table)
    }

    /// Number of rows in `table`.
    pub async fn row_count(&self, table: Table) -> usize {
        let state = self.state.read().await;
        match table {
            Table::Users => state.users.len(),
            Table::Roles => state.roles.len(),
            Table::Groups => state.groups.len(),
            Table::GroupUsers => state.group_users.len(),
            Table::GroupUserRoles => state.group_user_roles.len(),
            Table::RegisteredProcesses => state.processes.len(),
            Table::RegisteredProcessPermissions => state.grants.len(),
            Table::RunningProcesses => 0,
        }
    }

    /// Insert a named row without checking uniqueness.
    ///
    /// Simulates a store whose unique constraint was lost, so that lookups
    /// can observe more than one match.
    pub async fn insert_unchecked(&self, kind: EntityKind, name: &str) -> EntityId {
        let mut state = self.state.write().await;
        let id = state.allocate_id(kind.table());
        match kind {
            EntityKind::User => state.users.push(user_row(id, &NewUser::new(name, "!"))),
            EntityKind::Group => state.groups.push(NamedRow {
                id,
                name: name.to_string(),
            }),
            EntityKind::Role => state.roles.push(NamedRow {
                id,
                name: name.to_string(),
            }),
            EntityKind::Process => state.processes.push(RegisteredProcess {
                id,
                creator_id: 0,
                name: name.to_string(),
                run_command: String::new(),
                kill_command: String::new(),
                date_created: Utc::now(),
            }),
        }
        id
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn journal_entries(&self) -> Option<std::sync::MutexGuard<'_, Vec<StoreCall>>> {
        self.journal
            .as_ref()
            .map(|journal| journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn record(&self, call: StoreCall) {
        debug!(backend = "memory", call = ?call, "store call");
        if let Some(mut entries) = self.journal_entries() {
            entries.push(call);
        }
    }

    fn check_fault(&self, table: Table) -> StoreResult<()> {
        if self.faults().failing.contains(&table) {
            return Err(StoreError::Unexpected(anyhow!(
                "injected failure on {} table",
                table
            )));
        }
        Ok(())
    }

    fn require(&self, state: &MemoryState, tables: &[Table]) -> StoreResult<()> {
        for &table in tables {
            self.check_fault(table)?;
            if !state.present.contains(&table) {
                return Err(StoreError::MissingTable(table.to_string()));
            }
        }
        Ok(())
    }
}

fn user_row(id: EntityId, user: &NewUser) -> User {
    let now = Utc::now();
    User {
        id,
        username: user.username.clone(),
        email: user.email.clone(),
        email_verified: false,
        date_created: now,
        last_login: Some(now),
        password_hash: user.password_hash.clone(),
    }
}

fn missing_referent(table: Table, id: EntityId) -> StoreError {
    StoreError::ForeignKey(format!("no row with id {} in {} table", id, table))
}

#[async_trait]
impl ConciergeStore for MemoryStore {
    async fn find_ids(&self, kind: EntityKind, name: &str) -> StoreResult<Vec<EntityId>> {
        debug!(backend = "memory", kind = %kind, name, "store call");
        if let Some(mut entries) = self.journal_entries() {
            entries.push(StoreCall::FindIds(kind, name.to_string()));
        }
        let delay = self.faults().latency.get(&kind).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.read().await;
        self.require(&state, &[kind.table()])?;
        Ok(state.ids_named(kind, name))
    }

    async fn membership_exists(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<bool> {
        self.record(StoreCall::MembershipExists);
        let state = self.state.read().await;
        self.require(&state, &[Table::GroupUsers, Table::Users])?;
        Ok(state
            .group_users
            .iter()
            .any(|&(u, g)| u == user_id && g == group_id))
    }

    async fn role_assignment_exists(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<bool> {
        self.record(StoreCall::RoleAssignmentExists);
        let state = self.state.read().await;
        self.require(&state, &[Table::GroupUserRoles, Table::Roles])?;
        Ok(state
            .group_user_roles
            .iter()
            .any(|&(u, g, r)| u == user_id && g == group_id && r == role_id))
    }

    async fn grant_capability(
        &self,
        process_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<Option<String>> {
        self.record(StoreCall::GrantCapability);
        let state = self.state.read().await;
        self.require(&state, &[Table::RegisteredProcessPermissions])?;
        Ok(state
            .grants
            .iter()
            .find(|g| g.process_id == process_id && g.group_id == group_id && g.role_id == role_id)
            .map(|g| g.capability.clone()))
    }

    async fn list_role_names(&self) -> StoreResult<Vec<String>> {
        self.record(StoreCall::ListRoleNames);
        let state = self.state.read().await;
        self.require(&state, &[Table::Roles])?;
        Ok(state.roles.iter().map(|r| r.name.clone()).collect())
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<EntityId> {
        self.record(StoreCall::Insert(Table::Users));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::Users])?;
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username {} exists",
                user.username
            )));
        }
        if let Some(email) = &user.email {
            if state.users.iter().any(|u| u.email.as_ref() == Some(email)) {
                return Err(StoreError::Conflict(format!("email {} exists", email)));
            }
        }
        let id = state.allocate_id(Table::Users);
        state.users.push(user_row(id, user));
        Ok(id)
    }

    async fn insert_group(&self, name: &str) -> StoreResult<EntityId> {
        self.record(StoreCall::Insert(Table::Groups));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::Groups])?;
        if !named_ids(&state.groups, name).is_empty() {
            return Err(StoreError::Conflict(format!("group {} exists", name)));
        }
        let id = state.allocate_id(Table::Groups);
        state.groups.push(NamedRow {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn insert_role(&self, name: &str) -> StoreResult<EntityId> {
        self.record(StoreCall::Insert(Table::Roles));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::Roles])?;
        if !named_ids(&state.roles, name).is_empty() {
            return Err(StoreError::Conflict(format!("role {} exists", name)));
        }
        let id = state.allocate_id(Table::Roles);
        state.roles.push(NamedRow {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn insert_membership(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<()> {
        self.record(StoreCall::Insert(Table::GroupUsers));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::GroupUsers])?;
        if !state.has_id(Table::Users, user_id) {
            return Err(missing_referent(Table::Users, user_id));
        }
        if !state.has_id(Table::Groups, group_id) {
            return Err(missing_referent(Table::Groups, group_id));
        }
        state.group_users.push((user_id, group_id));
        Ok(())
    }

    async fn delete_membership(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<u64> {
        self.record(StoreCall::Delete(Table::GroupUsers));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::GroupUsers])?;
        let before = state.group_users.len();
        state
            .group_users
            .retain(|&(u, g)| !(u == user_id && g == group_id));
        Ok((before - state.group_users.len()) as u64)
    }

    async fn insert_role_assignment(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<()> {
        self.record(StoreCall::Insert(Table::GroupUserRoles));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::GroupUserRoles])?;
        for (table, id) in [
            (Table::Users, user_id),
            (Table::Groups, group_id),
            (Table::Roles, role_id),
        ] {
            if !state.has_id(table, id) {
                return Err(missing_referent(table, id));
            }
        }
        state.group_user_roles.push((user_id, group_id, role_id));
        Ok(())
    }

    async fn delete_role_assignment(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<u64> {
        self.record(StoreCall::Delete(Table::GroupUserRoles));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::GroupUserRoles])?;
        let before = state.group_user_roles.len();
        state
            .group_user_roles
            .retain(|&(u, g, r)| !(u == user_id && g == group_id && r == role_id));
        Ok((before - state.group_user_roles.len()) as u64)
    }

    async fn insert_process(&self, process: &NewProcess) -> StoreResult<EntityId> {
        self.record(StoreCall::Insert(Table::RegisteredProcesses));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::RegisteredProcesses])?;
        if state.processes.iter().any(|p| p.name == process.name) {
            return Err(StoreError::Conflict(format!(
                "process {} exists",
                process.name
            )));
        }
        if !state.has_id(Table::Users, process.creator_id) {
            return Err(missing_referent(Table::Users, process.creator_id));
        }
        let id = state.allocate_id(Table::RegisteredProcesses);
        state.processes.push(RegisteredProcess {
            id,
            creator_id: process.creator_id,
            name: process.name.clone(),
            run_command: process.run_command.clone(),
            kill_command: process.kill_command.clone(),
            date_created: Utc::now(),
        });
        Ok(id)
    }

    async fn delete_process(&self, process_id: EntityId) -> StoreResult<u64> {
        self.record(StoreCall::Delete(Table::RegisteredProcesses));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::RegisteredProcesses])?;
        if state.grants.iter().any(|g| g.process_id == process_id) {
            return Err(StoreError::ForeignKey(format!(
                "process {} is still referenced by {} table",
                process_id,
                Table::RegisteredProcessPermissions
            )));
        }
        let before = state.processes.len();
        state.processes.retain(|p| p.id != process_id);
        Ok((before - state.processes.len()) as u64)
    }

    async fn insert_grant(
        &self,
        process_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
        capability: &str,
    ) -> StoreResult<()> {
        self.record(StoreCall::Insert(Table::RegisteredProcessPermissions));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::RegisteredProcessPermissions])?;
        for (table, id) in [
            (Table::RegisteredProcesses, process_id),
            (Table::Groups, group_id),
            (Table::Roles, role_id),
        ] {
            if !state.has_id(table, id) {
                return Err(missing_referent(table, id));
            }
        }
        state.grants.push(Grant {
            process_id,
            group_id,
            role_id,
            capability: capability.to_string(),
        });
        Ok(())
    }

    async fn delete_grants(&self, process_id: EntityId) -> StoreResult<u64> {
        self.record(StoreCall::Delete(Table::RegisteredProcessPermissions));
        let mut state = self.state.write().await;
        self.require(&state, &[Table::RegisteredProcessPermissions])?;
        let before = state.grants.len();
        state.grants.retain(|g| g.process_id != process_id);
        Ok((before - state.grants.len()) as u64)
    }

    async fn drop_table(&self, table: Table) -> StoreResult<()> {
        self.record(StoreCall::DropTable(table));
        self.check_fault(table)?;
        let mut state = self.state.write().await;
        if !state.present.contains(&table) {
            return Ok(());
        }
        if let Some(dependent) = table.dependents().find(|t| state.present.contains(t)) {
            return Err(StoreError::ForeignKey(format!(
                "cannot drop {} table because {} table depends on it",
                table, dependent
            )));
        }
        state.clear(table);
        state.present.remove(&table);
        Ok(())
    }

    async fn create_table(&self, table: Table) -> StoreResult<()> {
        self.record(StoreCall::CreateTable(table));
        self.check_fault(table)?;
        let mut state = self.state.write().await;
        if state.present.contains(&table) {
            return Ok(());
        }
        if let Some(missing) = table
            .references()
            .iter()
            .find(|t| !state.present.contains(*t))
        {
            return Err(StoreError::MissingTable(missing.to_string()));
        }
        state.present.insert(table);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.record(StoreCall::HealthCheck);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
