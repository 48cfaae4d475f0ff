//! Relational store abstraction.
//!
//! [`ConciergeStore`] is the query/exec capability the engine needs: point
//! lookups by unique name, existence checks over the join tables, grant
//! lookup, the registry write paths and the bootstrap DDL. Two backends
//! implement it: [`postgres::PostgresStore`] (durable, `sqlx`) and
//! [`memory::MemoryStore`] (tests and local development).
//!
//! Backends never cache: every call is a fresh query, so concurrent callers
//! never observe each other's in-flight state.

use crate::error::StoreResult;
use crate::models::{EntityId, EntityKind, NewProcess, NewUser, Table};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait ConciergeStore: Send + Sync {
    /// Ids of every row of `kind` whose unique name equals `name`.
    ///
    /// More than one id means a uniqueness invariant was violated upstream;
    /// the caller decides how to report it.
    async fn find_ids(&self, kind: EntityKind, name: &str) -> StoreResult<Vec<EntityId>>;

    async fn membership_exists(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<bool>;

    async fn role_assignment_exists(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<bool>;

    /// Raw capability string of the grant for this triple, if any.
    async fn grant_capability(
        &self,
        process_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<Option<String>>;

    async fn list_role_names(&self) -> StoreResult<Vec<String>>;

    async fn insert_user(&self, user: &NewUser) -> StoreResult<EntityId>;
    async fn insert_group(&self, name: &str) -> StoreResult<EntityId>;
    async fn insert_role(&self, name: &str) -> StoreResult<EntityId>;

    async fn insert_membership(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<()>;
    async fn delete_membership(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<u64>;

    async fn insert_role_assignment(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<()>;
    async fn delete_role_assignment(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<u64>;

    async fn insert_process(&self, process: &NewProcess) -> StoreResult<EntityId>;
    async fn delete_process(&self, process_id: EntityId) -> StoreResult<u64>;

    /// Store a grant. `capability` is written as-is in its wire encoding.
    async fn insert_grant(
        &self,
        process_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
        capability: &str,
    ) -> StoreResult<()>;
    async fn delete_grants(&self, process_id: EntityId) -> StoreResult<u64>;

    /// `DROP TABLE IF EXISTS`. Fails while a dependent table still exists.
    async fn drop_table(&self, table: Table) -> StoreResult<()>;
    /// `CREATE TABLE IF NOT EXISTS`. Fails when a referenced table is missing.
    async fn create_table(&self, table: Table) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
