//! Postgres-backed implementation of the access-control store.
//!
//! # What this module is
//! Implements [`ConciergeStore`] on a `sqlx::PgPool`. Every query targets the
//! physical table names of the configured environment ([`TableNames`]).
//!
//! # Key invariants
//! - Names are unique per table (`UNIQUE` columns); ids are `BIGSERIAL`.
//! - Join tables carry foreign keys, so tables must be created parents first
//!   and dropped children first. The bootstrap orchestrator owns that order.
//! - Grants are stored as `BIT(3)` and read back through `rwx::text`, so the
//!   engine always sees the three-character wire encoding.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log them.
//! - Table names are interpolated into statements. They are validated as
//!   plain identifiers in [`PostgresStore::connect`]; values are always bound.
//!
//! # Concurrency model
//! The pool is shared by every caller; each method acquires its own pooled
//! connection and runs a single statement.

use super::ConciergeStore;
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{EntityId, EntityKind, NewProcess, NewUser, Table, TableNames};
use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Durable store backed by Postgres.
pub struct PostgresStore {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresStore {
    /// Validate table names and open a connection pool.
    ///
    /// # Errors
    /// - [`StoreError::Unexpected`] if a table name is not a plain identifier.
    /// - [`StoreError::Database`] for URL parse or connection failures.
    pub async fn connect(config: &DatabaseConfig, tables: TableNames) -> StoreResult<Self> {
        if let Some(name) = tables.invalid_name() {
            return Err(StoreError::Unexpected(anyhow!(
                "refusing to use table name {:?}",
                name
            )));
        }

        // `acquire_timeout` bounds how long a query waits for a pooled connection.
        let connect_options = PgConnectOptions::from_str(&config.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;

        info!(
            max_connections = config.max_connections,
            users_table = %tables.users,
            "Connected to postgres"
        );
        Ok(Self { pool, tables })
    }

    /// Physical table names this store targets.
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn t(&self, table: Table) -> &str {
        self.tables.name(table)
    }

    async fn exists(&self, sql: &str, ids: &[EntityId]) -> StoreResult<bool> {
        let mut query = sqlx::query_scalar::<_, bool>(sql);
        for id in ids {
            query = query.bind(*id);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(err, sql))
    }

    async fn execute(&self, sql: &str, ids: &[EntityId]) -> StoreResult<u64> {
        let mut query = sqlx::query(sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|err| classify(err, sql))?;
        Ok(result.rows_affected())
    }

    async fn insert_named(&self, table: Table, id_column: &str, name: &str) -> StoreResult<EntityId> {
        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) RETURNING {}",
            self.t(table),
            id_column
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for one logical table.
pub fn create_statement(tables: &TableNames, table: Table) -> String {
    let n = |t: Table| tables.name(t);
    match table {
        Table::Users => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                uid BIGSERIAL PRIMARY KEY,
                username VARCHAR(255) UNIQUE NOT NULL,
                email VARCHAR(255) UNIQUE,
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                date_created TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_login TIMESTAMPTZ,
                password VARCHAR(255) NOT NULL
            )",
            n(Table::Users)
        ),
        Table::Roles => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                rid BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL
            )",
            n(Table::Roles)
        ),
        Table::Groups => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                gid BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL
            )",
            n(Table::Groups)
        ),
        Table::GroupUsers => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                uid BIGINT NOT NULL REFERENCES {} (uid),
                gid BIGINT NOT NULL REFERENCES {} (gid)
            )",
            n(Table::GroupUsers),
            n(Table::Users),
            n(Table::Groups)
        ),
        Table::GroupUserRoles => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                uid BIGINT NOT NULL REFERENCES {} (uid),
                gid BIGINT NOT NULL REFERENCES {} (gid),
                rid BIGINT NOT NULL REFERENCES {} (rid)
            )",
            n(Table::GroupUserRoles),
            n(Table::Users),
            n(Table::Groups),
            n(Table::Roles)
        ),
        Table::RegisteredProcesses => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                rpid BIGSERIAL PRIMARY KEY,
                creator_uid BIGINT NOT NULL REFERENCES {} (uid),
                name VARCHAR(255) UNIQUE NOT NULL,
                run_command VARCHAR(255),
                kill_command VARCHAR(255),
                date_created TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            n(Table::RegisteredProcesses),
            n(Table::Users)
        ),
        Table::RegisteredProcessPermissions => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                rpid BIGINT NOT NULL REFERENCES {} (rpid),
                gid BIGINT NOT NULL REFERENCES {} (gid),
                rid BIGINT NOT NULL REFERENCES {} (rid),
                rwx BIT(3)
            )",
            n(Table::RegisteredProcessPermissions),
            n(Table::RegisteredProcesses),
            n(Table::Groups),
            n(Table::Roles)
        ),
        Table::RunningProcesses => format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name VARCHAR(255) UNIQUE,
                pid BIGINT NOT NULL,
                runner_uid BIGINT NOT NULL REFERENCES {} (uid),
                gid BIGINT NOT NULL REFERENCES {} (gid),
                rpid BIGINT NOT NULL REFERENCES {} (rpid)
            )",
            n(Table::RunningProcesses),
            n(Table::Users),
            n(Table::Groups),
            n(Table::RegisteredProcesses)
        ),
    }
}

fn lookup_columns(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::User => ("uid", "username"),
        EntityKind::Group => ("gid", "name"),
        EntityKind::Role => ("rid", "name"),
        EntityKind::Process => ("rpid", "name"),
    }
}

/// Map a driver error onto [`StoreError`] by SQLSTATE.
fn classify(err: sqlx::Error, sql: &str) -> StoreError {
    let code = match &err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    };
    let statement = sql.split_whitespace().take(4).collect::<Vec<_>>().join(" ");
    match code.as_deref() {
        Some("23505") => StoreError::Conflict(format!("{}: {}", statement, err)),
        Some("23503") | Some("2BP01") => StoreError::ForeignKey(format!("{}: {}", statement, err)),
        Some("42P01") => StoreError::MissingTable(format!("{}: {}", statement, err)),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl ConciergeStore for PostgresStore {
    async fn find_ids(&self, kind: EntityKind, name: &str) -> StoreResult<Vec<EntityId>> {
        let (id_column, name_column) = lookup_columns(kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            id_column,
            self.t(kind.table()),
            name_column
        );
        debug!(kind = %kind, "find ids");
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))
    }

    async fn membership_exists(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE uid = $1 AND gid = $2)",
            self.t(Table::GroupUsers)
        );
        self.exists(&sql, &[user_id, group_id]).await
    }

    async fn role_assignment_exists(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE uid = $1 AND gid = $2 AND rid = $3)",
            self.t(Table::GroupUserRoles)
        );
        self.exists(&sql, &[user_id, group_id, role_id]).await
    }

    async fn grant_capability(
        &self,
        process_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<Option<String>> {
        let sql = format!(
            "SELECT rwx::text FROM {} WHERE rpid = $1 AND gid = $2 AND rid = $3 LIMIT 1",
            self.t(Table::RegisteredProcessPermissions)
        );
        let row = sqlx::query_scalar::<_, Option<String>>(&sql)
            .bind(process_id)
            .bind(group_id)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))?;
        // A NULL rwx surfaces as an empty string, which never parses.
        Ok(row.map(|rwx| rwx.unwrap_or_default()))
    }

    async fn list_role_names(&self) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT name FROM {} ORDER BY rid", self.t(Table::Roles));
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<EntityId> {
        let sql = format!(
            "INSERT INTO {} (username, email, email_verified, date_created, last_login, password)
             VALUES ($1, $2, FALSE, NOW(), NOW(), $3) RETURNING uid",
            self.t(Table::Users)
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))
    }

    async fn insert_group(&self, name: &str) -> StoreResult<EntityId> {
        self.insert_named(Table::Groups, "gid", name).await
    }

    async fn insert_role(&self, name: &str) -> StoreResult<EntityId> {
        self.insert_named(Table::Roles, "rid", name).await
    }

    async fn insert_membership(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (uid, gid) VALUES ($1, $2)",
            self.t(Table::GroupUsers)
        );
        self.execute(&sql, &[user_id, group_id]).await?;
        Ok(())
    }

    async fn delete_membership(&self, user_id: EntityId, group_id: EntityId) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE uid = $1 AND gid = $2",
            self.t(Table::GroupUsers)
        );
        self.execute(&sql, &[user_id, group_id]).await
    }

    async fn insert_role_assignment(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (uid, gid, rid) VALUES ($1, $2, $3)",
            self.t(Table::GroupUserRoles)
        );
        self.execute(&sql, &[user_id, group_id, role_id]).await?;
        Ok(())
    }

    async fn delete_role_assignment(
        &self,
        user_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
    ) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE uid = $1 AND gid = $2 AND rid = $3",
            self.t(Table::GroupUserRoles)
        );
        self.execute(&sql, &[user_id, group_id, role_id]).await
    }

    async fn insert_process(&self, process: &NewProcess) -> StoreResult<EntityId> {
        let sql = format!(
            "INSERT INTO {} (creator_uid, name, run_command, kill_command, date_created)
             VALUES ($1, $2, $3, $4, NOW()) RETURNING rpid",
            self.t(Table::RegisteredProcesses)
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(process.creator_id)
            .bind(&process.name)
            .bind(&process.run_command)
            .bind(&process.kill_command)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))
    }

    async fn delete_process(&self, process_id: EntityId) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE rpid = $1",
            self.t(Table::RegisteredProcesses)
        );
        self.execute(&sql, &[process_id]).await
    }

    async fn insert_grant(
        &self,
        process_id: EntityId,
        group_id: EntityId,
        role_id: EntityId,
        capability: &str,
    ) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (rpid, gid, rid, rwx) VALUES ($1, $2, $3, CAST($4 AS BIT(3)))",
            self.t(Table::RegisteredProcessPermissions)
        );
        sqlx::query(&sql)
            .bind(process_id)
            .bind(group_id)
            .bind(role_id)
            .bind(capability)
            .execute(&self.pool)
            .await
            .map_err(|err| classify(err, &sql))?;
        Ok(())
    }

    async fn delete_grants(&self, process_id: EntityId) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE rpid = $1",
            self.t(Table::RegisteredProcessPermissions)
        );
        self.execute(&sql, &[process_id]).await
    }

    async fn drop_table(&self, table: Table) -> StoreResult<()> {
        // No CASCADE: a dependent table still present is an ordering bug.
        let sql = format!("DROP TABLE IF EXISTS {}", self.t(table));
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn create_table(&self, table: Table) -> StoreResult<()> {
        let sql = create_statement(&self.tables, table);
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|err| classify(err, "SELECT 1"))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Environment;

    #[test]
    fn test_create_statements_reference_environment_tables() {
        let tables = TableNames::for_env(Environment::Test);
        let sql = create_statement(&tables, Table::GroupUserRoles);
        assert!(sql.contains("test_group_user_roles"));
        assert!(sql.contains("REFERENCES testusers (uid)"));
        assert!(sql.contains("REFERENCES testgroups (gid)"));
        assert!(sql.contains("REFERENCES testroles (rid)"));

        let release = TableNames::for_env(Environment::Release);
        let sql = create_statement(&release, Table::RegisteredProcessPermissions);
        assert!(sql.contains("rwx BIT(3)"));
        assert!(sql.contains("REFERENCES registered_processes (rpid)"));
    }

    #[test]
    fn test_every_reference_appears_in_ddl() {
        let tables = TableNames::for_env(Environment::Release);
        for table in Table::ALL {
            let sql = create_statement(&tables, table);
            for referenced in table.references() {
                assert!(
                    sql.contains(&format!("REFERENCES {} ", tables.name(*referenced))),
                    "{} should reference {}",
                    table,
                    referenced
                );
            }
        }
    }

    #[test]
    fn test_non_database_errors_pass_through() {
        let err = classify(sqlx::Error::RowNotFound, "SELECT 1");
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_connect_rejects_unsafe_table_names() {
        let mut tables = TableNames::for_env(Environment::Release);
        tables.users = "users; DROP TABLE roles".to_string();
        let result = PostgresStore::connect(&DatabaseConfig::default(), tables).await;
        assert!(matches!(result, Err(StoreError::Unexpected(_))));
    }
}
