//! Data model for the access-control store.
//!
//! The store owns every entity; the engine only reads them (and writes them
//! on the registry and bootstrap paths). Table names differ between the
//! `test` and `release` environments but the schema is the same.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-generated row identifier.
pub type EntityId = i64;

/// Name of the group every enrolled user joins.
pub const SITE_GROUP: &str = "site";
/// Baseline role granted on enrollment.
pub const USER_ROLE: &str = "user";
/// Administrative role; creators of processes are granted through it.
pub const ADMIN_ROLE: &str = "admin";

/// Entity kinds that can be resolved from a unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Looked up by username.
    User,
    /// Looked up by group name.
    Group,
    /// Looked up by role name.
    Role,
    /// Registered process, looked up by process name.
    Process,
}

impl EntityKind {
    /// Table holding rows of this kind.
    pub const fn table(self) -> Table {
        match self {
            EntityKind::User => Table::Users,
            EntityKind::Group => Table::Groups,
            EntityKind::Role => Table::Roles,
            EntityKind::Process => Table::RegisteredProcesses,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Group => write!(f, "group"),
            EntityKind::Role => write!(f, "role"),
            EntityKind::Process => write!(f, "process"),
        }
    }
}

/// Logical tables of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Users.
    Users,
    /// Roles.
    Roles,
    /// Groups.
    Groups,
    /// (user, group) memberships.
    GroupUsers,
    /// (user, group, role) assignments.
    GroupUserRoles,
    /// Registered processes.
    RegisteredProcesses,
    /// (process, group, role) capability grants.
    RegisteredProcessPermissions,
    /// Processes currently running.
    RunningProcesses,
}

impl Table {
    /// Every table, parents before children.
    pub const ALL: [Table; 8] = [
        Table::Users,
        Table::Roles,
        Table::Groups,
        Table::GroupUsers,
        Table::GroupUserRoles,
        Table::RegisteredProcesses,
        Table::RegisteredProcessPermissions,
        Table::RunningProcesses,
    ];

    /// Tables this table holds foreign keys into.
    pub const fn references(self) -> &'static [Table] {
        match self {
            Table::Users | Table::Roles | Table::Groups => &[],
            Table::GroupUsers => &[Table::Users, Table::Groups],
            Table::GroupUserRoles => &[Table::Users, Table::Groups, Table::Roles],
            Table::RegisteredProcesses => &[Table::Users],
            Table::RegisteredProcessPermissions => {
                &[Table::RegisteredProcesses, Table::Groups, Table::Roles]
            }
            Table::RunningProcesses => &[Table::Users, Table::Groups, Table::RegisteredProcesses],
        }
    }

    /// Tables holding foreign keys into this table.
    pub fn dependents(self) -> impl Iterator<Item = Table> {
        Table::ALL
            .into_iter()
            .filter(move |table| table.references().contains(&self))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Table::Users => "users",
            Table::Roles => "roles",
            Table::Groups => "groups",
            Table::GroupUsers => "group users",
            Table::GroupUserRoles => "group user roles",
            Table::RegisteredProcesses => "registered processes",
            Table::RegisteredProcessPermissions => "registered process permissions",
            Table::RunningProcesses => "running processes",
        };
        f.write_str(label)
    }
}

/// Deployment environment; selects the table-name set and seed fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Prefixed tables plus fixture users.
    #[default]
    Test,
    /// Production tables.
    Release,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "release" => Ok(Environment::Release),
            other => Err(format!("Environment type invalid: {}", other)),
        }
    }
}

/// Physical table names for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub users: String,
    pub roles: String,
    pub groups: String,
    pub group_users: String,
    pub group_user_roles: String,
    pub registered_processes: String,
    pub registered_process_permissions: String,
    pub running_processes: String,
}

impl TableNames {
    /// Table names used by the given environment.
    pub fn for_env(env: Environment) -> Self {
        match env {
            Environment::Test => Self {
                users: "testusers".to_string(),
                roles: "testroles".to_string(),
                groups: "testgroups".to_string(),
                group_users: "test_group_users".to_string(),
                group_user_roles: "test_group_user_roles".to_string(),
                registered_processes: "test_registered_processes".to_string(),
                registered_process_permissions: "test_registered_process_permissions"
                    .to_string(),
                running_processes: "test_running_processes".to_string(),
            },
            Environment::Release => Self {
                users: "users".to_string(),
                roles: "roles".to_string(),
                groups: "groups".to_string(),
                group_users: "group_users".to_string(),
                group_user_roles: "group_user_roles".to_string(),
                registered_processes: "registered_processes".to_string(),
                registered_process_permissions: "registered_process_permissions".to_string(),
                running_processes: "running_processes".to_string(),
            },
        }
    }

    /// Physical name of a logical table.
    pub fn name(&self, table: Table) -> &str {
        match table {
            Table::Users => &self.users,
            Table::Roles => &self.roles,
            Table::Groups => &self.groups,
            Table::GroupUsers => &self.group_users,
            Table::GroupUserRoles => &self.group_user_roles,
            Table::RegisteredProcesses => &self.registered_processes,
            Table::RegisteredProcessPermissions => &self.registered_process_permissions,
            Table::RunningProcesses => &self.running_processes,
        }
    }

    /// First name that is not a plain lowercase SQL identifier, if any.
    ///
    /// Table names are interpolated into statements, so only
    /// `[a-z_][a-z0-9_]*` is accepted.
    pub fn invalid_name(&self) -> Option<&str> {
        Table::ALL
            .into_iter()
            .map(|table| self.name(table))
            .find(|name| !is_plain_identifier(name))
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::for_env(Environment::default())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A user row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub date_created: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub password_hash: String,
}

/// Input for inserting a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    /// Already-hashed credential; the engine never sees plaintext.
    pub password_hash: String,
}

impl NewUser {
    /// Create a user without an email address.
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            password_hash: password_hash.into(),
        }
    }

    /// Attach an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Input for registering a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProcess {
    pub creator_id: EntityId,
    pub name: String,
    pub run_command: String,
    pub kill_command: String,
}

/// A registered process row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredProcess {
    pub id: EntityId,
    pub creator_id: EntityId,
    pub name: String,
    pub run_command: String,
    pub kill_command: String,
    pub date_created: DateTime<Utc>,
}

/// A (process, group, role) grant with its raw capability string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub process_id: EntityId,
    pub group_id: EntityId,
    pub role_id: EntityId,
    pub capability: String,
}

/// A role a seeded user holds within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRole {
    pub group: String,
    pub role: String,
}

/// A user created by the bootstrap seed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub roles: Vec<SeedRole>,
}

impl SeedUser {
    /// Insertable form of this seed.
    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            username: self.username.clone(),
            email: self.email.clone(),
            password_hash: self.password_hash.clone(),
        }
    }
}

/// Locked credential for fixture users; no hash can equal it.
pub const LOCKED_CREDENTIAL: &str = "!";

/// Rows inserted by the bootstrap seed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    pub groups: Vec<String>,
    pub roles: Vec<String>,
    pub users: Vec<SeedUser>,
}

impl SeedData {
    /// Well-known groups and roles plus the site administrator.
    ///
    /// The test environment additionally seeds the `test1` fixture user with
    /// the `user` role in the site group.
    pub fn for_env(env: Environment, admin: SeedUser) -> Self {
        let mut users = vec![admin];
        if env == Environment::Test {
            users.push(SeedUser {
                username: "test1".to_string(),
                email: Some("test1@test.com".to_string()),
                password_hash: LOCKED_CREDENTIAL.to_string(),
                roles: vec![SeedRole {
                    group: SITE_GROUP.to_string(),
                    role: USER_ROLE.to_string(),
                }],
            });
        }

        Self {
            groups: vec![SITE_GROUP.to_string()],
            roles: vec![USER_ROLE.to_string(), ADMIN_ROLE.to_string()],
            users,
        }
    }

    /// Distinct (username, group) pairs implied by the users' roles.
    pub fn memberships(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for user in &self.users {
            for role in &user.roles {
                let pair = (user.username.as_str(), role.group.as_str());
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }

    /// (username, group, role) triples implied by the users' roles.
    pub fn role_assignments(&self) -> Vec<(&str, &str, &str)> {
        self.users
            .iter()
            .flat_map(|user| {
                user.roles.iter().map(move |role| {
                    (
                        user.username.as_str(),
                        role.group.as_str(),
                        role.role.as_str(),
                    )
                })
            })
            .collect()
    }
}
