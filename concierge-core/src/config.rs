//! Configuration types for Concierge.
//!
//! One [`ConciergeConfig`] is loaded at startup and everything else (table
//! names, seed rows, pool settings) is derived from it and passed down
//! explicitly.

use crate::error::ConfigError;
use crate::models::{ADMIN_ROLE, Environment, SITE_GROUP, SeedData, SeedRole, SeedUser, TableNames};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    /// Selects table names and seed fixtures
    pub env: Environment,
    /// Drop every table before recreating it at bootstrap
    pub reset: bool,
    /// Log every authorization decision
    #[serde(default = "default_audit")]
    pub audit_enabled: bool,
    /// Relational store connection
    pub database: DatabaseConfig,
    /// Administrator seeded into the site group
    pub site_admin: SiteAdminConfig,
}

fn default_audit() -> bool {
    true
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; may carry credentials, never log it
    pub url: String,
    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a query waits for a pooled connection
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://concierge@localhost:5432/concierge".to_string(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

/// Site administrator credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteAdminConfig {
    /// Username
    pub username: String,
    /// Email address
    pub email: Option<String>,
    /// Already-hashed credential
    pub password_hash: String,
}

impl ConciergeConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ConciergeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create a basic configuration for development
    pub fn development() -> Self {
        Self {
            env: Environment::Test,
            reset: true,
            audit_enabled: false, // Disabled for development
            database: DatabaseConfig::default(),
            site_admin: SiteAdminConfig {
                username: "admin".to_string(),
                email: Some("admin@localhost".to_string()),
                password_hash: crate::models::LOCKED_CREDENTIAL.to_string(),
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_admin.username.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "site_admin.username must not be empty".to_string(),
            ));
        }
        if self.site_admin.password_hash.is_empty() {
            return Err(ConfigError::Invalid(
                "site_admin.password_hash must not be empty".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Physical table names for the configured environment
    pub fn table_names(&self) -> TableNames {
        TableNames::for_env(self.env)
    }

    /// Rows the bootstrap seed stage inserts
    pub fn seed_data(&self) -> SeedData {
        let admin = SeedUser {
            username: self.site_admin.username.clone(),
            email: self.site_admin.email.clone(),
            password_hash: self.site_admin.password_hash.clone(),
            roles: vec![SeedRole {
                group: SITE_GROUP.to_string(),
                role: ADMIN_ROLE.to_string(),
            }],
        };
        SeedData::for_env(self.env, admin)
    }
}
