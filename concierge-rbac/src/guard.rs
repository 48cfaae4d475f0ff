//! Access guard for request handlers.
//!
//! [`AccessGuard`] bundles the verifier and evaluator behind one handle and
//! audits every decision. The request types mirror the JSON bodies a web
//! layer binds before calling the guard:
//!
//! ```json
//! { "username": "admin", "groupname": "site", "rolename": "admin", "processname": "deploy" }
//! ```

use crate::error::AccessError;
use crate::evaluator::PermissionEvaluator;
use concierge_core::capability::PermissionLabel;
use concierge_core::models::ADMIN_ROLE;
use concierge_core::store::ConciergeStore;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

type AccessResult<T> = std::result::Result<T, AccessError>;

/// Membership check body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCheck {
    pub username: String,
    pub groupname: String,
}

/// Role check body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCheck {
    pub username: String,
    pub groupname: String,
    pub rolename: String,
}

/// Admin check body; the role is always `admin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCheck {
    pub username: String,
    pub groupname: String,
}

/// Process permission check body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCheck {
    pub username: String,
    pub groupname: String,
    pub rolename: String,
    pub processname: String,
}

/// Role existence check body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesCheck {
    pub roles: Vec<String>,
}

/// Audited access checks over one store.
#[derive(Clone)]
pub struct AccessGuard {
    evaluator: PermissionEvaluator,
    audit_enabled: bool,
}

impl AccessGuard {
    /// Create a new access guard builder
    pub fn builder(store: Arc<dyn ConciergeStore>) -> AccessGuardBuilder {
        AccessGuardBuilder::new(store)
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub async fn check_group(&self, check: &GroupCheck) -> AccessResult<()> {
        let outcome = self
            .evaluator
            .verifier()
            .is_in_group(&check.username, &check.groupname)
            .await;
        self.audit("group", &check.username, &check.groupname, &outcome);
        outcome
    }

    pub async fn check_role(&self, check: &RoleCheck) -> AccessResult<()> {
        let outcome = self
            .evaluator
            .verifier()
            .is_role(&check.username, &check.groupname, &check.rolename)
            .await;
        let target = format!("{}/{}", check.groupname, check.rolename);
        self.audit("role", &check.username, &target, &outcome);
        outcome
    }

    pub async fn check_admin(&self, check: &AdminCheck) -> AccessResult<()> {
        let outcome = self
            .evaluator
            .verifier()
            .is_role(&check.username, &check.groupname, ADMIN_ROLE)
            .await;
        self.audit("admin", &check.username, &check.groupname, &outcome);
        outcome
    }

    /// Succeeds iff every named role exists; reports the first missing one
    /// in request order.
    pub async fn check_roles_exist(&self, check: &RolesCheck) -> AccessResult<()> {
        let resolver = self.evaluator.verifier().resolver();
        let lookups = join_all(check.roles.iter().map(|role| resolver.resolve_role_id(role))).await;
        let outcome = lookups.into_iter().try_for_each(|lookup| lookup.map(|_| ()));
        self.audit("roles", "-", &check.roles.join(","), &outcome);
        outcome
    }

    pub async fn can_read(&self, check: &CommandCheck) -> AccessResult<()> {
        self.check_permission(check, PermissionLabel::Read).await
    }

    pub async fn can_write(&self, check: &CommandCheck) -> AccessResult<()> {
        self.check_permission(check, PermissionLabel::Write).await
    }

    pub async fn can_execute(&self, check: &CommandCheck) -> AccessResult<()> {
        self.check_permission(check, PermissionLabel::Execute).await
    }

    pub async fn check_permission(
        &self,
        check: &CommandCheck,
        permission: PermissionLabel,
    ) -> AccessResult<()> {
        let outcome = self
            .evaluator
            .has_permission(
                &check.username,
                &check.groupname,
                &check.rolename,
                &check.processname,
                permission,
            )
            .await;
        let target = format!("{}:{}", check.processname, permission);
        self.audit("permission", &check.username, &target, &outcome);
        outcome
    }

    /// [`check_permission`](Self::check_permission) for a label still in its
    /// wire form. A label outside `r, w, x, rw, rx, wx` fails with
    /// [`AccessError::UnknownPermission`] before the store is queried.
    pub async fn check_permission_str(
        &self,
        check: &CommandCheck,
        label: &str,
    ) -> AccessResult<()> {
        match label.parse::<PermissionLabel>() {
            Ok(permission) => self.check_permission(check, permission).await,
            Err(_) => {
                let outcome = Err(AccessError::UnknownPermission(label.to_string()));
                let target = format!("{}:{}", check.processname, label);
                self.audit("permission", &check.username, &target, &outcome);
                outcome
            }
        }
    }

    /// Names of every role in the store.
    pub async fn role_names(&self) -> AccessResult<Vec<String>> {
        Ok(self
            .evaluator
            .verifier()
            .resolver()
            .store()
            .list_role_names()
            .await?)
    }

    fn audit(&self, check: &str, subject: &str, target: &str, outcome: &AccessResult<()>) {
        if !self.audit_enabled {
            return;
        }
        match outcome {
            Ok(()) => info!(
                check = %check,
                subject = %subject,
                target = %target,
                result = "granted",
                "Access check"
            ),
            Err(err)
                if err.is_denial()
                    || err.is_lookup_failure()
                    || matches!(err, AccessError::UnknownPermission(_)) =>
            {
                warn!(
                    check = %check,
                    subject = %subject,
                    target = %target,
                    result = "denied",
                    reason = %err,
                    "Access check"
                )
            }
            Err(err) => error!(
                check = %check,
                subject = %subject,
                target = %target,
                error = %err,
                "Access check failed"
            ),
        }
    }
}

/// Builder for [`AccessGuard`]
pub struct AccessGuardBuilder {
    store: Arc<dyn ConciergeStore>,
    audit_enabled: bool,
}

impl AccessGuardBuilder {
    pub fn new(store: Arc<dyn ConciergeStore>) -> Self {
        Self {
            store,
            audit_enabled: false,
        }
    }

    /// Enable audit logging
    pub fn with_audit_logging(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    pub fn build(self) -> AccessGuard {
        AccessGuard {
            evaluator: PermissionEvaluator::new(self.store),
            audit_enabled: self.audit_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ProcessSpec, Registry};
    use concierge_core::error::StoreError;
    use concierge_core::models::{EntityKind, NewUser, SITE_GROUP, Table, USER_ROLE};
    use concierge_core::store::memory::MemoryStore;
    use serde_json::json;

    async fn guard() -> (MemoryStore, AccessGuard) {
        let store = MemoryStore::with_schema();
        store.insert_group(SITE_GROUP).await.unwrap();
        store.insert_role(USER_ROLE).await.unwrap();
        store.insert_role(ADMIN_ROLE).await.unwrap();

        let registry = Registry::new(Arc::new(store.clone()));
        registry.enroll_user(&NewUser::new("admin", "h")).await.unwrap();
        registry.enroll_user(&NewUser::new("test1", "h")).await.unwrap();
        registry.assign_role("admin", SITE_GROUP, ADMIN_ROLE).await.unwrap();
        registry
            .register_process(
                "admin",
                SITE_GROUP,
                &ProcessSpec {
                    name: "deploy".to_string(),
                    run_command: "./deploy.sh".to_string(),
                    kill_command: "pkill deploy".to_string(),
                },
            )
            .await
            .unwrap();

        let guard = AccessGuard::builder(Arc::new(store.clone()))
            .with_audit_logging(true)
            .build();
        (store, guard)
    }

    fn command(username: &str, rolename: &str) -> CommandCheck {
        CommandCheck {
            username: username.to_string(),
            groupname: SITE_GROUP.to_string(),
            rolename: rolename.to_string(),
            processname: "deploy".to_string(),
        }
    }

    #[tokio::test]
    async fn test_group_and_admin_checks() {
        let (_, guard) = guard().await;
        let check: GroupCheck =
            serde_json::from_value(json!({"username": "test1", "groupname": "site"})).unwrap();
        guard.check_group(&check).await.unwrap();

        let admin = AdminCheck {
            username: "admin".to_string(),
            groupname: SITE_GROUP.to_string(),
        };
        guard.check_admin(&admin).await.unwrap();

        let not_admin = AdminCheck {
            username: "test1".to_string(),
            groupname: SITE_GROUP.to_string(),
        };
        let err = guard.check_admin(&not_admin).await.unwrap_err();
        assert!(matches!(err, AccessError::NotInRole { .. }));
    }

    #[tokio::test]
    async fn test_role_check() {
        let (_, guard) = guard().await;
        let check = RoleCheck {
            username: "test1".to_string(),
            groupname: SITE_GROUP.to_string(),
            rolename: USER_ROLE.to_string(),
        };
        guard.check_role(&check).await.unwrap();
    }

    #[tokio::test]
    async fn test_roles_exist_reports_first_missing() {
        let (_, guard) = guard().await;
        guard
            .check_roles_exist(&RolesCheck {
                roles: vec!["admin".to_string(), "user".to_string()],
            })
            .await
            .unwrap();

        let err = guard
            .check_roles_exist(&RolesCheck {
                roles: vec![
                    "user".to_string(),
                    "auditor".to_string(),
                    "owner".to_string(),
                ],
            })
            .await
            .unwrap_err();
        match err {
            AccessError::NotFound { kind, name } => {
                assert_eq!(kind, EntityKind::Role);
                assert_eq!(name, "auditor");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }

        guard
            .check_roles_exist(&RolesCheck { roles: vec![] })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_command_checks() {
        let (_, guard) = guard().await;
        let admin = command("admin", ADMIN_ROLE);
        guard.can_read(&admin).await.unwrap();
        guard.can_write(&admin).await.unwrap();
        guard.can_execute(&admin).await.unwrap();

        let user = command("test1", USER_ROLE);
        let err = guard.can_read(&user).await.unwrap_err();
        assert!(matches!(err, AccessError::NoGrant { .. }));

        let impostor = command("test1", ADMIN_ROLE);
        let err = guard
            .check_permission(&impostor, PermissionLabel::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotInRole { .. }));
    }

    #[tokio::test]
    async fn test_permission_label_from_wire_form() {
        let (_, guard) = guard().await;
        let admin = command("admin", ADMIN_ROLE);
        guard.check_permission_str(&admin, "rx").await.unwrap();

        for label in ["rwx", "R", "", "read"] {
            let err = guard.check_permission_str(&admin, label).await.unwrap_err();
            match err {
                AccessError::UnknownPermission(ref name) => assert_eq!(name, label),
                ref other => panic!("expected UnknownPermission for {label:?}, got {other:?}"),
            }
            assert!(!err.is_denial());
            assert!(!err.is_lookup_failure());
        }

        // a known label still goes through the full evaluation
        let err = guard
            .check_permission_str(&command("test1", USER_ROLE), "w")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NoGrant { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_denial() {
        let (store, guard) = guard().await;
        store.fail_table(Table::RegisteredProcessPermissions);
        let err = guard
            .can_read(&command("admin", ADMIN_ROLE))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Store(StoreError::Unexpected(_))));
        assert!(!err.is_denial());
    }

    #[tokio::test]
    async fn test_role_names() {
        let (_, guard) = guard().await;
        assert_eq!(guard.role_names().await.unwrap(), vec!["user", "admin"]);
    }
}
