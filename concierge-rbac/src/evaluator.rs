//! Permission evaluation against process grants.

use crate::error::AccessError;
use crate::verifier::MembershipVerifier;
use concierge_core::capability::{Capability, PermissionLabel};
use concierge_core::store::ConciergeStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

type AccessResult<T> = std::result::Result<T, AccessError>;

/// A principal asking to exercise a permission on a registered process,
/// through a role held in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub username: String,
    pub groupname: String,
    pub rolename: String,
    pub processname: String,
    pub permission: PermissionLabel,
}

impl PermissionRequest {
    pub fn new(
        username: impl Into<String>,
        groupname: impl Into<String>,
        rolename: impl Into<String>,
        processname: impl Into<String>,
        permission: PermissionLabel,
    ) -> Self {
        Self {
            username: username.into(),
            groupname: groupname.into(),
            rolename: rolename.into(),
            processname: processname.into(),
            permission,
        }
    }
}

/// Decides whether a principal may exercise a permission on a process.
#[derive(Clone)]
pub struct PermissionEvaluator {
    verifier: MembershipVerifier,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn ConciergeStore>) -> Self {
        Self {
            verifier: MembershipVerifier::new(store),
        }
    }

    pub fn verifier(&self) -> &MembershipVerifier {
        &self.verifier
    }

    /// Evaluate a [`PermissionRequest`].
    pub async fn evaluate(&self, request: &PermissionRequest) -> AccessResult<()> {
        self.has_permission(
            &request.username,
            &request.groupname,
            &request.rolename,
            &request.processname,
            request.permission,
        )
        .await
    }

    /// Succeeds iff the user holds the role in the group and the grant for
    /// (process, group, role) allows `permission`.
    ///
    /// The role check runs first and a failure there ends evaluation before
    /// any grant is read.
    pub async fn has_permission(
        &self,
        username: &str,
        groupname: &str,
        rolename: &str,
        processname: &str,
        permission: PermissionLabel,
    ) -> AccessResult<()> {
        self.verifier.is_role(username, groupname, rolename).await?;

        let resolver = self.verifier.resolver();
        let (group_id, role_id, process_id) = tokio::join!(
            resolver.resolve_group_id(groupname),
            resolver.resolve_role_id(rolename),
            resolver.resolve_process_id(processname),
        );
        let (group_id, role_id, process_id) = (group_id?, role_id?, process_id?);

        let stored = resolver
            .store()
            .grant_capability(process_id, group_id, role_id)
            .await?
            .ok_or_else(|| AccessError::NoGrant {
                process: processname.to_string(),
                group: groupname.to_string(),
                role: rolename.to_string(),
            })?;

        let capability =
            Capability::parse(&stored).map_err(|source| AccessError::MalformedCapability {
                process: processname.to_string(),
                source,
            })?;
        debug!(
            process = %processname,
            capability = %capability,
            permission = %permission,
            "grant lookup"
        );

        if capability.grants(permission) {
            Ok(())
        } else {
            Err(AccessError::InsufficientPermission {
                process: processname.to_string(),
                label: permission.to_string(),
                capability: capability.to_string(),
            })
        }
    }
}
