//! Group membership and role verification.
//!
//! Both checks resolve their names concurrently and wait for every lookup
//! before inspecting results in a fixed order (user, group, role), so the
//! error reported for several missing names does not depend on which lookup
//! finished first. The join-table query only runs once every id resolved.

use crate::error::AccessError;
use crate::resolver::IdentityResolver;
use concierge_core::models::EntityId;
use concierge_core::store::ConciergeStore;
use std::sync::Arc;
use tracing::debug;

type AccessResult<T> = std::result::Result<T, AccessError>;

/// Verifies group membership and role assignment for a principal.
#[derive(Clone)]
pub struct MembershipVerifier {
    resolver: IdentityResolver,
}

impl MembershipVerifier {
    pub fn new(store: Arc<dyn ConciergeStore>) -> Self {
        Self {
            resolver: IdentityResolver::new(store),
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Succeeds iff `username` belongs to `groupname`.
    pub async fn is_in_group(&self, username: &str, groupname: &str) -> AccessResult<()> {
        let (user_id, group_id) = tokio::join!(
            self.resolver.resolve_user_id(username),
            self.resolver.resolve_group_id(groupname),
        );
        let (user_id, group_id) = (user_id?, group_id?);

        let exists = self
            .resolver
            .store()
            .membership_exists(user_id, group_id)
            .await?;
        debug!(user = %username, group = %groupname, exists, "membership check");

        if exists {
            Ok(())
        } else {
            Err(AccessError::NotMember {
                user: username.to_string(),
                group: groupname.to_string(),
            })
        }
    }

    /// Succeeds iff `username` holds `rolename` within `groupname`.
    pub async fn is_role(
        &self,
        username: &str,
        groupname: &str,
        rolename: &str,
    ) -> AccessResult<()> {
        let ids = self.resolve_triple(username, groupname, rolename).await?;
        let (user_id, group_id, role_id) = ids;

        let exists = self
            .resolver
            .store()
            .role_assignment_exists(user_id, group_id, role_id)
            .await?;
        debug!(
            user = %username,
            group = %groupname,
            role = %rolename,
            exists,
            "role check"
        );

        if exists {
            Ok(())
        } else {
            Err(AccessError::NotInRole {
                user: username.to_string(),
                group: groupname.to_string(),
                role: rolename.to_string(),
            })
        }
    }

    async fn resolve_triple(
        &self,
        username: &str,
        groupname: &str,
        rolename: &str,
    ) -> AccessResult<(EntityId, EntityId, EntityId)> {
        let (user_id, group_id, role_id) = tokio::join!(
            self.resolver.resolve_user_id(username),
            self.resolver.resolve_group_id(groupname),
            self.resolver.resolve_role_id(rolename),
        );
        Ok((user_id?, group_id?, role_id?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::models::{EntityKind, NewUser};
    use concierge_core::store::memory::{MemoryStore, StoreCall};
    use std::time::Duration;

    async fn seeded() -> (MemoryStore, MembershipVerifier) {
        let store = MemoryStore::with_schema().with_journal();
        let alice = store.insert_user(&NewUser::new("alice", "h")).await.unwrap();
        store.insert_user(&NewUser::new("bob", "h")).await.unwrap();
        let site = store.insert_group("site").await.unwrap();
        let admin = store.insert_role("admin").await.unwrap();
        store.insert_role("user").await.unwrap();
        store.insert_membership(alice, site).await.unwrap();
        store.insert_role_assignment(alice, site, admin).await.unwrap();
        store.clear_calls();
        let verifier = MembershipVerifier::new(Arc::new(store.clone()));
        (store, verifier)
    }

    #[tokio::test]
    async fn test_member_verified() {
        let (_, verifier) = seeded().await;
        verifier.is_in_group("alice", "site").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_member_denied() {
        let (_, verifier) = seeded().await;
        let err = verifier.is_in_group("bob", "site").await.unwrap_err();
        assert!(matches!(err, AccessError::NotMember { .. }));
        assert!(err.is_denial());
    }

    #[tokio::test]
    async fn test_membership_follows_store_rows() {
        let (store, verifier) = seeded().await;
        let bob = verifier.resolver().resolve_user_id("bob").await.unwrap();
        let site = verifier.resolver().resolve_group_id("site").await.unwrap();

        store.insert_membership(bob, site).await.unwrap();
        verifier.is_in_group("bob", "site").await.unwrap();

        store.delete_membership(bob, site).await.unwrap();
        assert!(matches!(
            verifier.is_in_group("bob", "site").await,
            Err(AccessError::NotMember { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_referent_skips_join_query() {
        let (store, verifier) = seeded().await;
        let err = verifier.is_in_group("alice", "staff").await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::NotFound {
                kind: EntityKind::Group,
                ..
            }
        ));
        assert!(!store.calls().contains(&StoreCall::MembershipExists));
    }

    #[tokio::test]
    async fn test_role_verified_and_denied() {
        let (_, verifier) = seeded().await;
        verifier.is_role("alice", "site", "admin").await.unwrap();

        let err = verifier.is_role("alice", "site", "user").await.unwrap_err();
        assert!(matches!(err, AccessError::NotInRole { .. }));
    }

    #[tokio::test]
    async fn test_role_with_missing_role_is_not_found() {
        let (store, verifier) = seeded().await;
        let err = verifier
            .is_role("alice", "site", "auditor")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::NotFound {
                kind: EntityKind::Role,
                ..
            }
        ));
        assert!(!store.calls().contains(&StoreCall::RoleAssignmentExists));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_is_user_regardless_of_completion_order() {
        let (store, verifier) = seeded().await;
        // The user lookup finishes last, the group and role lookups first.
        store.set_latency(EntityKind::User, Duration::from_millis(50));

        let err = verifier
            .is_role("mallory", "staff", "auditor")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::NotFound {
                kind: EntityKind::User,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_run_concurrently() {
        let (store, verifier) = seeded().await;
        for kind in [EntityKind::User, EntityKind::Group, EntityKind::Role] {
            store.set_latency(kind, Duration::from_millis(100));
        }

        let started = tokio::time::Instant::now();
        verifier.is_role("alice", "site", "admin").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
