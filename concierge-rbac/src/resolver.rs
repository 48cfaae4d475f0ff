//! Identity resolver: unique name to store id.

use crate::error::AccessError;
use concierge_core::models::{EntityId, EntityKind};
use concierge_core::store::ConciergeStore;
use std::sync::Arc;
use tracing::debug;

type AccessResult<T> = std::result::Result<T, AccessError>;

/// Resolves usernames, group names, role names and process names to ids.
///
/// Every call is one point lookup; nothing is cached and nothing is retried,
/// so lookups are independent and may be issued concurrently.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn ConciergeStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn ConciergeStore>) -> Self {
        Self { store }
    }

    /// Store this resolver queries.
    pub fn store(&self) -> &Arc<dyn ConciergeStore> {
        &self.store
    }

    /// Resolve `name` of `kind` to exactly one id.
    pub async fn resolve(&self, kind: EntityKind, name: &str) -> AccessResult<EntityId> {
        let ids = self.store.find_ids(kind, name).await?;
        debug!(kind = %kind, name = %name, matches = ids.len(), "resolve");
        match ids.as_slice() {
            [id] => Ok(*id),
            [] => Err(AccessError::not_found(kind, name)),
            _ => Err(AccessError::AmbiguousResult {
                kind,
                name: name.to_string(),
                matches: ids.len(),
            }),
        }
    }

    pub async fn resolve_user_id(&self, username: &str) -> AccessResult<EntityId> {
        self.resolve(EntityKind::User, username).await
    }

    pub async fn resolve_group_id(&self, name: &str) -> AccessResult<EntityId> {
        self.resolve(EntityKind::Group, name).await
    }

    pub async fn resolve_role_id(&self, name: &str) -> AccessResult<EntityId> {
        self.resolve(EntityKind::Role, name).await
    }

    pub async fn resolve_process_id(&self, name: &str) -> AccessResult<EntityId> {
        self.resolve(EntityKind::Process, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::error::StoreError;
    use concierge_core::models::{NewUser, Table};
    use concierge_core::store::memory::MemoryStore;

    fn resolver(store: &MemoryStore) -> IdentityResolver {
        IdentityResolver::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_resolves_single_row() {
        let store = MemoryStore::with_schema();
        let id = store.insert_user(&NewUser::new("alice", "h")).await.unwrap();
        let group = store.insert_group("site").await.unwrap();

        let resolver = resolver(&store);
        assert_eq!(resolver.resolve_user_id("alice").await.unwrap(), id);
        assert_eq!(resolver.resolve_group_id("site").await.unwrap(), group);
    }

    #[tokio::test]
    async fn test_missing_name_is_not_found() {
        let store = MemoryStore::with_schema();
        let resolver = resolver(&store);

        for kind in [
            EntityKind::User,
            EntityKind::Group,
            EntityKind::Role,
            EntityKind::Process,
        ] {
            match resolver.resolve(kind, "ghost").await {
                Err(AccessError::NotFound { kind: k, name }) => {
                    assert_eq!(k, kind);
                    assert_eq!(name, "ghost");
                }
                other => panic!("expected NotFound for {kind}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_ambiguous() {
        let store = MemoryStore::with_schema();
        store.insert_unchecked(EntityKind::Role, "admin").await;
        store.insert_unchecked(EntityKind::Role, "admin").await;

        let err = resolver(&store).resolve_role_id("admin").await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::AmbiguousResult { matches: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::with_schema();
        store.fail_table(Table::RegisteredProcesses);

        let err = resolver(&store)
            .resolve_process_id("deploy")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Store(StoreError::Unexpected(_))));
    }
}
