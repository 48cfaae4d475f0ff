//! Store contract tests
//!
//! These tests pin the behavior every `ConciergeStore` backend must share,
//! exercised through the trait object against the in-memory backend.

use concierge_core::prelude::*;
use concierge_core::store::memory::StoreCall;
use std::sync::Arc;

async fn schema() -> Arc<dyn ConciergeStore> {
    let store = MemoryStore::new();
    for table in Table::ALL {
        store.create_table(table).await.unwrap();
    }
    Arc::new(store)
}

#[tokio::test]
async fn test_lookups_are_exact_and_case_sensitive() {
    let store = schema().await;
    let id = store.insert_role("admin").await.unwrap();

    assert_eq!(store.find_ids(EntityKind::Role, "admin").await.unwrap(), vec![id]);
    assert!(store.find_ids(EntityKind::Role, "Admin").await.unwrap().is_empty());
    assert!(store.find_ids(EntityKind::Role, "admin ").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_join_tables_are_independent() {
    let store = schema().await;
    let user = store.insert_user(&NewUser::new("alice", "h")).await.unwrap();
    let group = store.insert_group("site").await.unwrap();
    let role = store.insert_role("user").await.unwrap();

    // a role assignment does not imply membership
    store.insert_role_assignment(user, group, role).await.unwrap();
    assert!(store.role_assignment_exists(user, group, role).await.unwrap());
    assert!(!store.membership_exists(user, group).await.unwrap());

    store.insert_membership(user, group).await.unwrap();
    assert!(store.membership_exists(user, group).await.unwrap());
    assert_eq!(store.delete_membership(user, group).await.unwrap(), 1);
    assert_eq!(store.delete_membership(user, group).await.unwrap(), 0);
}

#[tokio::test]
async fn test_grant_round_trips_wire_encoding() {
    let store = schema().await;
    let user = store.insert_user(&NewUser::new("alice", "h")).await.unwrap();
    let group = store.insert_group("site").await.unwrap();
    let role = store.insert_role("admin").await.unwrap();
    let process = store
        .insert_process(&NewProcess {
            creator_id: user,
            name: "deploy".to_string(),
            run_command: "./deploy.sh".to_string(),
            kill_command: "pkill deploy".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(store.grant_capability(process, group, role).await.unwrap(), None);
    store
        .insert_grant(process, group, role, &Capability::new(true, false, true).to_string())
        .await
        .unwrap();
    let stored = store.grant_capability(process, group, role).await.unwrap();
    assert_eq!(stored.as_deref(), Some("101"));
    assert!(matches!(
        Capability::parse("101").map(|c| c.grants(PermissionLabel::ReadExecute)),
        Ok(true)
    ));
}

#[tokio::test]
async fn test_unique_email() {
    let store = schema().await;
    store
        .insert_user(&NewUser::new("alice", "h").with_email("a@example.com"))
        .await
        .unwrap();
    let err = store
        .insert_user(&NewUser::new("alicia", "h").with_email("a@example.com"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // users without email never collide
    store.insert_user(&NewUser::new("bob", "h")).await.unwrap();
    store.insert_user(&NewUser::new("carol", "h")).await.unwrap();
}

#[tokio::test]
async fn test_journal_records_every_call() {
    let memory = MemoryStore::with_schema().with_journal();
    let store: Arc<dyn ConciergeStore> = Arc::new(memory.clone());

    store.health_check().await.unwrap();
    store.list_role_names().await.unwrap();
    store.find_ids(EntityKind::Process, "deploy").await.unwrap();

    assert_eq!(
        memory.calls(),
        vec![
            StoreCall::HealthCheck,
            StoreCall::ListRoleNames,
            StoreCall::FindIds(EntityKind::Process, "deploy".to_string()),
        ]
    );
    assert_eq!(store.backend_name(), "memory");
}
