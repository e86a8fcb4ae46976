//! Unit of work scenarios run against the in-memory engine.

use std::sync::Arc;

use chrono::Utc;
use keystone_core::domain::{ContactDetails, Role, User};
use keystone_core::ports::{Page, PasswordError, PasswordHasher};
use keystone_core::services::{ContactService, RoleService, UserChanges, UserService};
use keystone_core::{ErrorKind, Failure, StorageFailure, UnitOfWork};
use uuid::Uuid;

use crate::memory::schema::{USERS, Values};
use crate::memory::{MemorySession, MemorySessionFactory, MemoryStore, Operation, Row};

/// Reversible stand-in so tests don't pay for Argon2.
struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(format!("plain${password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        hash.strip_prefix("plain$")
            .map(|stored| stored == password)
            .ok_or_else(|| PasswordError::MalformedHash(hash.to_owned()))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    uow: UnitOfWork<MemorySessionFactory>,
    users: UserService<MemorySessionFactory>,
    roles: RoleService<MemorySessionFactory>,
    contacts: ContactService<MemorySessionFactory>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let uow = UnitOfWork::new(Arc::new(MemorySessionFactory::new(Arc::clone(&store))));
    Harness {
        users: UserService::new(uow.clone(), Arc::new(PlainHasher)),
        roles: RoleService::new(uow.clone()),
        contacts: ContactService::new(uow.clone()),
        uow,
        store,
    }
}

fn phone(number: &str) -> ContactDetails {
    ContactDetails {
        phone: number.to_owned(),
        ..ContactDetails::default()
    }
}

#[tokio::test]
async fn test_failed_scope_leaves_no_trace() {
    let h = harness();
    let role = Role::new("admin", None).unwrap();

    let result: Result<(), _> = h
        .uow
        .run(move |scope| {
            Box::pin(async move {
                scope.roles().save(role).await?;
                Err(Failure::other("boom"))
            })
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Unclassified(message) if message == "boom"));
    assert_eq!(err.diagnostics().unwrap().original_type, "anyhow::Error");
    assert!(h.store.rows("roles").is_empty());
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_successful_scope_commits_every_write() {
    let h = harness();
    let user = h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();
    let role = h.roles.create_role("admin", Some("Administrators".into())).await.unwrap();

    let (user_id, role_id) = (user.id, role.id);
    h.uow
        .run(move |scope| {
            Box::pin(async move {
                scope.users().assign_role(user_id, role_id).await?;
                scope.users().assign_role(user_id, role_id).await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    let roles = h.users.roles_of(user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "admin");
    assert_eq!(h.store.rows("user_roles").len(), 1);
}

#[tokio::test]
async fn test_duplicate_email_across_scopes_is_conflict() {
    let h = harness();
    h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    let err = h.users.create_user("a@b.com", "password456", "Bob").await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Conflict { field, .. } if field == "email"));
    assert_eq!(h.store.rows("users").len(), 1);
}

#[tokio::test]
async fn test_storage_unique_violation_maps_to_conflict() {
    let h = harness();
    h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    // Bypass the service's lookup so storage rejects the row itself.
    let user = User::new(
        keystone_core::domain::Email::parse("a@b.com").unwrap(),
        "plain$password123".into(),
        "Impostor".into(),
    );
    let err = h
        .uow
        .run(move |scope| Box::pin(async move { Ok(scope.users().save(user).await?) }))
        .await
        .unwrap_err();

    match err.kind() {
        ErrorKind::Conflict { field, value, constraint } => {
            assert_eq!(field, "email");
            assert_eq!(value, "a@b.com");
            assert_eq!(constraint.as_deref(), Some("users_email_key"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    let diagnostics = err.diagnostics().unwrap();
    assert_eq!(diagnostics.original_type, "keystone_infra::memory::EngineError");
    assert!(diagnostics.original_message.contains("already exists"));
}

#[tokio::test]
async fn test_timeout_during_save_is_reported_and_session_released() {
    let h = harness();
    h.store
        .fail_next_on(Operation::Write, "users", StorageFailure::timeout("insert timed out"));

    let err = h.users.create_user("a@b.com", "password123", "Ada").await.unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Timeout { operation } if operation == "insert"));
    assert!(err.kind().is_retryable());
    assert_eq!(h.store.open_sessions(), 0);
    assert!(h.store.rows("users").is_empty());
}

#[tokio::test]
async fn test_commit_failure_is_classified() {
    let h = harness();
    h.store.fail_next(
        Operation::Commit,
        StorageFailure::operational("server closed the connection unexpectedly"),
    );

    let err = h.roles.create_role("admin", None).await.unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Connectivity(_)));
    assert!(h.store.rows("roles").is_empty());
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_rollback_failure_wins_and_remembers_the_trigger() {
    let h = harness();
    h.store
        .fail_next(Operation::Rollback, StorageFailure::operational("connection reset by peer"));

    let result: Result<(), _> = h
        .uow
        .run(|_scope| Box::pin(async move { Err(Failure::other("boom")) }))
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Connectivity(_)));
    assert_eq!(err.notes(), ["Rollback was triggered by: boom"]);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_dropped_scope_releases_and_discards() {
    let h = harness();
    {
        let scope = h.uow.begin().await.unwrap();
        scope.roles().save(Role::new("admin", None).unwrap()).await.unwrap();
        assert_eq!(h.store.open_sessions(), 1);
    }

    assert_eq!(h.store.open_sessions(), 0);
    assert!(h.store.rows("roles").is_empty());
}

#[tokio::test]
async fn test_nested_scopes_are_independent() {
    let h = harness();
    let outer = h.uow.begin().await.unwrap();
    outer.roles().save(Role::new("outer", None).unwrap()).await.unwrap();

    let inner = h.uow.begin().await.unwrap();
    assert!(inner.roles().find_by_name("outer").await.unwrap().is_none());
    inner.roles().save(Role::new("inner", None).unwrap()).await.unwrap();
    inner.exit(Ok(())).await.unwrap();

    let result: Result<(), _> = outer.exit(Err(Failure::other("outer failed"))).await;
    assert!(result.is_err());

    let names: Vec<_> = h
        .roles
        .list_roles(Page::default())
        .await
        .unwrap()
        .into_iter()
        .map(|role| role.name)
        .collect();
    assert_eq!(names, ["inner"]);
}

#[tokio::test]
async fn test_mid_scope_commit_survives_later_failure() {
    let h = harness();
    let scope = h.uow.begin().await.unwrap();

    scope.roles().save(Role::new("admin", None).unwrap()).await.unwrap();
    scope.commit().await.unwrap();

    let duplicate = scope.roles().save(Role::new("admin", None).unwrap()).await;
    let err = scope.exit(duplicate.map_err(Failure::from)).await.unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Conflict { field, .. } if field == "name"));
    assert_eq!(h.store.rows("roles").len(), 1);
}

#[tokio::test]
async fn test_failed_mid_scope_commit_discards_pending_work() {
    let h = harness();
    h.store
        .fail_next(Operation::Commit, StorageFailure::operational("server closed the connection"));
    let scope = h.uow.begin().await.unwrap();

    scope.roles().save(Role::new("admin", None).unwrap()).await.unwrap();
    let err = scope.commit().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Connectivity(_)));

    scope.exit(Ok(())).await.unwrap();

    assert!(h.store.rows("roles").is_empty());
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_mid_scope_rollback_discards_pending_work() {
    let h = harness();
    let scope = h.uow.begin().await.unwrap();

    scope.roles().save(Role::new("temp", None).unwrap()).await.unwrap();
    scope.rollback().await.unwrap();
    scope.roles().save(Role::new("kept", None).unwrap()).await.unwrap();
    scope.exit(Ok(())).await.unwrap();

    let rows = h.store.rows("roles");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("name").unwrap(), "kept");
}

#[tokio::test]
async fn test_direct_handle_sees_scope_writes() {
    let h = harness();
    let scope = h.uow.begin().await.unwrap();
    scope.roles().save(Role::new("admin", None).unwrap()).await.unwrap();

    let count = scope
        .direct(|session: &MemorySession| Box::pin(async move { Ok(session.count("roles")?) }))
        .await
        .unwrap();
    assert_eq!(count, 1);

    let err = scope
        .direct(|session: &MemorySession| Box::pin(async move { Ok(session.count("posts")?) }))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Persistence(message) if message.starts_with("SQL programming error")));

    scope.exit(Ok(())).await.unwrap();
}

#[tokio::test]
async fn test_listing_skips_malformed_rows() {
    let h = harness();
    h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    let mut values = Values::new();
    values.insert("email", "not-an-email".into());
    values.insert("password_hash", "plain$x".into());
    values.insert("full_name", "Broken".into());
    values.insert("is_active", true.into());
    let now = Utc::now();
    let broken = Uuid::new_v4();
    h.store.seed(
        &USERS,
        Row {
            id: broken,
            created_at: now,
            updated_at: now,
            values,
        },
    );

    let users = h.users.list_users(Page::default()).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "a@b.com");

    let err = h.users.get_user(broken).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Persistence(_)));
}

#[tokio::test]
async fn test_paging_respects_skip_and_limit() {
    let h = harness();
    for name in ["a", "b", "c", "d"] {
        h.roles.create_role(name, None).await.unwrap();
    }

    let page: Vec<_> = h
        .roles
        .list_roles(Page::new(1, 2))
        .await
        .unwrap()
        .into_iter()
        .map(|role| role.name)
        .collect();
    assert_eq!(page, ["b", "c"]);
}

#[tokio::test]
async fn test_contact_for_missing_user_is_referential_integrity() {
    let h = harness();
    let ghost = Uuid::new_v4();

    let err = h.contacts.save_contact(ghost, phone("555-0100")).await.unwrap_err();

    match err.kind() {
        ErrorKind::ReferentialIntegrity { entity, key, .. } => {
            assert_eq!(entity, "Users");
            assert_eq!(key, &ghost.to_string());
        }
        other => panic!("expected referential integrity error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_contact_upsert_and_cascade() {
    let h = harness();
    let user = h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    let first = h.contacts.save_contact(user.id, phone("555-0100")).await.unwrap();
    let second = h.contacts.save_contact(user.id, phone("555-0199")).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.details.phone, "555-0199");

    h.users.delete_user(user.id).await.unwrap();

    assert!(h.store.rows("contacts").is_empty());
    assert!(matches!(
        h.contacts.get_contact(first.id).await.unwrap_err().kind(),
        ErrorKind::NotFound { entity: "Contact", .. }
    ));
}

#[tokio::test]
async fn test_blank_phone_is_rejected_before_storage() {
    let h = harness();
    let err = h.contacts.save_contact(Uuid::new_v4(), phone("  ")).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Validation(_)));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_credentials() {
    let h = harness();
    let user = h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    assert_eq!(h.users.verify_credentials("a@b.com", "password123").await.unwrap().id, user.id);
    assert!(matches!(
        h.users.verify_credentials("a@b.com", "wrong-password").await.unwrap_err().kind(),
        ErrorKind::Unauthorized(_)
    ));
    assert!(matches!(
        h.users.verify_credentials("nobody@b.com", "password123").await.unwrap_err().kind(),
        ErrorKind::Unauthorized(_)
    ));

    h.users
        .update_user(
            user.id,
            UserChanges {
                is_active: Some(false),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        h.users.verify_credentials("a@b.com", "password123").await.unwrap_err().kind(),
        ErrorKind::Unauthorized(message) if message == "account is inactive"
    ));
}

#[tokio::test]
async fn test_change_password_requires_current_one() {
    let h = harness();
    let user = h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    assert!(h.users.change_password(user.id, "wrong-one", "newpassword").await.is_err());
    h.users.change_password(user.id, "password123", "newpassword").await.unwrap();

    assert!(h.users.verify_credentials("a@b.com", "newpassword").await.is_ok());
}

#[tokio::test]
async fn test_updating_email_to_taken_address_conflicts() {
    let h = harness();
    h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();
    let bob = h.users.create_user("bob@b.com", "password123", "Bob").await.unwrap();

    let err = h
        .users
        .update_user(
            bob.id,
            UserChanges {
                email: Some("a@b.com".into()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Conflict { field, .. } if field == "email"));
}

#[tokio::test]
async fn test_assigning_unknown_role_is_not_found() {
    let h = harness();
    let user = h.users.create_user("a@b.com", "password123", "Ada").await.unwrap();

    let err = h.users.assign_role(user.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotFound { entity: "Role", .. }));
}

#[tokio::test]
async fn test_open_failure_is_mapped() {
    let h = harness();
    h.store
        .fail_next(Operation::Open, StorageFailure::operational("connection refused"));

    let err = h.roles.list_roles(Page::default()).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Connectivity(_)));
    assert_eq!(h.store.open_sessions(), 0);
}
