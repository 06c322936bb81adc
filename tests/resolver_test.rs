mod helpers;

use cadre::principal::{resolver, EntityAction, Need};
use cadre::storage;
use helpers::builders::{assign_role, grant_to_role, grant_to_user};
use helpers::{RoleBuilder, TestDb, UserBuilder};

#[tokio::test]
async fn test_resolution_completeness() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let alice = UserBuilder::new("alice").create(conn).await;
    let editor = RoleBuilder::new("editor").create(conn).await;
    storage::add_user_role(conn, alice.id, editor.id)
        .await
        .unwrap();
    grant_to_role(conn, editor.id, "doc", false, true).await;

    let caps = resolver::resolve(conn, &alice).await.unwrap();

    assert!(caps.is_user(alice.id));
    assert!(caps.has_role("editor"));
    assert!(caps.can("doc", EntityAction::Edit));
    assert!(!caps.can("doc", EntityAction::Create));
    assert_eq!(caps.len(), 3);
}

#[tokio::test]
async fn test_permissions_union_across_sources() {
    let db = TestDb::new().await;
    let conn = db.connection();

    // Direct grant covers create, the role grant covers edit. The resolved
    // set must hold both even though neither source grants both.
    let user = UserBuilder::new("accountant").create(conn).await;
    let role = RoleBuilder::new("billing").create(conn).await;
    storage::add_user_role(conn, user.id, role.id).await.unwrap();

    grant_to_user(conn, user.id, "invoice", true, false).await;
    grant_to_role(conn, role.id, "invoice", false, true).await;

    let caps = resolver::resolve(conn, &user).await.unwrap();

    assert!(caps.can("invoice", EntityAction::Create));
    assert!(caps.can("invoice", EntityAction::Edit));
}

#[tokio::test]
async fn test_role_revocation_is_live() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let alice = UserBuilder::new("alice").create(conn).await;
    let role_id = assign_role(conn, alice.id, "editor").await;

    let before = resolver::resolve(conn, &alice).await.unwrap();
    assert!(before.has_role("editor"));

    storage::remove_user_role(conn, alice.id, role_id)
        .await
        .unwrap();

    // No caching: the very next resolution reflects the revocation
    let after = resolver::resolve(conn, &alice).await.unwrap();
    assert!(!after.has_role("editor"));
    assert_eq!(after.len(), 1);
    assert!(after.is_user(alice.id));
}

#[tokio::test]
async fn test_no_affiliation_yields_no_organization_need() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("freelancer").create(conn).await;
    let caps = resolver::resolve(conn, &user).await.unwrap();

    assert!(!caps
        .iter()
        .any(|need| matches!(need, Need::Organization(_))));
}

#[tokio::test]
async fn test_affiliation_yields_organization_need() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("employee").create(conn).await;
    let org = storage::create_organization(conn, "Acme", None, None, user.id)
        .await
        .unwrap();
    storage::create_affiliation(
        conn,
        user.id,
        org.id,
        None,
        cadre::entities::affiliation::Position::Employee,
    )
    .await
    .unwrap();

    let caps = resolver::resolve(conn, &user).await.unwrap();

    // Organization names are stored lowercased
    assert!(caps.in_organization("acme"));
}

#[tokio::test]
async fn test_grants_without_roles_still_resolve() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("loner").create(conn).await;
    grant_to_user(conn, user.id, "report", true, true).await;

    let caps = resolver::resolve(conn, &user).await.unwrap();

    assert!(caps.is_user(user.id));
    assert!(caps.can("report", EntityAction::Create));
    assert!(caps.can("report", EntityAction::Edit));
    assert!(!caps.iter().any(|need| matches!(need, Need::Role(_))));
}
