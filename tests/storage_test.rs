mod helpers;

use cadre::errors::CadreError;
use cadre::storage::{self, ClientMeta};
use cadre::token;
use helpers::builders::{ensure_entity, grant_to_user};
use helpers::db::test_policy;
use helpers::{RoleBuilder, TestDb, UserBuilder};

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let db = TestDb::new().await;
    let conn = db.connection();

    UserBuilder::new("bob").create(conn).await;

    let duplicate = storage::create_user(
        conn,
        &test_policy(),
        storage::NewUser {
            username: "bob".to_string(),
            password: "other".to_string(),
            email: None,
            first_name: "Other".to_string(),
            last_name: "Bob".to_string(),
            phone: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(CadreError::Validation(_))));
}

#[tokio::test]
async fn test_duplicate_email_rejected_as_validation() {
    let db = TestDb::new().await;
    let conn = db.connection();

    UserBuilder::new("bob")
        .with_email("shared@example.com")
        .create(conn)
        .await;

    // Same email under a different username, different case. Must surface
    // as a validation failure, not a database constraint error.
    let duplicate = storage::create_user(
        conn,
        &test_policy(),
        storage::NewUser {
            username: "robert".to_string(),
            password: "password123".to_string(),
            email: Some("Shared@Example.COM".to_string()),
            first_name: "Robert".to_string(),
            last_name: "User".to_string(),
            phone: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(CadreError::Validation(_))));
}

#[tokio::test]
async fn test_update_rejects_email_already_in_use() {
    let db = TestDb::new().await;
    let conn = db.connection();

    UserBuilder::new("bob")
        .with_email("bob@example.com")
        .create(conn)
        .await;
    let eve = UserBuilder::new("eve")
        .with_email("eve@example.com")
        .create(conn)
        .await;

    let stolen = storage::update_user(
        conn,
        eve.id,
        storage::UserUpdate {
            email: Some("bob@example.com".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(stolen, Err(CadreError::Validation(_))));

    // Re-submitting your own email is fine
    let own = storage::update_user(
        conn,
        eve.id,
        storage::UserUpdate {
            email: Some("eve@example.com".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(own.is_ok());
}

#[tokio::test]
async fn test_identifiers_stored_lowercased() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = storage::create_user(
        conn,
        &test_policy(),
        storage::NewUser {
            username: "Bob".to_string(),
            password: "password123".to_string(),
            email: Some("Bob@Example.com".to_string()),
            first_name: "Bob".to_string(),
            last_name: "User".to_string(),
            phone: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(user.username, "bob");
    assert_eq!(user.email.as_deref(), Some("bob@example.com"));

    // Mixed-case input at creation never defeats the login lookup
    let found = storage::get_user_by_login(conn, "BOB").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));

    // A mixed-case duplicate of an existing lowercase username is caught
    let duplicate = storage::create_user(
        conn,
        &test_policy(),
        storage::NewUser {
            username: "BOB".to_string(),
            password: "password123".to_string(),
            email: None,
            first_name: "Bob".to_string(),
            last_name: "Clone".to_string(),
            phone: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(CadreError::Validation(_))));
}

#[tokio::test]
async fn test_login_lookup_matches_username_or_email() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob")
        .with_email("bob@example.com")
        .create(conn)
        .await;

    let by_name = storage::get_user_by_login(conn, "bob").await.unwrap();
    let by_email = storage::get_user_by_login(conn, "BOB@Example.COM")
        .await
        .unwrap();
    assert_eq!(by_name.map(|u| u.id), Some(user.id));
    assert_eq!(by_email.map(|u| u.id), Some(user.id));

    assert!(storage::get_user_by_login(conn, "nobody")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_role_membership_checks() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    let role = RoleBuilder::new("editor").create(conn).await;

    storage::add_user_role(conn, user.id, role.id).await.unwrap();

    // Same membership twice is an error
    let twice = storage::add_user_role(conn, user.id, role.id).await;
    assert!(matches!(twice, Err(CadreError::Validation(_))));

    // Unknown role or user is NotFound
    let no_role = storage::add_user_role(conn, user.id, 9999).await;
    assert!(matches!(no_role, Err(CadreError::NotFound(_))));
    let no_user = storage::add_user_role(conn, 9999, role.id).await;
    assert!(matches!(no_user, Err(CadreError::NotFound(_))));

    let roles = storage::get_user_roles(conn, user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "editor");
}

#[tokio::test]
async fn test_duplicate_grant_for_same_entity_rejected() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    grant_to_user(conn, user.id, "invoice", true, false).await;

    let entity_id = ensure_entity(conn, "invoice").await;
    let duplicate = storage::grant_user_permission(conn, user.id, entity_id, false, true).await;
    assert!(matches!(duplicate, Err(CadreError::Validation(_))));

    // Granting against an unregistered entity is NotFound
    let missing = storage::grant_user_permission(conn, user.id, 9999, true, true).await;
    assert!(matches!(missing, Err(CadreError::NotFound(_))));
}

#[tokio::test]
async fn test_organization_names_unique_case_insensitive() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("founder").create(conn).await;
    let org = storage::create_organization(conn, "Acme", None, None, user.id)
        .await
        .unwrap();
    assert_eq!(org.name, "acme");

    let duplicate = storage::create_organization(conn, "ACME", None, None, user.id).await;
    assert!(matches!(duplicate, Err(CadreError::Validation(_))));
}

#[tokio::test]
async fn test_password_change_takes_effect() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").with_password("old-pass").create(conn).await;
    storage::set_user_password(conn, &test_policy(), user.id, "new-pass")
        .await
        .unwrap();

    let reloaded = storage::get_user(conn, user.id).await.unwrap().unwrap();
    assert!(cadre::credentials::verify_password("new-pass", &reloaded.password_hash).unwrap());
    assert!(!cadre::credentials::verify_password("old-pass", &reloaded.password_hash).unwrap());
}

#[tokio::test]
async fn test_delete_user_removes_dependents() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    let role = RoleBuilder::new("editor").create(conn).await;
    storage::add_user_role(conn, user.id, role.id).await.unwrap();
    grant_to_user(conn, user.id, "doc", true, true).await;
    storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
        .await
        .unwrap();

    storage::delete_user(conn, user.id).await.unwrap();

    assert!(storage::get_user(conn, user.id).await.unwrap().is_none());
    assert!(storage::get_user_roles(conn, user.id).await.unwrap().is_empty());
    assert!(storage::list_sessions(conn, user.id, 0, 10)
        .await
        .unwrap()
        .is_empty());

    // The role itself survives its last member
    assert!(storage::get_role_by_name(conn, "editor")
        .await
        .unwrap()
        .is_some());
}
