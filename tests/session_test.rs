mod helpers;

use cadre::storage::{self, ClientMeta};
use cadre::token;
use helpers::{TestDb, UserBuilder};

#[tokio::test]
async fn test_each_login_gets_its_own_session() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;

    let a = storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
        .await
        .unwrap();
    let b = storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
        .await
        .unwrap();

    assert_ne!(a.jti, b.jti);

    let sessions = storage::list_sessions(conn, user.id, 0, 10).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.active == 1));
}

#[tokio::test]
async fn test_revoking_one_session_leaves_the_other() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    let a = storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
        .await
        .unwrap();
    let b = storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
        .await
        .unwrap();

    storage::revoke_session(conn, &a.jti).await.unwrap();

    let a_after = storage::get_session(conn, &a.jti, user.id).await.unwrap().unwrap();
    let b_after = storage::get_session(conn, &b.jti, user.id).await.unwrap().unwrap();
    assert_eq!(a_after.active, 0);
    assert_eq!(b_after.active, 1);
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    let session =
        storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
            .await
            .unwrap();

    storage::revoke_session(conn, &session.jti).await.unwrap();
    // Second revocation of the same jti, and one for a jti that never existed
    storage::revoke_session(conn, &session.jti).await.unwrap();
    storage::revoke_session(conn, "no-such-jti").await.unwrap();
}

#[tokio::test]
async fn test_sessions_list_in_creation_order() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    for _ in 0..3 {
        storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
            .await
            .unwrap();
    }

    let sessions = storage::list_sessions(conn, user.id, 0, 10).await.unwrap();
    assert_eq!(sessions.len(), 3);

    let mut expected: Vec<_> = sessions
        .iter()
        .map(|s| (s.created_at, s.jti.clone()))
        .collect();
    expected.sort();
    let actual: Vec<_> = sessions
        .iter()
        .map(|s| (s.created_at, s.jti.clone()))
        .collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_session_pagination_is_restartable() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    for _ in 0..5 {
        storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
            .await
            .unwrap();
    }

    let first = storage::list_sessions(conn, user.id, 0, 2).await.unwrap();
    let second = storage::list_sessions(conn, user.id, 2, 2).await.unwrap();
    let third = storage::list_sessions(conn, user.id, 4, 2).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(third.len(), 1);

    let all = storage::list_sessions(conn, user.id, 0, 10).await.unwrap();
    let paged: Vec<_> = first
        .into_iter()
        .chain(second)
        .chain(third)
        .map(|s| s.jti)
        .collect();
    assert_eq!(paged, all.into_iter().map(|s| s.jti).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_revoke_all_except_current() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let user = UserBuilder::new("bob").create(conn).await;
    let current =
        storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
            .await
            .unwrap();
    for _ in 0..2 {
        storage::create_session(conn, user.id, &token::generate_jti(), ClientMeta::default())
            .await
            .unwrap();
    }

    let revoked = storage::revoke_all_except(conn, user.id, &current.jti)
        .await
        .unwrap();
    assert_eq!(revoked.len(), 2);
    assert!(revoked.iter().all(|s| s.active == 0));

    let kept = storage::get_session(conn, &current.jti, user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.active, 1);

    // Running it again finds nothing left to revoke
    let again = storage::revoke_all_except(conn, user.id, &current.jti)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_sessions_are_scoped_to_their_user() {
    let db = TestDb::new().await;
    let conn = db.connection();

    let bob = UserBuilder::new("bob").create(conn).await;
    let eve = UserBuilder::new("eve").create(conn).await;
    let session =
        storage::create_session(conn, bob.id, &token::generate_jti(), ClientMeta::default())
            .await
            .unwrap();

    // Lookup under the wrong owner finds nothing
    assert!(storage::get_session(conn, &session.jti, eve.id)
        .await
        .unwrap()
        .is_none());
    assert!(storage::get_session(conn, &session.jti, bob.id)
        .await
        .unwrap()
        .is_some());
}
