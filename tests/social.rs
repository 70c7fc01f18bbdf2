//! Social Graph Tests
//!
//! Covers follow toggling, its mirrored writes, and the follow audit.

mod common;

use common::app;
use desman::domain::social_graph::{relationship_exists, FollowMismatch, FollowState};
use desman::domain::user;
use desman::error::AppError;
use desman::infra::store::{DataStore, Patch};
use desman::jobs::follow_audit;
use serde_json::json;
use uuid::Uuid;

// ===========================================================================
// Follow toggling
// ===========================================================================

#[tokio::test]
async fn follow_writes_both_sides() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let state = app
        .state
        .social()
        .toggle_follow(&mut alice, bob.user_id)
        .await
        .unwrap();

    assert_eq!(state, FollowState::Following);
    let alice_doc = app.user(alice.user_id).await;
    let bob_doc = app.user(bob.user_id).await;
    assert!(alice_doc.following.contains(&bob.user_id));
    assert!(bob_doc.followers.contains(&alice.user_id));
    assert!(relationship_exists(&alice_doc, &bob_doc));
    assert!(alice.is_following(bob.user_id));
}

#[tokio::test]
async fn toggle_twice_restores_initial_state() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let alice_before = app.user(alice.user_id).await;
    let bob_before = app.user(bob.user_id).await;

    let social = app.state.social();
    assert_eq!(
        social.toggle_follow(&mut alice, bob.user_id).await.unwrap(),
        FollowState::Following
    );
    assert_eq!(
        social.toggle_follow(&mut alice, bob.user_id).await.unwrap(),
        FollowState::NotFollowing
    );

    assert_eq!(app.user(alice.user_id).await, alice_before);
    assert_eq!(app.user(bob.user_id).await, bob_before);
    assert!(!alice.is_following(bob.user_id));
}

#[tokio::test]
async fn follow_self_is_rejected() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let user_id = alice.user_id;

    let err = app
        .state
        .social()
        .toggle_follow(&mut alice, user_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidOperation(_)));
    let doc = app.user(user_id).await;
    assert!(!doc.following.contains(&user_id));
    assert!(!doc.followers.contains(&user_id));
}

#[tokio::test]
async fn follow_unknown_user_is_not_found() {
    let app = app();
    let mut alice = app.create_user("alice").await;

    let err = app
        .state
        .social()
        .toggle_follow(&mut alice, Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(app.user(alice.user_id).await.following.is_empty());
}

#[tokio::test]
async fn direction_comes_from_stored_state_not_session_cache() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let social = app.state.social();

    social.toggle_follow(&mut alice, bob.user_id).await.unwrap();

    // Another session of alice unfollows bob behind this session's back.
    let mut other_tab = alice.clone();
    social.toggle_follow(&mut other_tab, bob.user_id).await.unwrap();
    assert!(alice.is_following(bob.user_id));

    // The stale cache says "following", the store says otherwise: this follows again.
    let state = social.toggle_follow(&mut alice, bob.user_id).await.unwrap();
    assert_eq!(state, FollowState::Following);
    assert!(app.user(bob.user_id).await.followers.contains(&alice.user_id));
}

#[tokio::test]
async fn failed_second_write_leaves_relationship_one_sided() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let social = app.state.social();
    social.toggle_follow(&mut alice, bob.user_id).await.unwrap();

    app.store
        .fail_next_update(user::COLLECTION, &bob.user_id.to_string());
    let err = social
        .toggle_follow(&mut alice, bob.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Remote(_)));

    // Known limitation: the first write stays applied, nothing rolls it back.
    let alice_doc = app.user(alice.user_id).await;
    let bob_doc = app.user(bob.user_id).await;
    assert!(!alice_doc.following.contains(&bob.user_id));
    assert!(bob_doc.followers.contains(&alice.user_id));
    assert!(!relationship_exists(&alice_doc, &bob_doc));

    let mismatches = follow_audit::scan(&app.store).await.unwrap();
    assert_eq!(
        mismatches,
        vec![FollowMismatch::MissingFollowing {
            follower: alice.user_id,
            followee: bob.user_id,
        }]
    );
}

#[tokio::test]
async fn follower_lists_skip_deleted_users() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let mut carol = app.create_user("carol").await;
    let bob = app.create_user("bob").await;
    let social = app.state.social();
    social.toggle_follow(&mut alice, bob.user_id).await.unwrap();
    social.toggle_follow(&mut carol, bob.user_id).await.unwrap();

    // A follower id that points at nothing.
    app.store
        .update_fields(
            user::COLLECTION,
            &bob.user_id.to_string(),
            Patch::new().array_union("followers", json!(Uuid::new_v4().to_string())),
        )
        .await
        .unwrap();

    let mut names: Vec<String> = social
        .followers(bob.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.username)
        .collect();
    names.sort();
    assert_eq!(names, vec!["alice", "carol"]);

    let following = social.following(alice.user_id).await.unwrap();
    assert_eq!(following.len(), 1);
    assert_eq!(following[0].id, bob.user_id);
}

// ===========================================================================
// Audit
// ===========================================================================

#[tokio::test]
async fn audit_is_clean_for_mirrored_follows() {
    let app = app();
    let mut alice = app.create_user("alice").await;
    let mut bob = app.create_user("bob").await;
    let social = app.state.social();
    social.toggle_follow(&mut alice, bob.user_id).await.unwrap();
    social.toggle_follow(&mut bob, alice.user_id).await.unwrap();

    assert!(follow_audit::scan(&app.store).await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_reports_self_references_and_missing_followers() {
    let app = app();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let alice_id = alice.user_id.to_string();

    app.store
        .update_fields(
            user::COLLECTION,
            &alice_id,
            Patch::new()
                .array_union("following", json!(alice_id.clone()))
                .array_union("following", json!(bob.user_id.to_string())),
        )
        .await
        .unwrap();

    let mismatches = follow_audit::scan(&app.store).await.unwrap();
    assert!(mismatches.contains(&FollowMismatch::SelfReference {
        user: alice.user_id
    }));
    assert!(mismatches.contains(&FollowMismatch::MissingFollower {
        follower: alice.user_id,
        followee: bob.user_id,
    }));
    assert_eq!(mismatches.len(), 2);
}
