//! Post Interaction Tests
//!
//! Covers publishing, like toggling, and comments.

mod common;

use async_trait::async_trait;
use common::{app, png};
use desman::app::media::ImageUpload;
use desman::domain::{comment, post};
use desman::error::AppError;
use desman::infra::memory::MemoryStore;
use desman::infra::store::{DataStore, Document, Fields, Patch, Query, Subscription};
use desman::AppState;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Lands one like from `rival` on the first post update, just before it.
struct RivalLikeStore {
    inner: MemoryStore,
    rival: Uuid,
    fired: AtomicBool,
}

#[async_trait]
impl DataStore for RivalLikeStore {
    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> anyhow::Result<()> {
        self.inner.set(collection, id, fields).await
    }

    async fn add(&self, collection: &str, patch: Patch) -> anyhow::Result<Document> {
        self.inner.add(collection, patch).await
    }

    async fn update_fields(&self, collection: &str, id: &str, patch: Patch) -> anyhow::Result<()> {
        if collection == post::COLLECTION && !self.fired.swap(true, Ordering::SeqCst) {
            let rival_like = Patch::new()
                .increment("like_count", 1)
                .array_union("liked_by", json!(self.rival.to_string()));
            self.inner.update_fields(collection, id, rival_like).await?;
        }
        self.inner.update_fields(collection, id, patch).await
    }

    async fn query(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<Document>> {
        self.inner.query(collection, query).await
    }

    async fn subscribe(&self, collection: &str, query: Query) -> anyhow::Result<Subscription> {
        self.inner.subscribe(collection, query).await
    }
}

// ===========================================================================
// Publishing
// ===========================================================================

#[tokio::test]
async fn publish_text_post() {
    let app = app();
    let alice = app.create_user("alice").await;

    let post = app
        .state
        .posts()
        .publish(&alice, Some("hello"), None)
        .await
        .unwrap();

    assert_eq!(post.text, "hello");
    assert_eq!(post.like_count, 0);
    assert!(post.liked_by.is_empty());
    assert_eq!(post.author_id, alice.user_id);
    assert_eq!(post.author_username, "alice");
    assert!(post.image_url.is_none());
    assert_eq!(app.count(post::COLLECTION).await, 1);
    assert_eq!(app.post(post.id).await, post);
}

#[tokio::test]
async fn publish_empty_post_is_rejected() {
    let app = app();
    let alice = app.create_user("alice").await;
    let posts = app.state.posts();

    let err = posts.publish(&alice, Some(""), None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = posts.publish(&alice, Some("   "), None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = posts
        .publish(&alice, None, Some(ImageUpload::new(Vec::new(), "image/png")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(app.count(post::COLLECTION).await, 0);
}

#[tokio::test]
async fn publish_text_too_long() {
    let app = app();
    let alice = app.create_user("alice").await;

    let err = app
        .state
        .posts()
        .publish(&alice, Some(&"a".repeat(281)), None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "post must be at most 280 characters");
    assert_eq!(app.count(post::COLLECTION).await, 0);

    app.state
        .posts()
        .publish(&alice, Some(&"ñ".repeat(280)), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn publish_with_image_uploads_compressed_jpeg() {
    let app = app();
    let alice = app.create_user("alice").await;

    let post = app
        .state
        .posts()
        .publish(&alice, None, Some(png(2400, 600)))
        .await
        .unwrap();

    let url = post.image_url.expect("image url");
    let paths = app.blobs.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with("posts/"));
    assert!(paths[0].ends_with(".jpg"));
    assert_eq!(url, format!("memory://blobs/{}", paths[0]));

    let (bytes, content_type) = app.blobs.get(&paths[0]).unwrap();
    assert_eq!(content_type, "image/jpeg");
    let stored = image::load_from_memory(&bytes).unwrap();
    assert_eq!((stored.width(), stored.height()), (1200, 300));
    assert_eq!(post.text, "");
}

#[tokio::test]
async fn failed_image_validation_creates_no_post() {
    let app = app();
    let alice = app.create_user("alice").await;

    let err = app
        .state
        .posts()
        .publish(
            &alice,
            Some("look"),
            Some(ImageUpload::new(vec![1, 2, 3], "image/gif")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(app.count(post::COLLECTION).await, 0);
    assert!(app.blobs.paths().is_empty());
}

// ===========================================================================
// Likes
// ===========================================================================

#[tokio::test]
async fn toggle_like_on_and_off() {
    let app = app();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let post = app.publish(&alice, "hello").await;
    let posts = app.state.posts();

    let state = posts.toggle_like(post.id, bob.user_id).await.unwrap();
    assert!(state.liked);
    assert_eq!(state.like_count, 1);
    let stored = app.post(post.id).await;
    assert_eq!(stored.like_count, 1);
    assert!(stored.liked_by.contains(&bob.user_id));

    let state = posts.toggle_like(post.id, bob.user_id).await.unwrap();
    assert!(!state.liked);
    assert_eq!(state.like_count, 0);
    let stored = app.post(post.id).await;
    assert_eq!(stored.like_count, 0);
    assert!(stored.liked_by.is_empty());
}

#[tokio::test]
async fn like_count_matches_liked_by_after_each_toggle() {
    let app = app();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let carol = app.create_user("carol").await;
    let post = app.publish(&alice, "hello").await;
    let posts = app.state.posts();

    for user_id in [bob.user_id, carol.user_id, alice.user_id, bob.user_id, carol.user_id] {
        posts.toggle_like(post.id, user_id).await.unwrap();
        let stored = app.post(post.id).await;
        assert_eq!(stored.like_count, stored.liked_by.len() as i64);
    }
    assert_eq!(app.post(post.id).await.liked_by.len(), 1);
}

#[tokio::test]
async fn like_state_includes_concurrent_likes() {
    let app = app();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let post = app.publish(&alice, "hello").await;

    let racing = AppState::new(
        Arc::new(RivalLikeStore {
            inner: app.store.clone(),
            rival: alice.user_id,
            fired: AtomicBool::new(false),
        }),
        Arc::new(app.blobs.clone()),
        app.identity.clone(),
    );
    let state = racing
        .posts()
        .toggle_like(post.id, bob.user_id)
        .await
        .unwrap();

    let stored = app.post(post.id).await;
    assert!(state.liked);
    assert_eq!(stored.like_count, 2);
    assert_eq!(state.like_count, stored.like_count);
}

#[tokio::test]
async fn like_missing_post_is_not_found() {
    let app = app();
    let alice = app.create_user("alice").await;

    let err = app
        .state
        .posts()
        .toggle_like(Uuid::new_v4(), alice.user_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

// ===========================================================================
// Comments
// ===========================================================================

#[tokio::test]
async fn blank_comment_is_ignored() {
    let app = app();
    let alice = app.create_user("alice").await;
    let post = app.publish(&alice, "hello").await;

    let comment = app
        .state
        .posts()
        .add_comment(post.id, &alice, "   ")
        .await
        .unwrap();

    assert!(comment.is_none());
    assert_eq!(app.count(comment::COLLECTION).await, 0);
}

#[tokio::test]
async fn comments_come_back_oldest_first() {
    let app = app();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let post = app.publish(&alice, "hello").await;
    let other = app.publish(&alice, "other").await;
    let posts = app.state.posts();

    let first = posts
        .add_comment(post.id, &bob, "  first  ")
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    posts.add_comment(post.id, &alice, "second").await.unwrap();
    posts.add_comment(other.id, &bob, "elsewhere").await.unwrap();

    assert_eq!(first.text, "first");
    assert_eq!(first.author_username, "bob");

    let comments = posts.comments_for(post.id).await.unwrap();
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn comment_too_long() {
    let app = app();
    let alice = app.create_user("alice").await;
    let post = app.publish(&alice, "hello").await;

    let err = app
        .state
        .posts()
        .add_comment(post.id, &alice, &"x".repeat(201))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(app.count(comment::COLLECTION).await, 0);
}
