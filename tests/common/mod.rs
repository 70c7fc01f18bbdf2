#![allow(dead_code)]

use bytes::Bytes;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use time::macros::date;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use desman::app::auth::Registration;
use desman::app::media::ImageUpload;
use desman::app::session::Session;
use desman::domain::post::{self, Post};
use desman::domain::user::{self, User};
use desman::infra::memory::{MemoryBlobStore, MemoryIdentity, MemoryStore};
use desman::infra::store::{encode, DataStore};
use desman::AppState;

pub const DEFAULT_PASSWORD: &str = "testpassword123";
pub const TODAY: Date = date!(2026 - 01 - 15);
pub const WAIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// TestApp: in-memory collaborators, fresh per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    pub blobs: MemoryBlobStore,
    pub identity: Arc<MemoryIdentity>,
}

pub fn app() -> TestApp {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let identity = Arc::new(MemoryIdentity::new());
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(blobs.clone()),
        identity.clone(),
    );
    TestApp {
        state,
        store,
        blobs,
        identity,
    }
}

pub fn registration(username: &str) -> Registration {
    Registration {
        username: username.to_string(),
        email: format!("{}@example.test", username),
        birthdate: date!(2000 - 03 - 10),
        password: DEFAULT_PASSWORD.to_string(),
        accept_terms: true,
    }
}

impl TestApp {
    pub async fn create_user(&self, username: &str) -> Session {
        self.state
            .auth()
            .register(registration(username), TODAY)
            .await
            .expect("failed to register test user")
    }

    /// The stored user document, read straight from the store.
    pub async fn user(&self, user_id: Uuid) -> User {
        self.store
            .get(user::COLLECTION, &user_id.to_string())
            .await
            .expect("store read failed")
            .expect("user document missing")
            .decode()
            .expect("user document malformed")
    }

    pub async fn post(&self, post_id: Uuid) -> Post {
        self.store
            .get(post::COLLECTION, &post_id.to_string())
            .await
            .expect("store read failed")
            .expect("post document missing")
            .decode()
            .expect("post document malformed")
    }

    pub async fn publish(&self, session: &Session, text: &str) -> Post {
        self.state
            .posts()
            .publish(session, Some(text), None)
            .await
            .expect("failed to publish test post")
    }

    /// Write a post directly with a chosen timestamp.
    pub async fn insert_post_at(
        &self,
        author: &Session,
        text: &str,
        created_at: OffsetDateTime,
    ) -> Post {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: author.user_id,
            author_username: author.username.clone(),
            author_profile_image_url: None,
            text: text.to_string(),
            image_url: None,
            created_at,
            like_count: 0,
            liked_by: BTreeSet::new(),
        };
        self.store
            .set(
                post::COLLECTION,
                &post.id.to_string(),
                encode(&post).expect("encode post"),
            )
            .await
            .expect("failed to insert post");
        post
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .query(collection, &Default::default())
            .await
            .expect("store query failed")
            .len()
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

pub fn png(width: u32, height: u32) -> ImageUpload {
    let image = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
    });
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("failed to encode test png");
    ImageUpload::new(Bytes::from(bytes.into_inner()), "image/png")
}
