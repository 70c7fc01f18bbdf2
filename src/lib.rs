pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod jobs;
pub mod views;

use std::sync::Arc;

use crate::app::auth::AuthService;
use crate::app::feed::{FeedSynchronizer, DEFAULT_FEED_LIMIT};
use crate::app::media::ImagePolicy;
use crate::app::posts::PostService;
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::config::AppConfig;
use crate::infra::{identity::IdentityProvider, storage::BlobStore, store::DataStore};

/// The collaborators one client talks to, plus the limits its services apply.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub feed_limit: usize,
    pub image_policy: ImagePolicy,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            blobs,
            identity,
            feed_limit: DEFAULT_FEED_LIMIT,
            image_policy: ImagePolicy::default(),
        }
    }

    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.feed_limit = config.feed_limit;
        self.image_policy = ImagePolicy {
            max_width: config.image_max_width,
            quality: config.image_quality,
            max_bytes: config.upload_max_bytes,
        };
        self
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.identity.clone())
    }

    pub fn social(&self) -> SocialService {
        SocialService::new(self.store.clone())
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.store.clone(), self.blobs.clone(), self.image_policy)
    }

    pub fn users(&self) -> UserService {
        UserService::new(
            self.store.clone(),
            self.blobs.clone(),
            self.posts(),
            self.image_policy,
        )
    }

    pub fn feed(&self) -> FeedSynchronizer {
        FeedSynchronizer::new(self.store.clone())
    }
}
