use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::media::{upload_image, ImagePolicy, ImageUpload};
use crate::app::posts::PostService;
use crate::app::session::Session;
use crate::domain::user::{self, Profile, User, UserHit};
use crate::error::{AppError, AppResult};
use crate::infra::storage::BlobStore;
use crate::infra::store::{DataStore, Patch, Query};

pub const MIN_SEARCH_CHARS: usize = 2;
pub const MAX_BIO_CHARS: usize = 160;

pub(crate) async fn fetch_user(store: &dyn DataStore, user_id: Uuid) -> AppResult<Option<User>> {
    match store.get(user::COLLECTION, &user_id.to_string()).await? {
        Some(document) => Ok(Some(document.decode()?)),
        None => Ok(None),
    }
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DataStore>,
    blobs: Arc<dyn BlobStore>,
    posts: PostService,
    image_policy: ImagePolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn DataStore>,
        blobs: Arc<dyn BlobStore>,
        posts: PostService,
        image_policy: ImagePolicy,
    ) -> Self {
        Self {
            store,
            blobs,
            posts,
            image_policy,
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        fetch_user(self.store.as_ref(), user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    /// Viewing someone else's profile first refreshes the viewer's own follow sets,
    /// so the follow button reflects changes made from other sessions.
    pub async fn profile(&self, session: &mut Session, user_id: Uuid) -> AppResult<Profile> {
        let user = self.get_user(user_id).await?;
        let is_own = user_id == session.user_id;

        if !is_own {
            if let Some(me) = fetch_user(self.store.as_ref(), session.user_id).await? {
                session.following = me.following;
                session.followers = me.followers;
            }
        }

        let posts_count = self.posts.count_posts(user_id).await?;
        Ok(Profile {
            posts_count,
            followers_count: user.followers.len(),
            following_count: user.following.len(),
            is_own,
            is_following: !is_own && session.is_following(user_id),
            user,
        })
    }

    /// Case-insensitive substring match on usernames, excluding the viewer.
    pub async fn search(&self, session: &Session, query: &str) -> AppResult<Vec<UserHit>> {
        let term = query.trim().to_lowercase();
        if term.chars().count() < MIN_SEARCH_CHARS {
            return Ok(Vec::new());
        }

        let documents = self.store.query(user::COLLECTION, &Query::new()).await?;
        let mut users = Vec::new();
        for document in &documents {
            let user: User = document.decode()?;
            if user.id != session.user_id && user.username.to_lowercase().contains(&term) {
                users.push(user);
            }
        }
        users.sort_by(|a, b| a.username.cmp(&b.username));

        let counts = futures::future::join_all(
            users.iter().map(|user| self.posts.count_posts(user.id)),
        )
        .await;

        users
            .into_iter()
            .zip(counts)
            .map(|(user, posts_count)| {
                Ok(UserHit {
                    posts_count: posts_count?,
                    followers_count: user.followers.len(),
                    user,
                })
            })
            .collect()
    }

    pub async fn update_profile_photo(
        &self,
        session: &mut Session,
        upload: ImageUpload,
    ) -> AppResult<String> {
        let url = upload_image(self.blobs.as_ref(), &self.image_policy, "profiles", upload).await?;
        self.store
            .update_fields(
                user::COLLECTION,
                &session.user_id.to_string(),
                Patch::new().set("profile_image_url", json!(url)),
            )
            .await?;

        session.profile_image_url = Some(url.clone());
        info!(user_id = %session.user_id, "profile photo updated");
        Ok(url)
    }

    pub async fn update_bio(&self, session: &Session, bio: &str) -> AppResult<()> {
        let bio = bio.trim();
        if bio.chars().count() > MAX_BIO_CHARS {
            return Err(AppError::validation(format!(
                "bio must be at most {} characters",
                MAX_BIO_CHARS
            )));
        }

        self.store
            .update_fields(
                user::COLLECTION,
                &session.user_id.to_string(),
                Patch::new().set("bio", json!(bio)),
            )
            .await?;
        Ok(())
    }
}
