use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::session::Session;
use crate::app::users::fetch_user;
use crate::domain::social_graph::FollowState;
use crate::domain::user::{self, User};
use crate::error::{AppError, AppResult};
use crate::infra::store::{DataStore, Patch};

#[derive(Clone)]
pub struct SocialService {
    store: Arc<dyn DataStore>,
}

impl SocialService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Follow `target_id` if the signed-in user does not follow it yet, otherwise unfollow.
    ///
    /// The direction is decided from a fresh read of the current user's document.
    /// The two mirrored entries are written one after the other with no transaction:
    /// if the second write fails, the first one stays applied and the relationship is
    /// left one-sided. Each step is an idempotent set union or removal.
    pub async fn toggle_follow(
        &self,
        session: &mut Session,
        target_id: Uuid,
    ) -> AppResult<FollowState> {
        if session.user_id == target_id {
            return Err(AppError::invalid_operation("cannot follow yourself"));
        }

        let current = fetch_user(self.store.as_ref(), session.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        if self
            .store
            .get(user::COLLECTION, &target_id.to_string())
            .await?
            .is_none()
        {
            return Err(AppError::not_found("user not found"));
        }

        let me = session.user_id.to_string();
        let target = target_id.to_string();
        let mut following = current.following;

        let state = if following.contains(&target_id) {
            self.store
                .update_fields(
                    user::COLLECTION,
                    &me,
                    Patch::new().array_remove("following", json!(target)),
                )
                .await?;
            self.store
                .update_fields(
                    user::COLLECTION,
                    &target,
                    Patch::new().array_remove("followers", json!(me)),
                )
                .await?;
            following.remove(&target_id);
            FollowState::NotFollowing
        } else {
            self.store
                .update_fields(
                    user::COLLECTION,
                    &me,
                    Patch::new().array_union("following", json!(target)),
                )
                .await?;
            self.store
                .update_fields(
                    user::COLLECTION,
                    &target,
                    Patch::new().array_union("followers", json!(me)),
                )
                .await?;
            following.insert(target_id);
            FollowState::Following
        };

        session.following = following;
        info!(user_id = %session.user_id, target_id = %target_id, state = ?state, "follow toggled");

        Ok(state)
    }

    pub async fn followers(&self, user_id: Uuid) -> AppResult<Vec<User>> {
        let user = fetch_user(self.store.as_ref(), user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        self.resolve(user.followers.into_iter()).await
    }

    pub async fn following(&self, user_id: Uuid) -> AppResult<Vec<User>> {
        let user = fetch_user(self.store.as_ref(), user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        self.resolve(user.following.into_iter()).await
    }

    /// Ids whose document no longer exists are skipped.
    async fn resolve(&self, ids: impl Iterator<Item = Uuid>) -> AppResult<Vec<User>> {
        let lookups: Vec<_> = ids
            .map(|id| fetch_user(self.store.as_ref(), id))
            .collect();

        let mut users = Vec::with_capacity(lookups.len());
        for user in futures::future::join_all(lookups).await {
            if let Some(user) = user? {
                users.push(user);
            }
        }
        Ok(users)
    }
}
