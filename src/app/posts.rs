use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::media::{upload_image, ImagePolicy, ImageUpload};
use crate::app::session::Session;
use crate::domain::comment::{self, Comment, NewComment};
use crate::domain::post::{self, LikeState, NewPost, Post};
use crate::error::{AppError, AppResult};
use crate::infra::storage::BlobStore;
use crate::infra::store::{encode, DataStore, Document, Patch, Query};

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn DataStore>,
    blobs: Arc<dyn BlobStore>,
    image_policy: ImagePolicy,
}

impl PostService {
    pub fn new(
        store: Arc<dyn DataStore>,
        blobs: Arc<dyn BlobStore>,
        image_policy: ImagePolicy,
    ) -> Self {
        Self {
            store,
            blobs,
            image_policy,
        }
    }

    pub async fn publish(
        &self,
        session: &Session,
        text: Option<&str>,
        image: Option<ImageUpload>,
    ) -> AppResult<Post> {
        let text = text.map(str::trim).unwrap_or_default();
        let image = image.filter(|upload| !upload.bytes.is_empty());

        if text.is_empty() && image.is_none() {
            return Err(AppError::validation("write something or add a photo"));
        }
        if text.chars().count() > post::MAX_TEXT_CHARS {
            return Err(AppError::validation(format!(
                "post must be at most {} characters",
                post::MAX_TEXT_CHARS
            )));
        }

        // The image goes up first so a failed upload creates no post.
        let image_url = match image {
            Some(upload) => {
                Some(upload_image(self.blobs.as_ref(), &self.image_policy, "posts", upload).await?)
            }
            None => None,
        };

        let new_post = NewPost {
            author_id: session.user_id,
            author_username: session.username.clone(),
            author_profile_image_url: session.profile_image_url.clone(),
            text: text.to_string(),
            image_url,
            like_count: 0,
            liked_by: BTreeSet::new(),
        };
        let patch = Patch::from_fields(encode(&new_post)?).server_timestamp("created_at");
        let post: Post = self.store.add(post::COLLECTION, patch).await?.decode()?;

        info!(post_id = %post.id, author_id = %post.author_id, "post published");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> AppResult<Option<Post>> {
        match self.store.get(post::COLLECTION, &post_id.to_string()).await? {
            Some(document) => Ok(Some(document.decode()?)),
            None => Ok(None),
        }
    }

    /// Like or unlike, in one combined counter + set update on the post document.
    /// The returned state is read back after the write, so it includes likes
    /// from other users that landed in between.
    pub async fn toggle_like(&self, post_id: Uuid, user_id: Uuid) -> AppResult<LikeState> {
        let post = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post not found"))?;

        let patch = if post.liked_by.contains(&user_id) {
            Patch::new()
                .increment("like_count", -1)
                .array_remove("liked_by", json!(user_id.to_string()))
        } else {
            Patch::new()
                .increment("like_count", 1)
                .array_union("liked_by", json!(user_id.to_string()))
        };
        self.store
            .update_fields(post::COLLECTION, &post_id.to_string(), patch)
            .await?;

        let post = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post not found"))?;
        Ok(LikeState {
            liked: post.liked_by.contains(&user_id),
            like_count: post.like_count,
        })
    }

    /// Blank comments are ignored and yield `None`.
    pub async fn add_comment(
        &self,
        post_id: Uuid,
        session: &Session,
        text: &str,
    ) -> AppResult<Option<Comment>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if text.chars().count() > comment::MAX_TEXT_CHARS {
            return Err(AppError::validation(format!(
                "comment must be at most {} characters",
                comment::MAX_TEXT_CHARS
            )));
        }

        let new_comment = NewComment {
            post_id,
            author_id: session.user_id,
            author_username: session.username.clone(),
            author_profile_image_url: session.profile_image_url.clone(),
            text: text.to_string(),
        };
        let patch = Patch::from_fields(encode(&new_comment)?).server_timestamp("created_at");
        let comment: Comment = self.store.add(comment::COLLECTION, patch).await?.decode()?;

        Ok(Some(comment))
    }

    /// One-time read of a post's comments, oldest first.
    pub async fn comments_for(&self, post_id: Uuid) -> AppResult<Vec<Comment>> {
        let documents = self
            .store
            .query(
                comment::COLLECTION,
                &Query::new().eq("post_id", json!(post_id.to_string())),
            )
            .await?;

        let mut comments = decode_all::<Comment>(&documents)?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    /// One-time read of a user's posts, newest first.
    pub async fn user_posts(&self, user_id: Uuid) -> AppResult<Vec<Post>> {
        let documents = self
            .store
            .query(post::COLLECTION, &by_author(user_id))
            .await?;

        let mut posts = decode_all::<Post>(&documents)?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    pub async fn count_posts(&self, user_id: Uuid) -> AppResult<usize> {
        Ok(self
            .store
            .query(post::COLLECTION, &by_author(user_id))
            .await?
            .len())
    }
}

fn by_author(user_id: Uuid) -> Query {
    Query::new().eq("author_id", json!(user_id.to_string()))
}

fn decode_all<T: serde::de::DeserializeOwned>(documents: &[Document]) -> AppResult<Vec<T>> {
    documents
        .iter()
        .map(|document| document.decode().map_err(AppError::from))
        .collect()
}
