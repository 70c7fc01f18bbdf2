use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

pub const COLLECTION: &str = "posts";
pub const MAX_TEXT_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    #[serde(default)]
    pub author_profile_image_url: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Equals `liked_by.len()` after every completed like toggle.
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub liked_by: BTreeSet<Uuid>,
}

/// Fields written on publish; id and timestamp are assigned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub author_id: Uuid,
    pub author_username: String,
    pub author_profile_image_url: Option<String>,
    pub text: String,
    pub image_url: Option<String>,
    pub like_count: i64,
    pub liked_by: BTreeSet<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}
