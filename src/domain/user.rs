use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

pub const COLLECTION: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub birthdate: OffsetDateTime,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Mutated only through follow toggling.
    #[serde(default)]
    pub followers: BTreeSet<Uuid>,
    #[serde(default)]
    pub following: BTreeSet<Uuid>,
}

/// Profile page summary as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user: User,
    pub posts_count: usize,
    pub followers_count: usize,
    pub following_count: usize,
    pub is_own: bool,
    pub is_following: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserHit {
    pub user: User,
    pub posts_count: usize,
    pub followers_count: usize,
}
