use uuid::Uuid;

use crate::domain::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Following,
    NotFollowing,
}

/// A relationship exists only when both mirrored entries are present.
pub fn relationship_exists(follower: &User, followee: &User) -> bool {
    follower.following.contains(&followee.id) && followee.followers.contains(&follower.id)
}

/// One-sided or self-referencing follow entry found by a consistency scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowMismatch {
    /// `follower.following` lists `followee`, but `followee.followers` lacks `follower`.
    MissingFollower { follower: Uuid, followee: Uuid },
    /// `followee.followers` lists `follower`, but `follower.following` lacks `followee`.
    MissingFollowing { follower: Uuid, followee: Uuid },
    SelfReference { user: Uuid },
}
