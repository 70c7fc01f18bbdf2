use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::user::User;

/// The signed-in user's context. Created on sign-in, dropped on sign-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub profile_image_url: Option<String>,
    /// Cached copy; follow toggling never decides from it.
    pub following: BTreeSet<Uuid>,
    pub followers: BTreeSet<Uuid>,
}

/// A session shared by the views of one signed-in client.
pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            profile_image_url: user.profile_image_url.clone(),
            following: user.following.clone(),
            followers: user.followers.clone(),
        }
    }

    pub fn is_following(&self, user_id: Uuid) -> bool {
        self.following.contains(&user_id)
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }
}
