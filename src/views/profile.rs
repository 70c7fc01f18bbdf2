use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::media::ImageUpload;
use crate::app::session::SharedSession;
use crate::domain::user::{Profile, User};
use crate::error::AppResult;
use crate::views::feed::{build_cards, follow_notice, PostCard};
use crate::views::format::{format_count, initials};
use crate::views::{Notice, View};
use crate::AppState;

#[derive(Debug, Clone, PartialEq)]
pub struct UserLine {
    pub id: Uuid,
    pub username: String,
    pub initials: String,
    pub profile_image_url: Option<String>,
}

impl From<&User> for UserLine {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            initials: initials(&user.username),
            profile_image_url: user.profile_image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserList {
    pub title: String,
    pub users: Vec<UserLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileState {
    pub user_id: Uuid,
    pub username: String,
    pub initials: String,
    pub profile_image_url: Option<String>,
    pub bio: String,
    pub posts_count: String,
    pub followers_count: String,
    pub following_count: String,
    pub is_own: bool,
    /// `None` on the viewer's own profile.
    pub follow_label: Option<&'static str>,
    pub posts: Vec<PostCard>,
    pub list: Option<UserList>,
}

#[derive(Debug, Clone)]
pub enum ProfileEvent {
    ToggleFollow(Uuid),
    UploadPhoto(ImageUpload),
    UpdateBio(String),
    ShowFollowers,
    ShowFollowing,
    CloseList,
}

pub struct ProfileView {
    app: AppState,
    session: SharedSession,
    user_id: Uuid,
    profile: Profile,
    posts: Vec<PostCard>,
    list: Option<UserList>,
}

impl ProfileView {
    pub async fn open(app: AppState, session: SharedSession, user_id: Uuid) -> AppResult<Self> {
        let (profile, posts) = load(&app, &session, user_id).await?;
        Ok(Self {
            app,
            session,
            user_id,
            profile,
            posts,
            list: None,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub async fn reload(&mut self) -> AppResult<()> {
        let (profile, posts) = load(&self.app, &self.session, self.user_id).await?;
        self.profile = profile;
        self.posts = posts;
        Ok(())
    }
}

async fn load(
    app: &AppState,
    session: &SharedSession,
    user_id: Uuid,
) -> AppResult<(Profile, Vec<PostCard>)> {
    let mut session = session.lock().await;
    let profile = app.users().profile(&mut session, user_id).await?;

    let service = app.posts();
    let posts = service.user_posts(user_id).await?;
    let mut comments = HashMap::with_capacity(posts.len());
    for post in &posts {
        comments.insert(post.id, service.comments_for(post.id).await?);
    }

    let cards = build_cards(&posts, &comments, &session, OffsetDateTime::now_utc());
    Ok((profile, cards))
}

#[async_trait]
impl View for ProfileView {
    type State = ProfileState;
    type Event = ProfileEvent;

    fn render(&self) -> ProfileState {
        let user = &self.profile.user;
        ProfileState {
            user_id: user.id,
            username: user.username.clone(),
            initials: initials(&user.username),
            profile_image_url: user.profile_image_url.clone(),
            bio: user.bio.clone(),
            posts_count: format_count(self.profile.posts_count),
            followers_count: format_count(self.profile.followers_count),
            following_count: format_count(self.profile.following_count),
            is_own: self.profile.is_own,
            follow_label: match (self.profile.is_own, self.profile.is_following) {
                (true, _) => None,
                (false, true) => Some("Following"),
                (false, false) => Some("Follow"),
            },
            posts: self.posts.clone(),
            list: self.list.clone(),
        }
    }

    async fn handle(&mut self, event: ProfileEvent) -> Option<Notice> {
        match event {
            ProfileEvent::ToggleFollow(target_id) => {
                let state = {
                    let mut session = self.session.lock().await;
                    self.app.social().toggle_follow(&mut session, target_id).await
                };
                match state {
                    Ok(state) => {
                        // Counts on the viewed profile change with the follow.
                        if target_id == self.user_id {
                            if let Err(err) = self.reload().await {
                                return Some(Notice::from_error("failed to load profile", &err));
                            }
                        }
                        Some(follow_notice(state))
                    }
                    Err(err) => Some(Notice::from_error("failed to update follow", &err)),
                }
            }
            ProfileEvent::UploadPhoto(upload) => {
                if !self.profile.is_own {
                    return Some(Notice::error("you can only change your own photo"));
                }
                let updated = {
                    let mut session = self.session.lock().await;
                    self.app.users().update_profile_photo(&mut session, upload).await
                };
                match updated {
                    Ok(_) => match self.reload().await {
                        Ok(()) => Some(Notice::success("profile photo updated")),
                        Err(err) => Some(Notice::from_error("failed to load profile", &err)),
                    },
                    Err(err) => Some(Notice::from_error("failed to upload photo", &err)),
                }
            }
            ProfileEvent::UpdateBio(bio) => {
                if !self.profile.is_own {
                    return Some(Notice::error("you can only edit your own profile"));
                }
                let session = self.session.lock().await.clone();
                match self.app.users().update_bio(&session, &bio).await {
                    Ok(()) => {
                        self.profile.user.bio = bio.trim().to_string();
                        Some(Notice::success("profile updated"))
                    }
                    Err(err) => Some(Notice::from_error("failed to update profile", &err)),
                }
            }
            ProfileEvent::ShowFollowers => {
                match self.app.social().followers(self.user_id).await {
                    Ok(users) => {
                        self.list = Some(UserList {
                            title: "Followers".to_string(),
                            users: users.iter().map(UserLine::from).collect(),
                        });
                        None
                    }
                    Err(err) => Some(Notice::from_error("failed to load followers", &err)),
                }
            }
            ProfileEvent::ShowFollowing => {
                match self.app.social().following(self.user_id).await {
                    Ok(users) => {
                        self.list = Some(UserList {
                            title: "Following".to_string(),
                            users: users.iter().map(UserLine::from).collect(),
                        });
                        None
                    }
                    Err(err) => Some(Notice::from_error("failed to load following", &err)),
                }
            }
            ProfileEvent::CloseList => {
                self.list = None;
                None
            }
        }
    }
}
