use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

use crate::app::feed::FeedSynchronizer;
use crate::app::media::ImageUpload;
use crate::app::session::{Session, SharedSession};
use crate::domain::comment::Comment;
use crate::domain::post::Post;
use crate::domain::social_graph::FollowState;
use crate::error::AppResult;
use crate::views::format::{initials, time_ago};
use crate::views::{Notice, View};
use crate::AppState;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentLine {
    pub comment: Comment,
    pub author_initials: String,
    pub posted_ago: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostCard {
    pub post: Post,
    pub author_initials: String,
    pub posted_ago: String,
    pub liked_by_me: bool,
    pub is_own: bool,
    pub following_author: bool,
    pub comments: Vec<CommentLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedState {
    Loading,
    Empty,
    Failed(String),
    Posts(Vec<PostCard>),
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Publish {
        text: Option<String>,
        image: Option<ImageUpload>,
    },
    ToggleLike(Uuid),
    ToggleFollow(Uuid),
    AddComment {
        post_id: Uuid,
        text: String,
    },
}

/// Pure render step: posts in the given order, each with its comment snapshot.
pub fn build_cards(
    posts: &[Post],
    comments: &HashMap<Uuid, Vec<Comment>>,
    session: &Session,
    now: OffsetDateTime,
) -> Vec<PostCard> {
    posts
        .iter()
        .map(|post| PostCard {
            author_initials: initials(&post.author_username),
            posted_ago: time_ago(post.created_at, now),
            liked_by_me: post.liked_by.contains(&session.user_id),
            is_own: post.author_id == session.user_id,
            following_author: session.is_following(post.author_id),
            comments: comments
                .get(&post.id)
                .map(|comments| {
                    comments
                        .iter()
                        .map(|comment| CommentLine {
                            author_initials: initials(&comment.author_username),
                            posted_ago: time_ago(comment.created_at, now),
                            comment: comment.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            post: post.clone(),
        })
        .collect()
}

#[derive(Debug, Clone)]
enum FeedUpdate {
    Pending,
    Posts(Vec<Post>),
    Failed,
}

pub struct FeedView {
    app: AppState,
    session: SharedSession,
    sync: FeedSynchronizer,
    updates: Option<watch::Receiver<FeedUpdate>>,
    state: FeedState,
}

impl FeedView {
    pub fn new(app: AppState, session: SharedSession) -> Self {
        let sync = app.feed();
        Self {
            app,
            session,
            sync,
            updates: None,
            state: FeedState::Loading,
        }
    }

    /// Start (or restart) the live feed.
    pub async fn open(&mut self) -> AppResult<()> {
        let (tx, rx) = watch::channel(FeedUpdate::Pending);
        let tx = Arc::new(tx);
        let on_error_tx = tx.clone();

        self.sync
            .subscribe(
                self.app.feed_limit,
                move |posts| {
                    tx.send_replace(FeedUpdate::Posts(posts));
                },
                move |_| {
                    on_error_tx.send_replace(FeedUpdate::Failed);
                },
            )
            .await?;

        self.updates = Some(rx);
        self.state = FeedState::Loading;
        Ok(())
    }

    pub fn close(&mut self) {
        self.sync.unsubscribe();
        self.updates = None;
    }

    /// Wait for the next pushed result set and rebuild the whole list from it.
    /// Comments are fetched once per post at this point and not kept live.
    pub async fn next_render(&mut self) -> AppResult<FeedState> {
        let Some(updates) = self.updates.as_mut() else {
            return Ok(self.state.clone());
        };
        if updates.changed().await.is_err() {
            return Ok(self.state.clone());
        }
        let update = updates.borrow_and_update().clone();

        self.state = match update {
            FeedUpdate::Pending => FeedState::Loading,
            FeedUpdate::Failed => FeedState::Failed("failed to load posts".to_string()),
            FeedUpdate::Posts(posts) if posts.is_empty() => FeedState::Empty,
            FeedUpdate::Posts(posts) => {
                let service = self.app.posts();
                let snapshots =
                    futures::future::join_all(posts.iter().map(|post| service.comments_for(post.id)))
                        .await;
                let mut comments = HashMap::with_capacity(posts.len());
                for (post, snapshot) in posts.iter().zip(snapshots) {
                    comments.insert(post.id, snapshot?);
                }

                let session = self.session.lock().await;
                FeedState::Posts(build_cards(
                    &posts,
                    &comments,
                    &session,
                    OffsetDateTime::now_utc(),
                ))
            }
        };
        Ok(self.state.clone())
    }

    fn refresh_follow_flags(&mut self, session: &Session) {
        if let FeedState::Posts(cards) = &mut self.state {
            for card in cards {
                card.following_author = session.is_following(card.post.author_id);
            }
        }
    }
}

#[async_trait]
impl View for FeedView {
    type State = FeedState;
    type Event = FeedEvent;

    fn render(&self) -> FeedState {
        self.state.clone()
    }

    async fn handle(&mut self, event: FeedEvent) -> Option<Notice> {
        match event {
            FeedEvent::Publish { text, image } => {
                let session = self.session.lock().await.clone();
                match self.app.posts().publish(&session, text.as_deref(), image).await {
                    Ok(_) => Some(Notice::success("post published")),
                    Err(err) => Some(Notice::from_error("failed to publish post", &err)),
                }
            }
            FeedEvent::ToggleLike(post_id) => {
                let user_id = self.session.lock().await.user_id;
                match self.app.posts().toggle_like(post_id, user_id).await {
                    Ok(_) => None,
                    Err(err) => Some(Notice::from_error("failed to like post", &err)),
                }
            }
            FeedEvent::ToggleFollow(target_id) => {
                let session = self.session.clone();
                let mut session = session.lock().await;
                match self.app.social().toggle_follow(&mut session, target_id).await {
                    Ok(state) => {
                        self.refresh_follow_flags(&session);
                        Some(follow_notice(state))
                    }
                    Err(err) => Some(Notice::from_error("failed to update follow", &err)),
                }
            }
            FeedEvent::AddComment { post_id, text } => {
                let session = self.session.lock().await.clone();
                match self.app.posts().add_comment(post_id, &session, &text).await {
                    Ok(_) => None,
                    Err(err) => Some(Notice::from_error("failed to add comment", &err)),
                }
            }
        }
    }
}

pub(crate) fn follow_notice(state: FollowState) -> Notice {
    match state {
        FollowState::Following => Notice::success("you now follow this user"),
        FollowState::NotFollowing => Notice::success("you unfollowed this user"),
    }
}
