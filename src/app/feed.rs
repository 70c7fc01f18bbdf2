use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::warn;

use crate::domain::post::{self, Post};
use crate::error::{AppError, AppResult};
use crate::infra::store::{DataStore, Document, Query};

pub const DEFAULT_FEED_LIMIT: usize = 50;

type UpdateFn = Box<dyn FnMut(Vec<Post>) + Send>;
type ErrorFn = Box<dyn FnOnce(AppError) + Send>;

struct Callbacks {
    on_update: UpdateFn,
    on_error: Option<ErrorFn>,
}

struct FeedSlot {
    callbacks: Arc<Mutex<Option<Callbacks>>>,
    abort: AbortHandle,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a live feed subscription.
#[derive(Clone)]
pub struct Unsubscribe {
    slot: Arc<FeedSlot>,
}

impl Unsubscribe {
    /// Stops the subscription. Waits for a callback that is already running, and
    /// guarantees no callback runs after this returns. Must not be called from
    /// inside one of this subscription's own callbacks.
    pub fn cancel(&self) {
        lock(&self.slot.callbacks).take();
        self.slot.abort.abort();
    }

    pub fn is_active(&self) -> bool {
        lock(&self.slot.callbacks).is_some()
    }
}

/// Keeps at most one live subscription to the most recent posts.
pub struct FeedSynchronizer {
    store: Arc<dyn DataStore>,
    active: Option<Unsubscribe>,
}

impl FeedSynchronizer {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            active: None,
        }
    }

    /// Subscribe to the newest `limit` posts. Every change delivers the complete,
    /// ordered list to `on_update`. A failure goes to `on_error` once and ends
    /// the subscription; nothing is retried. A previous subscription made through
    /// this synchronizer is cancelled first.
    pub async fn subscribe<U, E>(
        &mut self,
        limit: usize,
        on_update: U,
        on_error: E,
    ) -> AppResult<Unsubscribe>
    where
        U: FnMut(Vec<Post>) + Send + 'static,
        E: FnOnce(AppError) + Send + 'static,
    {
        self.unsubscribe();

        let mut subscription = self
            .store
            .subscribe(post::COLLECTION, Query::new().limit(limit))
            .await?;

        let callbacks = Arc::new(Mutex::new(Some(Callbacks {
            on_update: Box::new(on_update),
            on_error: Some(Box::new(on_error)),
        })));

        let task = tokio::spawn({
            let callbacks = callbacks.clone();
            async move {
                while let Some(snapshot) = subscription.next().await {
                    let mut guard = lock(&callbacks);
                    let Some(active) = guard.as_mut() else {
                        return;
                    };
                    match snapshot {
                        Ok(documents) => (active.on_update)(order_feed(&documents)),
                        Err(err) => {
                            warn!(error = ?err, "feed subscription failed");
                            if let Some(on_error) = active.on_error.take() {
                                on_error(AppError::Remote(err));
                            }
                            guard.take();
                            return;
                        }
                    }
                }
            }
        });

        let handle = Unsubscribe {
            slot: Arc::new(FeedSlot {
                callbacks,
                abort: task.abort_handle(),
            }),
        };
        self.active = Some(handle.clone());
        Ok(handle)
    }

    pub fn unsubscribe(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
    }
}

/// Decode a full result set and order it newest first. Equal timestamps keep
/// their arrival order. Documents that do not decode as posts are skipped.
pub fn order_feed(documents: &[Document]) -> Vec<Post> {
    let mut posts: Vec<Post> = documents
        .iter()
        .filter_map(|document| match document.decode::<Post>() {
            Ok(post) => Some(post),
            Err(err) => {
                warn!(error = ?err, document_id = %document.id, "skipping malformed post");
                None
            }
        })
        .collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}
