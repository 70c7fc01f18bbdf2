//! View models: each view renders a plain state value and handles typed events,
//! so the UI layer never reaches into the core by string keys.

pub mod feed;
pub mod format;
pub mod profile;

use async_trait::async_trait;
use std::time::Duration;
use tracing::error;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient message shown to the user after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub ttl: Duration,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            ttl: Duration::from_secs(3),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            ttl: Duration::from_secs(4),
        }
    }

    /// Log a failed operation and turn it into an error notice. Remote failures
    /// show `context` instead of backend details.
    pub fn from_error(context: &str, err: &AppError) -> Self {
        error!(error = ?err, "{}", context);
        match err {
            AppError::Remote(_) => Self::error(context),
            other => Self::error(other.to_string()),
        }
    }
}

#[async_trait]
pub trait View: Send {
    type State;
    type Event: Send;

    fn render(&self) -> Self::State;

    /// Apply one user event. Failures never escape; they come back as notices.
    async fn handle(&mut self, event: Self::Event) -> Option<Notice>;
}
