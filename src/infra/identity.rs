use anyhow::anyhow;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no account exists for that email")]
    UserNotFound,
    #[error("wrong password")]
    WrongPassword,
    #[error("that email is already registered")]
    EmailInUse,
    #[error("invalid email")]
    InvalidEmail,
    #[error("the password is too weak")]
    WeakPassword,
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

/// Credential sign-in backed by a hosted identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Uuid, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Yields the signed-in user id, or `None` after sign-out.
    fn on_session_change(&self) -> watch::Receiver<Option<Uuid>>;
}

/// Stands in where no identity service is wired, as in the feed and audit
/// workers. Sign-up and sign-in fail; sign-out is a no-op.
pub struct UnconfiguredIdentity {
    current: watch::Sender<Option<Uuid>>,
}

impl Default for UnconfiguredIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl UnconfiguredIdentity {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }
}

#[async_trait]
impl IdentityProvider for UnconfiguredIdentity {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Uuid, IdentityError> {
        Err(anyhow!("identity service is not configured").into())
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Uuid, IdentityError> {
        Err(anyhow!("identity service is not configured").into())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        Ok(())
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Uuid>> {
        self.current.subscribe()
    }
}
