use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::session::Session;
use crate::app::users::fetch_user;
use crate::domain::user::{self, User};
use crate::error::{AppError, AppResult};
use crate::infra::identity::IdentityProvider;
use crate::infra::store::{encode, DataStore, Query};

pub const MIN_USERNAME_CHARS: usize = 3;
pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MIN_AGE_YEARS: i32 = 14;

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub birthdate: Date,
    pub password: String,
    pub accept_terms: bool,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn DataStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl AuthService {
    pub fn new(store: Arc<dyn DataStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Create the account and its user document. `today` decides the age check.
    pub async fn register(&self, registration: Registration, today: Date) -> AppResult<Session> {
        let username = registration.username.trim();
        let email = registration.email.trim();

        if username.is_empty() || email.is_empty() || registration.password.is_empty() {
            return Err(AppError::validation("please fill in all fields"));
        }
        if !registration.accept_terms {
            return Err(AppError::validation(
                "you must accept the terms and conditions",
            ));
        }
        if username.chars().count() < MIN_USERNAME_CHARS {
            return Err(AppError::validation(format!(
                "username must be at least {} characters",
                MIN_USERNAME_CHARS
            )));
        }
        if registration.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }
        if age_on(registration.birthdate, today) < MIN_AGE_YEARS {
            return Err(AppError::validation(format!(
                "you must be at least {} years old",
                MIN_AGE_YEARS
            )));
        }

        let taken = self
            .store
            .query(
                user::COLLECTION,
                &Query::new().eq("username", json!(username)).limit(1),
            )
            .await?;
        if !taken.is_empty() {
            return Err(AppError::validation("username is already taken"));
        }

        let user_id = self.identity.sign_up(email, &registration.password).await?;
        let user = User {
            id: user_id,
            username: username.to_string(),
            email: email.to_string(),
            birthdate: registration.birthdate.midnight().assume_utc(),
            profile_image_url: None,
            bio: String::new(),
            created_at: OffsetDateTime::now_utc(),
            followers: BTreeSet::new(),
            following: BTreeSet::new(),
        };
        self.store
            .set(user::COLLECTION, &user_id.to_string(), encode(&user)?)
            .await?;

        info!(user_id = %user_id, username = %user.username, "user registered");
        Ok(Session::from_user(&user))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation("please fill in all fields"));
        }
        let user_id = self.identity.sign_in(email.trim(), password).await?;
        self.load_session(user_id).await
    }

    /// Ends the identity session; the session context is consumed.
    pub async fn sign_out(&self, session: Session) -> AppResult<()> {
        self.identity.sign_out().await?;
        info!(user_id = %session.user_id, "signed out");
        Ok(())
    }

    /// Translate a session-change notification into a session context.
    pub async fn session_for(&self, change: Option<Uuid>) -> AppResult<Option<Session>> {
        match change {
            Some(user_id) => Ok(Some(self.load_session(user_id).await?)),
            None => Ok(None),
        }
    }

    async fn load_session(&self, user_id: Uuid) -> AppResult<Session> {
        match fetch_user(self.store.as_ref(), user_id).await? {
            Some(user) => Ok(Session::from_user(&user)),
            None => {
                // An identity without a profile document cannot use the app.
                warn!(user_id = %user_id, "signed-in identity has no user document");
                self.identity.sign_out().await?;
                Err(AppError::not_found("user profile not found"))
            }
        }
    }
}

/// Whole years between `birthdate` and `today`.
pub fn age_on(birthdate: Date, today: Date) -> i32 {
    let mut age = today.year() - birthdate.year();
    if (today.month() as u8, today.day()) < (birthdate.month() as u8, birthdate.day()) {
        age -= 1;
    }
    age
}
