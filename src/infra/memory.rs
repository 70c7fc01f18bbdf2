//! In-process collaborators for tests and local development.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::infra::identity::{IdentityError, IdentityProvider};
use crate::infra::storage::BlobStore;
use crate::infra::store::{DataStore, Document, Fields, Patch, Query, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    failing_updates: HashSet<(String, String)>,
    failing_queries: HashSet<String>,
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            changes,
        }
    }

    /// The next `update_fields` on this document fails without applying anything.
    pub fn fail_next_update(&self, collection: &str, id: &str) {
        lock(&self.state)
            .failing_updates
            .insert((collection.to_string(), id.to_string()));
    }

    /// Every read of `collection` fails from now on, including live re-queries.
    pub fn fail_queries(&self, collection: &str) {
        lock(&self.state)
            .failing_queries
            .insert(collection.to_string());
    }

    fn changed(&self, collection: &str) {
        // No receivers simply means nobody is subscribed.
        let _ = self.changes.send(collection.to_string());
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let state = lock(&self.state);
        if state.failing_queries.contains(collection) {
            return Err(anyhow!("read of {} failed", collection));
        }
        Ok(state
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        lock(&self.state)
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.changed(collection);
        Ok(())
    }

    async fn add(&self, collection: &str, patch: Patch) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let mut fields = Fields::new();
        patch.apply(&mut fields, OffsetDateTime::now_utc())?;
        lock(&self.state)
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields.clone());
        self.changed(collection);
        Ok(Document::new(id, fields))
    }

    async fn update_fields(&self, collection: &str, id: &str, patch: Patch) -> Result<()> {
        {
            let mut state = lock(&self.state);
            let key = (collection.to_string(), id.to_string());
            if state.failing_updates.remove(&key) {
                return Err(anyhow!("update of {}/{} failed", collection, id));
            }
            let fields = state
                .collections
                .get_mut(collection)
                .and_then(|documents| documents.get_mut(id))
                .ok_or_else(|| anyhow!("document {}/{} not found", collection, id))?;

            // Apply to a copy so a failing op leaves the document untouched.
            let mut updated = fields.clone();
            patch.apply(&mut updated, OffsetDateTime::now_utc())?;
            *fields = updated;
        }
        self.changed(collection);
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let state = lock(&self.state);
        if state.failing_queries.contains(collection) {
            return Err(anyhow!("query of {} failed", collection));
        }
        let Some(documents) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = documents
            .iter()
            .filter(|(_, fields)| query.matches(fields))
            .map(|(id, fields)| Document::new(id.as_str(), fields.clone()));
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let collection = collection.to_string();

        let task = tokio::spawn(async move {
            loop {
                let snapshot = store.query(&collection, &query).await;
                let failed = snapshot.is_err();
                if tx.send(snapshot).is_err() || failed {
                    return;
                }
                loop {
                    match changes.recv().await {
                        Ok(changed) if changed == collection => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => return,
                    }
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, (Bytes, String)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and content type for a path.
    pub fn get(&self, path: &str) -> Option<(Bytes, String)> {
        lock(&self.blobs).get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.blobs).keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        lock(&self.blobs).insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://blobs/{}", path))
    }
}

struct Account {
    user_id: Uuid,
    password_digest: String,
}

/// Email/password accounts held in memory, one signed-in user at a time.
pub struct MemoryIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<Uuid>>,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current,
        }
    }

    pub fn current_user(&self) -> Option<Uuid> {
        *self.current.borrow()
    }
}

const MIN_PROVIDER_PASSWORD_LEN: usize = 6;

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PROVIDER_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }

        let user_id = {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(&email) {
                return Err(IdentityError::EmailInUse);
            }
            let user_id = Uuid::new_v4();
            accounts.insert(
                email,
                Account {
                    user_id,
                    password_digest: digest(password),
                },
            );
            user_id
        };

        self.current.send_replace(Some(user_id));
        Ok(user_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        let email = normalize_email(email)?;
        let user_id = {
            let accounts = lock(&self.accounts);
            let account = accounts.get(&email).ok_or(IdentityError::UserNotFound)?;
            if account.password_digest != digest(password) {
                return Err(IdentityError::WrongPassword);
            }
            account.user_id
        };

        self.current.send_replace(Some(user_id));
        Ok(user_id)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Uuid>> {
        self.current.subscribe()
    }
}

fn normalize_email(email: &str) -> Result<String, IdentityError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(IdentityError::InvalidEmail),
    }
}

fn digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
