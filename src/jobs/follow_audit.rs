use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::social_graph::FollowMismatch;
use crate::domain::user::{self, User};
use crate::infra::store::{DataStore, Query};

/// Scan every user and report one-sided follow entries and self references.
/// Nothing is repaired.
pub async fn scan(store: &dyn DataStore) -> Result<Vec<FollowMismatch>> {
    let documents = store.query(user::COLLECTION, &Query::new()).await?;
    let mut users: HashMap<Uuid, User> = HashMap::with_capacity(documents.len());
    for document in &documents {
        match document.decode::<User>() {
            Ok(user) => {
                users.insert(user.id, user);
            }
            Err(err) => warn!(error = ?err, document_id = %document.id, "skipping malformed user"),
        }
    }

    let mut ids: Vec<&Uuid> = users.keys().collect();
    ids.sort();

    let mut mismatches = Vec::new();
    for id in ids {
        let user = &users[id];
        if user.following.contains(&user.id) || user.followers.contains(&user.id) {
            mismatches.push(FollowMismatch::SelfReference { user: user.id });
        }
        for followee in user.following.iter().filter(|other| **other != user.id) {
            let mirrored = users
                .get(followee)
                .is_some_and(|other| other.followers.contains(&user.id));
            if !mirrored {
                mismatches.push(FollowMismatch::MissingFollower {
                    follower: user.id,
                    followee: *followee,
                });
            }
        }
        for follower in user.followers.iter().filter(|other| **other != user.id) {
            let mirrored = users
                .get(follower)
                .is_some_and(|other| other.following.contains(&user.id));
            if !mirrored {
                mismatches.push(FollowMismatch::MissingFollowing {
                    follower: *follower,
                    followee: user.id,
                });
            }
        }
    }

    Ok(mismatches)
}

pub async fn run(store: Arc<dyn DataStore>, interval: Duration) -> Result<()> {
    info!(interval_seconds = interval.as_secs(), "follow audit started");
    loop {
        match scan(store.as_ref()).await {
            Ok(mismatches) if mismatches.is_empty() => info!("follow audit clean"),
            Ok(mismatches) => {
                for mismatch in &mismatches {
                    warn!(mismatch = ?mismatch, "inconsistent follow relationship");
                }
                warn!(count = mismatches.len(), "follow audit found inconsistencies");
            }
            Err(err) => warn!(error = ?err, "follow audit failed"),
        }
        tokio::time::sleep(interval).await;
    }
}
