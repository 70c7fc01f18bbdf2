use anyhow::anyhow;
use desman::config::AppConfig;
use desman::infra::identity::UnconfiguredIdentity;
use desman::infra::storage::ObjectStorage;
use desman::infra::{cache::ChangeFeed, db::Db, db::PgDocumentStore, store::DataStore};
use desman::jobs::follow_audit;
use desman::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    db.migrate().await?;
    let changes = ChangeFeed::connect(&config.redis_url).await?;
    let store: Arc<dyn DataStore> = Arc::new(PgDocumentStore::new(db, changes));
    let storage = ObjectStorage::new(&config).await?;
    tracing::info!(bucket = %storage.bucket(), "object storage configured");

    let state = AppState::new(
        store.clone(),
        Arc::new(storage),
        Arc::new(UnconfiguredIdentity::new()),
    )
    .with_config(&config);

    match config.app_mode.as_str() {
        "feed" => {
            let mut feed = state.feed();
            let handle = feed
                .subscribe(
                    state.feed_limit,
                    |posts| match posts.first() {
                        Some(newest) => tracing::info!(
                            posts = posts.len(),
                            newest_id = %newest.id,
                            newest_author = %newest.author_username,
                            "feed updated"
                        ),
                        None => tracing::info!("feed is empty"),
                    },
                    |err| tracing::error!(error = ?err, "feed subscription ended"),
                )
                .await?;
            tracing::info!(limit = state.feed_limit, "watching feed");
            shutdown_signal().await;
            handle.cancel();
        }
        "audit" => {
            let interval = Duration::from_secs(config.audit_interval_seconds);
            tokio::select! {
                result = follow_audit::run(store, interval) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
