use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::infra::cache::ChangeFeed;
use crate::infra::store::{DataStore, Document, Fields, Filter, Patch, Query, Subscription};

const SCHEMA: &str = include_str!("../../migrations/0001_documents.sql");

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

/// JSONB document store. Writes publish a change ping per collection so that
/// live queries in any process re-run and push their full result set.
#[derive(Clone)]
pub struct PgDocumentStore {
    db: Db,
    changes: ChangeFeed,
}

impl PgDocumentStore {
    pub fn new(db: Db, changes: ChangeFeed) -> Self {
        Self { db, changes }
    }

    async fn notify(&self, collection: &str) {
        if let Err(err) = self.changes.publish(collection).await {
            warn!(error = ?err, collection, "failed to publish change notification");
        }
    }
}

#[async_trait]
impl DataStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, fields FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|row| {
            let fields: Json<Fields> = row.get("fields");
            Document::new(row.get::<String, _>("id"), fields.0)
        }))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE \
             SET fields = EXCLUDED.fields, updated_at = now()",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&fields))
        .execute(self.db.pool())
        .await?;

        self.notify(collection).await;
        Ok(())
    }

    async fn add(&self, collection: &str, patch: Patch) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let mut fields = Fields::new();
        patch.apply(&mut fields, OffsetDateTime::now_utc())?;

        sqlx::query("INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(&fields))
            .execute(self.db.pool())
            .await?;

        self.notify(collection).await;
        Ok(Document::new(id, fields))
    }

    async fn update_fields(&self, collection: &str, id: &str, patch: Patch) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT fields FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(anyhow!("document {}/{} not found", collection, id));
        };

        let mut fields: Json<Fields> = row.get("fields");
        patch.apply(&mut fields.0, OffsetDateTime::now_utc())?;

        sqlx::query(
            "UPDATE documents SET fields = $3, updated_at = now() \
             WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(&fields)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.notify(collection).await;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, fields FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());

        for filter in &query.filters {
            match filter {
                Filter::Eq(field, value) => {
                    builder.push(" AND fields -> ");
                    builder.push_bind(field.clone());
                    builder.push(" = ");
                    builder.push_bind(Json(value.clone()));
                }
            }
        }

        builder.push(" ORDER BY id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(self.db.pool()).await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let fields: Json<Fields> = row.get("fields");
            documents.push(Document::new(row.get::<String, _>("id"), fields.0));
        }
        Ok(documents)
    }

    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription> {
        // Listen before the first read so no write between the two is missed.
        let mut pings = Box::pin(self.changes.listen(collection).await?);
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
                if pings.next().await.is_none() {
                    let _ = tx.send(Err(anyhow!("change feed for {} closed", collection)));
                    return;
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}
