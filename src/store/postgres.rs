use super::{
    ChangeEvent, DocumentStore, Order, StoreError, StoreResult, StoredDocument, WriteBatch,
    WriteOp, CANDIDATES,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANGE_CHANNEL: &str = "document_changes";

/// Document store over a single `documents` table with JSONB bodies.
///
/// Each batch runs in one transaction and ends with a `pg_notify` per touched
/// collection, so listeners in every process see the change after commit.
pub struct PgDocumentStore {
    pool: PgPool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { pool, changes }
    }

    /// Forwards `document_changes` notifications into the local broadcast
    /// channel, reconnecting after a delay whenever the listener drops.
    pub fn spawn_listener(&self, reconnect_delay: Duration) -> tokio::task::JoinHandle<()> {
        let pool = self.pool.clone();
        let changes = self.changes.clone();
        tokio::spawn(async move {
            loop {
                match listen(&pool, &changes).await {
                    Ok(()) => tracing::warn!("document change listener stopped, reconnecting"),
                    Err(e) => tracing::error!(error = ?e, "document change listener failed"),
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        })
    }
}

async fn listen(pool: &PgPool, changes: &broadcast::Sender<ChangeEvent>) -> StoreResult<()> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    tracing::info!("Listening for document changes on {}", CHANGE_CHANNEL);
    // anything committed while we were disconnected was not delivered
    forward(changes, None);
    loop {
        let notification = listener.try_recv().await?;
        if notification.is_none() {
            tracing::warn!("document change listener lost its connection, resyncing");
        }
        forward(changes, notification.as_ref().map(|n| n.payload()));
    }
}

/// Publishes one listener result. `None` means notifications may have been
/// missed, so readers of the candidates collection are told to re-read.
fn forward(changes: &broadcast::Sender<ChangeEvent>, payload: Option<&str>) {
    let _ = changes.send(ChangeEvent {
        collection: payload.unwrap_or(CANDIDATES).to_string(),
    });
}

fn row_to_document(row: PgRow) -> StoreResult<StoredDocument> {
    let data: JsonValue = row.try_get("data")?;
    let data = match data {
        JsonValue::Object(map) => map,
        other => {
            return Err(StoreError::Malformed(serde::de::Error::custom(format!(
                "expected object body, found {other}"
            ))))
        }
    };
    Ok(StoredDocument {
        collection: row.try_get("collection")?,
        id: row.try_get("id")?,
        data,
        version: row.try_get("version")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn order_clause(order: Order) -> &'static str {
    match order {
        Order::CreatedAsc => "ORDER BY created_at ASC, id ASC",
        Order::CreatedDesc => "ORDER BY created_at DESC, id DESC",
    }
}

async fn apply(tx: &mut Transaction<'_, Postgres>, op: WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Create {
            collection,
            id,
            data,
        } => {
            let inserted = sqlx::query(
                r#"
                INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(&collection)
            .bind(&id)
            .bind(JsonValue::Object(data))
            .fetch_optional(&mut **tx)
            .await?;
            if inserted.is_none() {
                return Err(StoreError::AlreadyExists { collection, id });
            }
        }
        WriteOp::Set {
            collection,
            id,
            data,
        } => {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO UPDATE
                SET data = EXCLUDED.data, version = documents.version + 1, updated_at = NOW()
                "#,
            )
            .bind(&collection)
            .bind(&id)
            .bind(JsonValue::Object(data))
            .execute(&mut **tx)
            .await?;
        }
        WriteOp::Merge {
            collection,
            id,
            data,
        } => {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO UPDATE
                SET data = documents.data || EXCLUDED.data, version = documents.version + 1, updated_at = NOW()
                "#,
            )
            .bind(&collection)
            .bind(&id)
            .bind(JsonValue::Object(data))
            .execute(&mut **tx)
            .await?;
        }
        WriteOp::Update {
            collection,
            id,
            data,
            expected_version,
        } => {
            let updated = sqlx::query(
                r#"
                UPDATE documents
                SET data = data || $3, version = version + 1, updated_at = NOW()
                WHERE collection = $1 AND id = $2 AND ($4::BIGINT IS NULL OR version = $4)
                RETURNING version
                "#,
            )
            .bind(&collection)
            .bind(&id)
            .bind(JsonValue::Object(data))
            .bind(expected_version)
            .fetch_optional(&mut **tx)
            .await?;
            if updated.is_none() {
                let current: Option<i64> = sqlx::query_scalar(
                    "SELECT version FROM documents WHERE collection = $1 AND id = $2",
                )
                .bind(&collection)
                .bind(&id)
                .fetch_optional(&mut **tx)
                .await?;
                return Err(match (current, expected_version) {
                    (Some(actual), Some(expected)) => StoreError::Conflict {
                        collection,
                        id,
                        expected,
                        actual,
                    },
                    _ => StoreError::NotFound { collection, id },
                });
            }
        }
        WriteOp::Append { collection, data } => {
            sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
                .bind(&collection)
                .bind(Uuid::new_v4().to_string())
                .bind(JsonValue::Object(data))
                .execute(&mut **tx)
                .await?;
        }
        WriteOp::Delete { collection, id } => {
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(&collection)
                .bind(&id)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        let row = sqlx::query(
            r#"
            SELECT collection, id, data, version, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_document).transpose()
    }

    async fn list(&self, collection: &str, order: Order) -> StoreResult<Vec<StoredDocument>> {
        let sql = format!(
            "SELECT collection, id, data, version, created_at, updated_at FROM documents WHERE collection = $1 {}",
            order_clause(order)
        );
        let rows = sqlx::query(&sql)
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_document).collect()
    }

    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
        order: Order,
    ) -> StoreResult<Vec<StoredDocument>> {
        let mut filter = Map::new();
        filter.insert(field.to_string(), value.clone());
        let sql = format!(
            "SELECT collection, id, data, version, created_at, updated_at FROM documents WHERE collection = $1 AND data @> $2 {}",
            order_clause(order)
        );
        let rows = sqlx::query(&sql)
            .bind(collection)
            .bind(JsonValue::Object(filter))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_document).collect()
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let collections = batch.collections();
        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            apply(&mut tx, op).await?;
        }
        for collection in &collections {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(collection)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
