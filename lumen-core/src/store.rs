//! Chat persistence for Lumen.
//!
//! `ChatStore` abstracts the append-only exchange log so the HTTP layer can
//! be exercised against a test double. `PgChatStore` is the production
//! implementation over a shared `PgPool`, constructed once at startup and
//! injected into the handlers.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ChatRecord;

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append-only store of chat exchanges. Records are write-once: there is no
/// update or delete, and two identical prompts produce two distinct rows.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist one completed round trip and return the stored record.
    async fn create(&self, prompt: &str, response: &str) -> Result<ChatRecord, StoreError>;

    /// Liveness probe — a no-op round trip to the backing database.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed store (table `chat_messages`, see schema.sql).
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create(&self, prompt: &str, response: &str) -> Result<ChatRecord, StoreError> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "INSERT INTO chat_messages (id, prompt, response, created_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, prompt, response, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(prompt)
        .bind(response)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
