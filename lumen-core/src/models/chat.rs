use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted prompt/response exchange. Write-once: every row corresponds
/// to exactly one completed provider round trip, and rows are never updated
/// or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: Uuid,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}
