// src/exam/store.rs

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use super::session::McqResponse;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted shape of an exam session ('exam_sessions' table).
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub config_key: String,
    pub part: String,
    pub status: String,
    pub mcq_score: Option<i32>,
    pub mcq_answers: Json<HashMap<String, McqResponse>>,
    pub essay_answers: Json<HashMap<String, String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub revision: i64,
}

/// Row of the attempt history list. No answers are exposed.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub config_key: String,
    pub status: String,
    pub mcq_score: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or updates a session. A record whose revision is not newer than
    /// the stored one is ignored, so out-of-order background saves cannot
    /// roll answers back.
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Most recent sessions for `user_id`, newest first.
    async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exam_sessions
                (id, user_id, config_key, part, status, mcq_score,
                 mcq_answers, essay_answers, started_at, completed_at, revision)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                mcq_score = EXCLUDED.mcq_score,
                mcq_answers = EXCLUDED.mcq_answers,
                essay_answers = EXCLUDED.essay_answers,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                revision = EXCLUDED.revision,
                updated_at = NOW()
            WHERE exam_sessions.revision < EXCLUDED.revision
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.config_key)
        .bind(&record.part)
        .bind(&record.status)
        .bind(record.mcq_score)
        .bind(&record.mcq_answers)
        .bind(&record.essay_answers)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.revision)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let entries = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT id, config_key, status, mcq_score, started_at, completed_at
            FROM exam_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

/// Process-local store. Also used in tests to simulate an unreachable
/// backend, which can be brought back with `set_available`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<Vec<SessionRecord>>,
    unavailable: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn get(&self, id: Uuid) -> Option<SessionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("session store offline".to_string()));
        }
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) if existing.revision < record.revision => *existing = record.clone(),
            Some(_) => {}
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("session store offline".to_string()));
        }
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|r| HistoryEntry {
                id: r.id,
                config_key: r.config_key.clone(),
                status: r.status.clone(),
                mcq_score: r.mcq_score,
                started_at: r.started_at,
                completed_at: r.completed_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: Uuid, user: &str, status: &str, revision: i64) -> SessionRecord {
        SessionRecord {
            id,
            user_id: user.to_string(),
            config_key: "quick-10".to_string(),
            part: "part1".to_string(),
            status: status.to_string(),
            mcq_score: None,
            mcq_answers: Json(HashMap::new()),
            essay_answers: Json(HashMap::new()),
            started_at: None,
            completed_at: None,
            revision,
        }
    }

    #[tokio::test]
    async fn stale_revisions_are_ignored() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();
        store.save(&record(id, "1", "MCQ_IN_PROGRESS", 3)).await.unwrap();
        store.save(&record(id, "1", "COMPLETED", 5)).await.unwrap();
        store.save(&record(id, "1", "MCQ_IN_PROGRESS", 4)).await.unwrap();
        assert_eq!(store.get(id).unwrap().status, "COMPLETED");
    }

    #[tokio::test]
    async fn history_is_per_user_newest_first() {
        let store = MemorySessionStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.save(&record(first, "1", "COMPLETED", 1)).await.unwrap();
        store.save(&record(Uuid::new_v4(), "2", "COMPLETED", 1)).await.unwrap();
        store.save(&record(second, "1", "ESSAY_LOCKED", 1)).await.unwrap();

        let history = store.history("1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second);
        assert_eq!(history[1].id, first);
        assert_eq!(store.history("1", 1).await.unwrap().len(), 1);
    }
}
