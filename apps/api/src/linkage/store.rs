//! Thread storage — processing threads, their step records, and cross-entity
//! links.
//!
//! Step records are append-only INSERTs and deliberately NOT idempotent:
//! each append is a distinct event, and the producer calls it at-most-once
//! per real event. Links are a deduplicating set (`ON CONFLICT DO NOTHING`),
//! so re-applying the same link never creates duplicates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use anyhow::Result;

/// A processing thread: addressable by primary id or by secondary token.
#[derive(Debug, Clone, FromRow)]
pub struct ThreadRecord {
    pub id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// One processing-step record on a thread.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub label: String,
    pub detail: serde_json::Value,
}

/// Step row as read back for the thread-fetch endpoint.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StepRow {
    pub label: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Persistence contract the linkage queue drains against.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create_thread(&self, token: &str) -> Result<ThreadRecord>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThreadRecord>>;
    async fn find_by_token(&self, token: &str) -> Result<Option<ThreadRecord>>;
    /// Append-only; duplicate delivery duplicates the record.
    async fn append_step(&self, thread_id: Uuid, step: &StepRecord) -> Result<()>;
    /// Set-union; applying the same link twice is a no-op.
    async fn add_link(&self, thread_id: Uuid, linked_id: &str) -> Result<()>;
    async fn list_steps(&self, thread_id: Uuid) -> Result<Vec<StepRow>>;
}

/// PostgreSQL-backed thread store.
pub struct PgThreadStore {
    db: PgPool,
}

impl PgThreadStore {
    pub fn new(db: PgPool) -> Self {
        PgThreadStore { db }
    }
}

#[async_trait]
impl ThreadStore for PgThreadStore {
    async fn create_thread(&self, token: &str) -> Result<ThreadRecord> {
        let record: ThreadRecord = sqlx::query_as(
            "INSERT INTO threads (id, token, created_at)
             VALUES ($1, $2, NOW())
             RETURNING id, token, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(token)
        .fetch_one(&self.db)
        .await?;
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThreadRecord>> {
        let record = sqlx::query_as("SELECT id, token, created_at FROM threads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<ThreadRecord>> {
        let record = sqlx::query_as("SELECT id, token, created_at FROM threads WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn append_step(&self, thread_id: Uuid, step: &StepRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO thread_steps (thread_id, label, detail, created_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(thread_id)
        .bind(&step.label)
        .bind(&step.detail)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn add_link(&self, thread_id: Uuid, linked_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO thread_links (thread_id, linked_id)
             VALUES ($1, $2)
             ON CONFLICT (thread_id, linked_id) DO NOTHING",
        )
        .bind(thread_id)
        .bind(linked_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_steps(&self, thread_id: Uuid) -> Result<Vec<StepRow>> {
        let steps = sqlx::query_as(
            "SELECT label, detail, created_at FROM thread_steps
             WHERE thread_id = $1 ORDER BY created_at, label",
        )
        .bind(thread_id)
        .fetch_all(&self.db)
        .await?;
        Ok(steps)
    }
}

/// In-memory store used by queue tests.
#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Inner {
        threads: Vec<ThreadRecord>,
        steps: Vec<(Uuid, StepRecord)>,
        links: HashSet<(Uuid, String)>,
    }

    #[derive(Default)]
    pub struct InMemoryThreadStore {
        inner: Mutex<Inner>,
    }

    impl InMemoryThreadStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert_thread(&self, id: Uuid, token: &str) {
            self.inner.lock().unwrap().threads.push(ThreadRecord {
                id,
                token: token.to_string(),
                created_at: Utc::now(),
            });
        }

        pub fn steps_for(&self, thread_id: Uuid) -> Vec<StepRecord> {
            self.inner
                .lock()
                .unwrap()
                .steps
                .iter()
                .filter(|(id, _)| *id == thread_id)
                .map(|(_, s)| s.clone())
                .collect()
        }

        pub fn links_for(&self, thread_id: Uuid) -> Vec<String> {
            let mut links: Vec<String> = self
                .inner
                .lock()
                .unwrap()
                .links
                .iter()
                .filter(|(id, _)| *id == thread_id)
                .map(|(_, l)| l.clone())
                .collect();
            links.sort();
            links
        }
    }

    #[async_trait]
    impl ThreadStore for InMemoryThreadStore {
        async fn create_thread(&self, token: &str) -> Result<ThreadRecord> {
            let record = ThreadRecord {
                id: Uuid::new_v4(),
                token: token.to_string(),
                created_at: Utc::now(),
            };
            self.inner.lock().unwrap().threads.push(record.clone());
            Ok(record)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<ThreadRecord>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .threads
                .iter()
                .find(|t| t.id == id)
                .cloned())
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<ThreadRecord>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .threads
                .iter()
                .find(|t| t.token == token)
                .cloned())
        }

        async fn append_step(&self, thread_id: Uuid, step: &StepRecord) -> Result<()> {
            self.inner
                .lock()
                .unwrap()
                .steps
                .push((thread_id, step.clone()));
            Ok(())
        }

        async fn add_link(&self, thread_id: Uuid, linked_id: &str) -> Result<()> {
            self.inner
                .lock()
                .unwrap()
                .links
                .insert((thread_id, linked_id.to_string()));
            Ok(())
        }

        async fn list_steps(&self, thread_id: Uuid) -> Result<Vec<StepRow>> {
            Ok(self
                .steps_for(thread_id)
                .into_iter()
                .map(|s| StepRow {
                    label: s.label,
                    detail: s.detail,
                    created_at: Utc::now(),
                })
                .collect())
        }
    }
}
