//! Session persistence.
//!
//! Sessions and turns are append/merge only: a superseded session is never
//! deleted, it simply stops being the most recent active one once the idle
//! window passes.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::linkage::ThreadStore;
use crate::models::intent::IntentSummary;
use crate::models::session::{
    ConversationContext, ConversationSession, SessionRow, Speaker, Turn,
};

pub struct SessionStore {
    db: PgPool,
    idle: Duration,
}

#[derive(Debug, sqlx::FromRow)]
struct TurnRow {
    speaker: String,
    content: String,
    timestamp: chrono::DateTime<Utc>,
    intent: Option<serde_json::Value>,
    action: Option<String>,
}

impl SessionStore {
    pub fn new(db: PgPool, idle_hours: i64) -> Self {
        SessionStore {
            db,
            idle: Duration::hours(idle_hours),
        }
    }

    /// Most recent active session for the user, or a fresh one when none
    /// exists or the previous one has idled out. The old session is left in
    /// place — age alone makes it inactive.
    pub async fn get_or_create(
        &self,
        user_id: Uuid,
        threads: &dyn ThreadStore,
    ) -> Result<ConversationSession, AppError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, thread_id, thread_token, context, last_activity, is_active
             FROM sessions
             WHERE user_id = $1 AND is_active
             ORDER BY last_activity DESC
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            let session = self.hydrate(row).await?;
            if !session.is_expired(Utc::now(), self.idle) {
                return Ok(session);
            }
        }

        self.create(user_id, threads).await
    }

    /// Whether a session has sat past the idle window.
    pub fn is_stale(&self, session: &ConversationSession) -> bool {
        session.is_expired(Utc::now(), self.idle)
    }

    /// Loads a specific session by id, turns included.
    pub async fn find(&self, id: Uuid) -> Result<Option<ConversationSession>, AppError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, thread_id, thread_token, context, last_activity, is_active
             FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        user_id: Uuid,
        threads: &dyn ThreadStore,
    ) -> Result<ConversationSession, AppError> {
        // Secondary token form: distinguishable from a uuid at a glance.
        let token = format!("thr-{}", Uuid::new_v4().simple());
        let thread = threads
            .create_thread(&token)
            .await
            .map_err(AppError::Internal)?;

        let id = Uuid::new_v4();
        let context = ConversationContext::default();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, thread_id, thread_token, context, last_activity, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE)",
        )
        .bind(id)
        .bind(user_id)
        .bind(thread.id)
        .bind(&token)
        .bind(serde_json::to_value(&context).unwrap_or(serde_json::Value::Null))
        .bind(now)
        .execute(&self.db)
        .await?;

        info!(%user_id, session_id = %id, thread_id = %thread.id, "Started new conversation session");

        Ok(ConversationSession {
            id,
            user_id,
            thread_id: thread.id,
            thread_token: token,
            turns: Vec::new(),
            context,
            last_activity: now,
            is_active: true,
        })
    }

    /// Appends one turn. Turns are immutable once written; the recognized
    /// intent rides along with the user turn it belongs to.
    pub async fn append_turn(&self, session_id: Uuid, turn: &Turn) -> Result<(), AppError> {
        let speaker = match turn.speaker {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        };
        let intent = turn
            .intent
            .as_ref()
            .map(|i| serde_json::to_value(i).unwrap_or(serde_json::Value::Null));

        sqlx::query(
            "INSERT INTO turns (session_id, speaker, content, timestamp, intent, action)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session_id)
        .bind(speaker)
        .bind(&turn.content)
        .bind(turn.timestamp)
        .bind(intent)
        .bind(&turn.action)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Persists the merged context and bumps activity. Last write wins when
    /// two messages from the same user race; that narrow race is accepted.
    pub async fn save_context(
        &self,
        session_id: Uuid,
        context: &ConversationContext,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET context = $1, last_activity = $2 WHERE id = $3")
            .bind(serde_json::to_value(context).unwrap_or(serde_json::Value::Null))
            .bind(Utc::now())
            .bind(session_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn hydrate(&self, row: SessionRow) -> Result<ConversationSession, AppError> {
        let turn_rows: Vec<TurnRow> = sqlx::query_as(
            "SELECT speaker, content, timestamp, intent, action
             FROM turns WHERE session_id = $1 ORDER BY timestamp, id",
        )
        .bind(row.id)
        .fetch_all(&self.db)
        .await?;

        let turns = turn_rows
            .into_iter()
            .map(|t| Turn {
                speaker: if t.speaker == "assistant" {
                    Speaker::Assistant
                } else {
                    Speaker::User
                },
                content: t.content,
                timestamp: t.timestamp,
                intent: t
                    .intent
                    .and_then(|v| serde_json::from_value::<IntentSummary>(v).ok()),
                action: t.action,
            })
            .collect();

        Ok(ConversationSession {
            id: row.id,
            user_id: row.user_id,
            thread_id: row.thread_id,
            thread_token: row.thread_token,
            turns,
            context: serde_json::from_value(row.context).unwrap_or_default(),
            last_activity: row.last_activity,
            is_active: row.is_active,
        })
    }
}
