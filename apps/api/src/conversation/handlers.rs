//! Axum route handlers for the conversational surface.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::conversation::dispatcher::{self, DispatchStatus};
use crate::errors::AppError;
use crate::intent::recognize;
use crate::linkage::store::StepRow;
use crate::linkage::{Identifier, StepRecord};
use crate::models::intent::IntentSummary;
use crate::models::session::{ConversationSession, Speaker, Turn};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub user_id: Uuid,
    pub message: String,
    /// Resume a specific session; omitted means "latest active or new".
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub content: String,
    /// Absent when the message couldn't be parsed at all.
    pub intent: Option<IntentSummary>,
    pub action: Option<String>,
    pub suggestions: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub conversation_id: Uuid,
    pub thread_id: Uuid,
    pub needs_clarification: bool,
    pub status: DispatchStatus,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<StepRow>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/messages
///
/// The single conversational entrypoint: recognize the intent, dispatch the
/// action, persist both turns and the merged context, and fire the linkage
/// records. Linkage enqueues never delay or fail the response.
pub async fn handle_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let mut session = resolve_session(&state, &request).await?;
    let now = Utc::now();

    state.linkage.enqueue_step(
        Identifier::Fixed(session.thread_id),
        StepRecord {
            label: "message_received".to_string(),
            detail: json!({ "length": request.message.len() }),
        },
    );

    // A parser failure is a conversational outcome, not an HTTP error: the
    // user gets a plain-language retry prompt with `status: failed`.
    let (intent, outcome) = match recognize(
        &request.message,
        &session.turns,
        &session.context,
        state.nlp.as_ref(),
        now,
    )
    .await
    {
        Ok(intent) => {
            state.linkage.enqueue_step(
                Identifier::Fixed(session.thread_id),
                StepRecord {
                    label: "intent_recognized".to_string(),
                    detail: json!({
                        "intent": intent.primary.as_str(),
                        "confidence": intent.confidence,
                    }),
                },
            );
            let outcome = state
                .dispatcher
                .dispatch(request.user_id, &intent, &session.context, now)
                .await;
            (Some(intent), outcome)
        }
        Err(e) => {
            warn!(error = %e, "Intent recognition failed");
            (None, dispatcher::parse_failure())
        }
    };
    let summary = intent.as_ref().map(IntentSummary::from);

    let user_turn = Turn {
        speaker: Speaker::User,
        content: request.message.clone(),
        timestamp: now,
        intent: summary.clone(),
        action: None,
    };
    let assistant_turn = Turn {
        speaker: Speaker::Assistant,
        content: outcome.content.clone(),
        timestamp: Utc::now(),
        intent: None,
        action: outcome.action.clone(),
    };
    state.sessions.append_turn(session.id, &user_turn).await?;
    state
        .sessions
        .append_turn(session.id, &assistant_turn)
        .await?;

    if let Some(intent) = &intent {
        session
            .context
            .absorb(intent, outcome.produced_event_id.as_deref());
        state
            .sessions
            .save_context(session.id, &session.context)
            .await?;
    }

    if let Some(action) = &outcome.action {
        state.linkage.enqueue_step(
            Identifier::Fixed(session.thread_id),
            StepRecord {
                label: "action_executed".to_string(),
                detail: json!({ "action": action }),
            },
        );
    }
    if let Some(event_id) = &outcome.produced_event_id {
        state
            .linkage
            .enqueue_link(Identifier::Fixed(session.thread_id), event_id.clone());
    }

    Ok(Json(MessageResponse {
        content: outcome.content,
        intent: summary,
        action: outcome.action,
        suggestions: outcome.suggestions,
        follow_up_questions: outcome.follow_up_questions,
        conversation_id: session.id,
        thread_id: session.thread_id,
        needs_clarification: outcome.needs_clarification,
        status: outcome.status,
    }))
}

/// GET /api/v1/threads/:id
///
/// Fetches a processing thread by primary id or secondary token. The form
/// is decided once from the raw path segment.
pub async fn handle_get_thread(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ThreadResponse>, AppError> {
    let thread = match Identifier::parse(&raw) {
        Identifier::Fixed(id) => state.threads.find_by_id(id).await,
        Identifier::Token(token) => state.threads.find_by_token(&token).await,
    }
    .map_err(AppError::Internal)?
    .ok_or_else(|| AppError::NotFound(format!("thread {raw} not found")))?;

    let steps = state
        .threads
        .list_steps(thread.id)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(ThreadResponse {
        id: thread.id,
        token: thread.token,
        created_at: thread.created_at,
        steps,
    }))
}

/// An explicitly named session is resumed only when it belongs to the caller
/// and hasn't idled out; anything else falls back to latest-active-or-new.
async fn resolve_session(
    state: &AppState,
    request: &MessageRequest,
) -> Result<ConversationSession, AppError> {
    if let Some(id) = request.conversation_id {
        if let Some(session) = state.sessions.find(id).await? {
            if session.user_id == request.user_id
                && session.is_active
                && !state.sessions.is_stale(&session)
            {
                return Ok(session);
            }
        }
    }
    state
        .sessions
        .get_or_create(request.user_id, state.threads.as_ref())
        .await
}
