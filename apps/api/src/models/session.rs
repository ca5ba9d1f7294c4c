use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::intent::{Intent, IntentSummary, PrimaryIntent};

/// Newest `referenced_events` kept; oldest evicted first.
pub const MAX_REFERENCED_EVENTS: usize = 5;

/// Confidence above which a create intent registers the long-running
/// `calendar_management` goal.
const GOAL_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One message within a session. Immutable once appended, except for intent
/// back-fill on the same turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub intent: Option<IntentSummary>,
    pub action: Option<String>,
}

/// Rolling context carried across turns.
///
/// `active_entities` is an ordered list of `(name, value)` pairs; updating an
/// existing name moves it to the back, so the last element is always the most
/// recently mentioned entity (the pronoun-resolution target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default)]
    pub active_entities: Vec<(String, String)>,
    #[serde(default)]
    pub referenced_events: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub preferences: serde_json::Value,
    /// Minutes east of UTC for the user's environment.
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

impl Default for ConversationContext {
    fn default() -> Self {
        ConversationContext {
            active_entities: Vec::new(),
            referenced_events: Vec::new(),
            goals: Vec::new(),
            preferences: serde_json::Value::Null,
            tz_offset_minutes: 0,
        }
    }
}

impl ConversationContext {
    /// Records or refreshes a named entity, keeping the list ordered by
    /// recency (most recent last).
    pub fn touch_entity(&mut self, name: &str, value: String) {
        self.active_entities.retain(|(n, _)| n != name);
        self.active_entities.push((name.to_string(), value));
    }

    /// The most recently mentioned entity, if any.
    pub fn most_recent_entity(&self) -> Option<(&str, &str)> {
        self.active_entities
            .last()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Appends an event id, evicting the oldest beyond the cap.
    pub fn remember_event(&mut self, event_id: String) {
        self.referenced_events.push(event_id);
        while self.referenced_events.len() > MAX_REFERENCED_EVENTS {
            self.referenced_events.remove(0);
        }
    }

    /// The most recently referenced event id.
    pub fn last_referenced_event(&self) -> Option<&str> {
        self.referenced_events.last().map(String::as_str)
    }

    fn add_goal(&mut self, goal: &str) {
        if !self.goals.iter().any(|g| g == goal) {
            self.goals.push(goal.to_string());
        }
    }

    /// Merges a recognized intent (and any produced event) into the context.
    /// Append/merge only; history is never destructively overwritten.
    pub fn absorb(&mut self, intent: &Intent, produced_event_id: Option<&str>) {
        if let Some(title) = &intent.entities.title {
            self.touch_entity("last_event_title", title.clone());
        }
        if let Some(start) = intent.entities.start_time {
            self.touch_entity("last_event_time", start.to_rfc3339());
        }
        if let Some(id) = produced_event_id {
            self.remember_event(id.to_string());
        }
        if intent.primary == PrimaryIntent::Create && intent.confidence > GOAL_CONFIDENCE {
            self.add_goal("calendar_management");
        }
    }
}

/// A conversation session. Never hard-deleted; superseded sessions age out
/// via the idle window and are treated as inactive.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub thread_id: Uuid,
    pub thread_token: String,
    pub turns: Vec<Turn>,
    pub context: ConversationContext,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
}

impl ConversationSession {
    pub fn is_expired(&self, now: DateTime<Utc>, idle: chrono::Duration) -> bool {
        now - self.last_activity > idle
    }
}

/// Row shape for the `sessions` table; `context` is a JSONB column.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub thread_id: Uuid,
    pub thread_token: String,
    pub context: serde_json::Value,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::intent::IntentEntities;
    use chrono::TimeZone;

    fn make_intent(primary: PrimaryIntent, confidence: f64) -> Intent {
        Intent {
            primary,
            sub_intent: None,
            confidence,
            original_text: "test".to_string(),
            entities: IntentEntities::default(),
            window: None,
        }
    }

    #[test]
    fn test_referenced_events_capped_at_five_fifo() {
        let mut ctx = ConversationContext::default();
        for i in 0..7 {
            ctx.remember_event(format!("evt-{i}"));
        }
        assert_eq!(ctx.referenced_events.len(), MAX_REFERENCED_EVENTS);
        // evt-0 and evt-1 were evicted first.
        assert_eq!(
            ctx.referenced_events,
            vec!["evt-2", "evt-3", "evt-4", "evt-5", "evt-6"]
        );
        assert_eq!(ctx.last_referenced_event(), Some("evt-6"));
    }

    #[test]
    fn test_touch_entity_moves_existing_to_back() {
        let mut ctx = ConversationContext::default();
        ctx.touch_entity("last_event_title", "standup".to_string());
        ctx.touch_entity("last_event_time", "t1".to_string());
        ctx.touch_entity("last_event_title", "retro".to_string());

        assert_eq!(ctx.active_entities.len(), 2);
        assert_eq!(ctx.most_recent_entity(), Some(("last_event_title", "retro")));
    }

    #[test]
    fn test_absorb_merges_title_and_start() {
        let mut ctx = ConversationContext::default();
        let mut intent = make_intent(PrimaryIntent::Create, 0.9);
        intent.entities.title = Some("standup".to_string());
        intent.entities.start_time = Some(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());

        ctx.absorb(&intent, Some("evt-1"));

        assert_eq!(ctx.most_recent_entity().unwrap().0, "last_event_time");
        assert!(ctx
            .active_entities
            .iter()
            .any(|(n, v)| n == "last_event_title" && v == "standup"));
        assert_eq!(ctx.referenced_events, vec!["evt-1"]);
    }

    #[test]
    fn test_absorb_adds_goal_only_for_confident_create() {
        let mut ctx = ConversationContext::default();
        ctx.absorb(&make_intent(PrimaryIntent::Create, 0.7), None);
        assert!(ctx.goals.is_empty());

        ctx.absorb(&make_intent(PrimaryIntent::Query, 0.95), None);
        assert!(ctx.goals.is_empty());

        ctx.absorb(&make_intent(PrimaryIntent::Create, 0.9), None);
        assert_eq!(ctx.goals, vec!["calendar_management"]);

        // Idempotent.
        ctx.absorb(&make_intent(PrimaryIntent::Create, 0.9), None);
        assert_eq!(ctx.goals.len(), 1);
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let session = ConversationSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            thread_id: Uuid::new_v4(),
            thread_token: "tok".to_string(),
            turns: vec![],
            context: ConversationContext::default(),
            last_activity: now - chrono::Duration::hours(7),
            is_active: true,
        };
        assert!(session.is_expired(now, chrono::Duration::hours(6)));
        assert!(!session.is_expired(now, chrono::Duration::hours(8)));
    }
}
