use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence floor below which the dispatcher must ask for clarification
/// instead of acting. This is a contract with the conversational surface,
/// not a tuning knob.
pub const CONFIDENCE_FLOOR: f64 = 0.6;

/// Top-level action recognized from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryIntent {
    Create,
    Update,
    Delete,
    Query,
    Clarify,
    Unknown,
}

impl PrimaryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimaryIntent::Create => "create",
            PrimaryIntent::Update => "update",
            PrimaryIntent::Delete => "delete",
            PrimaryIntent::Query => "query",
            PrimaryIntent::Clarify => "clarify",
            PrimaryIntent::Unknown => "unknown",
        }
    }
}

/// Fields extracted from a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentEntities {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub recurrence: Option<String>,
    /// Resolved pronoun references, e.g. "it" -> last mentioned event title.
    #[serde(default)]
    pub references: HashMap<String, String>,
}

/// A half-open `[start, end)` query window derived from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Structured interpretation of one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub primary: PrimaryIntent,
    pub sub_intent: Option<String>,
    pub confidence: f64,
    pub original_text: String,
    pub entities: IntentEntities,
    /// Populated for availability queries.
    pub window: Option<TimeWindow>,
}

impl Intent {
    pub fn needs_clarification(&self) -> bool {
        self.confidence < CONFIDENCE_FLOOR || self.primary == PrimaryIntent::Clarify
    }
}

/// Compact form stored on a turn after recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSummary {
    pub primary: PrimaryIntent,
    pub sub_intent: Option<String>,
    pub confidence: f64,
}

impl From<&Intent> for IntentSummary {
    fn from(intent: &Intent) -> Self {
        IntentSummary {
            primary: intent.primary,
            sub_intent: intent.sub_intent.clone(),
            confidence: intent.confidence,
        }
    }
}
