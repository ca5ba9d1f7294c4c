use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event as reported by the remote calendar service.
/// Referenced, never owned: the calendar of record lives behind the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub recurring: bool,
}

/// Payload sent to the gateway when creating or updating an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSpec {
    pub title: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    /// Recurrence rule, if the request targets a series.
    pub recurrence: Option<String>,
}

impl EventSpec {
    pub fn end(&self) -> DateTime<Utc> {
        crate::time::add_minutes(self.start, self.duration_minutes)
    }
}
