//! Action dispatcher — routes a recognized intent to the scheduler and
//! shapes the conversational reply.
//!
//! The dispatcher is the error boundary for the conversation: scheduler and
//! gateway failures become plain-language messages with `status: failed`,
//! never a raw error past this point. The low-confidence gate is enforced
//! here — a below-floor intent must not touch the scheduler at all.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::calendar::gateway::{CalendarGateway, GatewayError};
use crate::conversation::suggestions::{follow_ups_for, suggestions_for};
use crate::models::event::{CalendarEvent, EventSpec};
use crate::models::intent::{Intent, PrimaryIntent, TimeWindow};
use crate::models::session::ConversationContext;
use crate::scheduler::{Scheduler, SchedulerError};

/// Assumed length when the parser extracted no duration.
const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Ok,
    Failed,
}

/// Everything the conversational surface needs to answer one message.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub content: String,
    pub action: Option<String>,
    pub needs_clarification: bool,
    pub status: DispatchStatus,
    pub produced_event_id: Option<String>,
    pub suggestions: Vec<String>,
    pub follow_up_questions: Vec<String>,
}

impl DispatchOutcome {
    fn reply(content: String, action: &str, key: &str) -> Self {
        DispatchOutcome {
            content,
            action: Some(action.to_string()),
            needs_clarification: false,
            status: DispatchStatus::Ok,
            produced_event_id: None,
            suggestions: suggestions_for(key),
            follow_up_questions: follow_ups_for(key),
        }
    }

    fn clarify(content: String, key: &str) -> Self {
        DispatchOutcome {
            content,
            action: None,
            needs_clarification: true,
            status: DispatchStatus::Ok,
            produced_event_id: None,
            suggestions: suggestions_for(key),
            follow_up_questions: follow_ups_for(key),
        }
    }

    fn failed(content: String, key: &str) -> Self {
        DispatchOutcome {
            content,
            action: None,
            needs_clarification: false,
            status: DispatchStatus::Failed,
            produced_event_id: None,
            suggestions: suggestions_for(key),
            follow_up_questions: follow_ups_for(key),
        }
    }
}

pub struct Dispatcher {
    scheduler: Arc<Scheduler>,
    gateway: Arc<dyn CalendarGateway>,
}

impl Dispatcher {
    pub fn new(scheduler: Arc<Scheduler>, gateway: Arc<dyn CalendarGateway>) -> Self {
        Dispatcher { scheduler, gateway }
    }

    pub async fn dispatch(
        &self,
        user_id: Uuid,
        intent: &Intent,
        context: &ConversationContext,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        // Gate before anything else: an uncertain intent never reaches the
        // scheduler.
        if intent.needs_clarification() || intent.primary == PrimaryIntent::Unknown {
            debug!(
                confidence = intent.confidence,
                "Below confidence floor, asking for clarification"
            );
            return clarification_request();
        }

        let tz = tz_of(context);
        match intent.primary {
            PrimaryIntent::Create => self.create(user_id, intent, context, tz).await,
            PrimaryIntent::Update => self.update(user_id, intent, context, tz).await,
            PrimaryIntent::Delete => self.delete(user_id, context).await,
            PrimaryIntent::Query => self.query(user_id, intent, now, tz).await,
            PrimaryIntent::Clarify | PrimaryIntent::Unknown => clarification_request(),
        }
    }

    async fn create(
        &self,
        user_id: Uuid,
        intent: &Intent,
        context: &ConversationContext,
        tz: FixedOffset,
    ) -> DispatchOutcome {
        let Some(start) = intent.entities.start_time else {
            return DispatchOutcome::clarify(
                "When should I schedule that for?".to_string(),
                "clarify",
            );
        };
        let spec = self.build_spec(intent, context, start);

        match self
            .scheduler
            .create_with_conflict_check(user_id, &spec, tz)
            .await
        {
            Ok(outcome) => self.render_outcome(outcome, &spec, tz, "created"),
            Err(e) => scheduling_failure(e),
        }
    }

    async fn update(
        &self,
        user_id: Uuid,
        intent: &Intent,
        context: &ConversationContext,
        tz: FixedOffset,
    ) -> DispatchOutcome {
        let Some(event_id) = context.last_referenced_event() else {
            return DispatchOutcome::clarify(
                "Which event would you like me to change?".to_string(),
                "clarify",
            );
        };

        // Read the stored event first: "move it to 4pm" mentions only the
        // start, and every unmentioned field must keep its stored value.
        let existing = match self.gateway.get_event(user_id, event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                return DispatchOutcome::clarify(
                    "I couldn't find that event on your calendar anymore. \
                     Which event did you mean?"
                        .to_string(),
                    "clarify",
                )
            }
            Err(e) => return gateway_failure(e),
        };
        let spec = merge_spec(intent, &existing);

        match self
            .scheduler
            .update_with_conflict_check(user_id, event_id, &spec, tz)
            .await
        {
            Ok(outcome) => self.render_outcome(outcome, &spec, tz, "updated"),
            Err(e) => scheduling_failure(e),
        }
    }

    async fn delete(&self, user_id: Uuid, context: &ConversationContext) -> DispatchOutcome {
        let Some(event_id) = context.last_referenced_event() else {
            return DispatchOutcome::clarify(
                "Which event should I delete?".to_string(),
                "clarify",
            );
        };

        match self.gateway.delete_event(user_id, event_id).await {
            Ok(()) => DispatchOutcome::reply(
                "Done — the event has been removed from your calendar.".to_string(),
                "event_deleted",
                "delete_success",
            ),
            Err(e) => gateway_failure(e),
        }
    }

    async fn query(
        &self,
        user_id: Uuid,
        intent: &Intent,
        now: DateTime<Utc>,
        tz: FixedOffset,
    ) -> DispatchOutcome {
        let window = intent.window.unwrap_or(TimeWindow {
            start: now,
            end: now + chrono::Duration::hours(24),
        });

        let events = match self
            .scheduler
            .find_conflicts(user_id, window.start, window.end, None)
            .await
        {
            Ok(events) => events,
            Err(e) => return gateway_failure(e),
        };

        if intent.sub_intent.as_deref() == Some("availability") {
            let available = match self
                .scheduler
                .check_availability(user_id, window.start, window.end)
                .await
            {
                Ok(a) => a,
                Err(e) => return gateway_failure(e),
            };

            let content = if available {
                format!(
                    "Yes — you're free between {} and {}.",
                    fmt_local(window.start, tz),
                    fmt_local(window.end, tz)
                )
            } else {
                format!(
                    "You have {} event{} in that window:\n{}",
                    events.len(),
                    if events.len() == 1 { "" } else { "s" },
                    event_lines(&events, tz)
                )
            };
            return DispatchOutcome::reply(content, "availability_checked", "availability");
        }

        let content = if events.is_empty() {
            "Nothing on your calendar in that window.".to_string()
        } else {
            format!("Here's what I found:\n{}", event_lines(&events, tz))
        };
        DispatchOutcome::reply(content, "events_listed", "query")
    }

    fn build_spec(
        &self,
        intent: &Intent,
        context: &ConversationContext,
        start: DateTime<Utc>,
    ) -> EventSpec {
        let title = intent
            .entities
            .title
            .clone()
            .or_else(|| intent.entities.references.get("last_event_title").cloned())
            .or_else(|| {
                context
                    .active_entities
                    .iter()
                    .rev()
                    .find(|(n, _)| n == "last_event_title")
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or_else(|| "Untitled event".to_string());

        EventSpec {
            title,
            start,
            duration_minutes: intent
                .entities
                .duration_minutes
                .unwrap_or(DEFAULT_DURATION_MINUTES),
            description: intent.entities.description.clone(),
            location: intent.entities.location.clone(),
            attendees: intent.entities.attendees.clone(),
            recurrence: intent.entities.recurrence.clone(),
        }
    }

    fn render_outcome(
        &self,
        outcome: crate::scheduler::SchedulingOutcome,
        spec: &EventSpec,
        tz: FixedOffset,
        verb: &str,
    ) -> DispatchOutcome {
        if outcome.needs_disambiguation {
            return DispatchOutcome::clarify(
                format!(
                    "\"{}\" looks like a recurring event. Should I change just one \
                     occurrence, or the whole series?",
                    spec.title
                ),
                "disambiguate",
            );
        }

        if let Some(event) = outcome.event.filter(|_| outcome.success) {
            let mut reply = DispatchOutcome::reply(
                format!(
                    "\"{}\" {verb} for {} – {}.",
                    event.title,
                    fmt_local(event.start, tz),
                    fmt_local(event.end, tz)
                ),
                &format!("event_{verb}"),
                &format!(
                    "{}_success",
                    if verb == "created" { "create" } else { "update" }
                ),
            );
            reply.produced_event_id = Some(event.id);
            return reply;
        }

        let mut content = match outcome.conflicts.first() {
            Some(conflict) => format!(
                "That time conflicts with \"{}\" ({} – {}).",
                conflict.title,
                fmt_local(conflict.start, tz),
                fmt_local(conflict.end, tz)
            ),
            None => "That time isn't available.".to_string(),
        };
        match outcome.alternatives.first() {
            Some(alt) => {
                content.push_str(&format!(
                    " The next open slot is {}.",
                    fmt_local(*alt, tz)
                ));
            }
            None => content.push_str(" I couldn't find an open slot within the search window."),
        }
        DispatchOutcome::reply(content, "conflict_reported", "conflict")
    }
}

/// Change request over a stored event: mentioned entities win, everything
/// else carries over unchanged.
fn merge_spec(intent: &Intent, existing: &CalendarEvent) -> EventSpec {
    let entities = &intent.entities;
    EventSpec {
        title: entities
            .title
            .clone()
            .unwrap_or_else(|| existing.title.clone()),
        start: entities.start_time.unwrap_or(existing.start),
        duration_minutes: entities
            .duration_minutes
            .unwrap_or_else(|| (existing.end - existing.start).num_minutes()),
        description: entities.description.clone(),
        location: entities.location.clone().or_else(|| existing.location.clone()),
        attendees: if entities.attendees.is_empty() {
            existing.attendees.clone()
        } else {
            entities.attendees.clone()
        },
        recurrence: entities.recurrence.clone(),
    }
}

/// Reply when the message could not be parsed at all. Parser trouble is a
/// conversational outcome, not a transport error.
pub(crate) fn parse_failure() -> DispatchOutcome {
    DispatchOutcome::failed(
        "Sorry — I had trouble understanding that. Could you try saying it \
         another way?"
            .to_string(),
        "error",
    )
}

fn clarification_request() -> DispatchOutcome {
    DispatchOutcome::clarify(
        "I want to make sure I get this right — could you say that again with a bit \
         more detail about the event and time?"
            .to_string(),
        "clarify",
    )
}

fn tz_of(context: &ConversationContext) -> FixedOffset {
    FixedOffset::east_opt(context.tz_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
}

fn fmt_local(t: DateTime<Utc>, tz: FixedOffset) -> String {
    t.with_timezone(&tz).format("%a %b %e, %H:%M").to_string()
}

fn event_lines(events: &[CalendarEvent], tz: FixedOffset) -> String {
    events
        .iter()
        .map(|e| {
            format!(
                "- {} ({} – {})",
                e.title,
                fmt_local(e.start, tz),
                fmt_local(e.end, tz)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The conversational boundary for scheduler errors: plain language only.
fn scheduling_failure(error: SchedulerError) -> DispatchOutcome {
    match error {
        SchedulerError::Validation(msg) => DispatchOutcome::clarify(
            format!("That request doesn't quite work: {msg}. Could you rephrase it?"),
            "clarify",
        ),
        SchedulerError::Gateway(e) => gateway_failure(e),
    }
}

fn gateway_failure(error: GatewayError) -> DispatchOutcome {
    match error {
        GatewayError::AuthRequired => DispatchOutcome::failed(
            "I can't reach your calendar because the connection has expired. \
             Please reconnect your calendar and try again."
                .to_string(),
            "auth",
        ),
        GatewayError::RemoteUnavailable(_) => DispatchOutcome::failed(
            "Sorry — I couldn't reach your calendar service just now. \
             Please try again in a moment."
                .to_string(),
            "error",
        ),
    }
}
