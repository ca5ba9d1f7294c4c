//! Intent recognition.
//!
//! Free-text understanding is delegated to the `CommandParser` capability;
//! this module owns the logic that must not drift with the model behind it:
//! the availability-phrase override, the low-confidence gate (see
//! `CONFIDENCE_FLOOR`), and pronoun resolution against conversation context.
//!
//! Per message the machine is `Received -> Parsed(confidence) ->
//! {Clarify | Act}`; the gate itself is enforced by the dispatcher, which
//! must never touch the scheduler for a below-floor intent.

pub mod windows;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::models::intent::{Intent, IntentEntities, PrimaryIntent};
use crate::models::session::{ConversationContext, Turn};
use crate::nlp::{CommandParser, NlpError, ParsedCommand};

/// Referential pronouns that trigger resolution against active entities.
const PRONOUNS: &[&str] = &["it", "that", "this", "them", "these", "those"];

/// How many recent turns are summarized for the parser.
const HISTORY_HINT_TURNS: usize = 6;

/// Maps a message to a structured intent.
///
/// Availability questions short-circuit to a deterministic `query` /
/// `availability` intent with a derived window — the external parser is
/// never consulted for them.
pub async fn recognize(
    text: &str,
    history: &[Turn],
    context: &ConversationContext,
    parser: &dyn CommandParser,
    now: DateTime<Utc>,
) -> Result<Intent, NlpError> {
    let tz = tz_of(context);

    let mut intent = if windows::is_availability_query(text) {
        debug!("Availability phrase matched, bypassing parser");
        Intent {
            primary: PrimaryIntent::Query,
            sub_intent: Some("availability".to_string()),
            confidence: 1.0,
            original_text: text.to_string(),
            entities: IntentEntities::default(),
            window: Some(windows::derive_window(text, now, tz)),
        }
    } else {
        let parsed = parser
            .parse_command(text, &context_hint(history, context))
            .await?;
        from_parsed(text, parsed)
    };

    resolve_references(text, context, &mut intent.entities);
    Ok(intent)
}

fn tz_of(context: &ConversationContext) -> FixedOffset {
    FixedOffset::east_opt(context.tz_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
}

fn from_parsed(text: &str, parsed: ParsedCommand) -> Intent {
    let primary = match parsed.action.as_str() {
        "create" => PrimaryIntent::Create,
        "update" => PrimaryIntent::Update,
        "delete" => PrimaryIntent::Delete,
        "query" => PrimaryIntent::Query,
        "clarify" => PrimaryIntent::Clarify,
        _ => PrimaryIntent::Unknown,
    };

    Intent {
        primary,
        sub_intent: None,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        original_text: text.to_string(),
        entities: IntentEntities {
            title: parsed.entities.title,
            start_time: parsed.entities.start_time,
            duration_minutes: parsed.entities.duration_minutes,
            description: parsed.entities.description,
            location: parsed.entities.location,
            attendees: parsed.entities.attendees,
            recurrence: parsed.entities.recurrence,
            references: Default::default(),
        },
        window: None,
    }
}

/// Substitutes the most recently active entity for a referential pronoun.
/// No pronoun, no resolution.
fn resolve_references(text: &str, context: &ConversationContext, entities: &mut IntentEntities) {
    if !contains_pronoun(text) {
        return;
    }
    if let Some((name, value)) = context.most_recent_entity() {
        debug!(entity = name, "Resolved pronoun reference");
        entities
            .references
            .insert(name.to_string(), value.to_string());
    }
}

fn contains_pronoun(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|word| {
            let lowered = word.to_lowercase();
            PRONOUNS.contains(&lowered.as_str())
        })
}

/// Compact summary of recent turns and active entities handed to the parser.
fn context_hint(history: &[Turn], context: &ConversationContext) -> String {
    let mut hint = String::new();
    for turn in history.iter().rev().take(HISTORY_HINT_TURNS).rev() {
        let speaker = match turn.speaker {
            crate::models::session::Speaker::User => "user",
            crate::models::session::Speaker::Assistant => "assistant",
        };
        hint.push_str(speaker);
        hint.push_str(": ");
        hint.push_str(&turn.content);
        hint.push('\n');
    }
    for (name, value) in &context.active_entities {
        hint.push_str(&format!("[{name}={value}]\n"));
    }
    if hint.is_empty() {
        hint.push_str("(no prior context)\n");
    }
    hint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::{ParsedCommand, ParsedEntities};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Parser stub returning a fixed command, counting invocations.
    struct ScriptedParser {
        action: String,
        confidence: f64,
        calls: AtomicU32,
    }

    impl ScriptedParser {
        fn new(action: &str, confidence: f64) -> Self {
            ScriptedParser {
                action: action.to_string(),
                confidence,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandParser for ScriptedParser {
        async fn parse_command(
            &self,
            _text: &str,
            _context_hint: &str,
        ) -> Result<ParsedCommand, NlpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ParsedCommand {
                action: self.action.clone(),
                confidence: self.confidence,
                entities: ParsedEntities {
                    title: Some("Design review".to_string()),
                    ..Default::default()
                },
            })
        }
    }

    fn now() -> DateTime<Utc> {
        // Wednesday.
        Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_availability_override_bypasses_parser() {
        // Even a parser that would confidently claim "create" is ignored.
        let parser = ScriptedParser::new("create", 0.99);
        let ctx = ConversationContext::default();

        let intent = recognize("what's on my calendar tomorrow", &[], &ctx, &parser, now())
            .await
            .unwrap();

        assert_eq!(intent.primary, PrimaryIntent::Query);
        assert_eq!(intent.sub_intent.as_deref(), Some("availability"));
        assert_eq!(parser.call_count(), 0);

        let window = intent.window.unwrap();
        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2025, 3, 13, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_generic_parse_maps_action_and_entities() {
        let parser = ScriptedParser::new("create", 0.9);
        let ctx = ConversationContext::default();

        let intent = recognize("set up a design review", &[], &ctx, &parser, now())
            .await
            .unwrap();

        assert_eq!(intent.primary, PrimaryIntent::Create);
        assert_eq!(intent.entities.title.as_deref(), Some("Design review"));
        assert!(!intent.needs_clarification());
        assert_eq!(parser.call_count(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_flags_clarification() {
        let parser = ScriptedParser::new("create", 0.4);
        let ctx = ConversationContext::default();

        let intent = recognize("do the thing with the stuff", &[], &ctx, &parser, now())
            .await
            .unwrap();

        assert!(intent.needs_clarification());
    }

    #[tokio::test]
    async fn test_unknown_action_maps_to_unknown() {
        let parser = ScriptedParser::new("dance", 0.9);
        let ctx = ConversationContext::default();

        let intent = recognize("tell me a joke", &[], &ctx, &parser, now())
            .await
            .unwrap();
        assert_eq!(intent.primary, PrimaryIntent::Unknown);
    }

    #[tokio::test]
    async fn test_pronoun_resolves_most_recent_entity() {
        let parser = ScriptedParser::new("update", 0.85);
        let mut ctx = ConversationContext::default();
        ctx.touch_entity("last_event_title", "standup".to_string());
        ctx.touch_entity("last_event_time", "2025-03-12T09:00:00+00:00".to_string());

        let intent = recognize("move it to 4pm", &[], &ctx, &parser, now())
            .await
            .unwrap();

        // Last updated entity wins.
        assert_eq!(
            intent.entities.references.get("last_event_time").unwrap(),
            "2025-03-12T09:00:00+00:00"
        );
        assert_eq!(intent.entities.references.len(), 1);
    }

    #[tokio::test]
    async fn test_no_pronoun_no_resolution() {
        let parser = ScriptedParser::new("update", 0.85);
        let mut ctx = ConversationContext::default();
        ctx.touch_entity("last_event_title", "standup".to_string());

        let intent = recognize("move the standup to 4pm", &[], &ctx, &parser, now())
            .await
            .unwrap();
        assert!(intent.entities.references.is_empty());
    }

    #[test]
    fn test_pronoun_matching_is_word_bounded() {
        assert!(contains_pronoun("move IT to friday"));
        assert!(contains_pronoun("delete that"));
        // "commitment" contains "it" but is not a pronoun.
        assert!(!contains_pronoun("my commitment stands"));
    }

    #[test]
    fn test_hyphenated_pronoun_still_matches() {
        assert!(contains_pronoun("those-ones"));
    }
}
