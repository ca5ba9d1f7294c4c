// Command-parsing prompt templates.
// All prompts for the nlp module are defined here.

pub const COMMAND_PARSE_SYSTEM: &str = "\
You are a precise calendar command parser. \
Interpret natural language requests about calendar events into structured JSON. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Report confidence HONESTLY — when the request is ambiguous or off-topic, \
lower the confidence instead of guessing.";

pub const COMMAND_PARSE_PROMPT: &str = r#"Parse the following message into a structured calendar command.

CURRENT TIME (RFC 3339): {now}
CONVERSATION CONTEXT:
{context}

MESSAGE:
{message}

OUTPUT SCHEMA (return exactly this structure):
{
  "action": "create" | "update" | "delete" | "query" | "unknown",
  "confidence": number between 0.0 and 1.0,
  "entities": {
    "title": "string" | null,
    "start_time": "RFC 3339 timestamp" | null,
    "duration_minutes": number | null,
    "description": "string" | null,
    "location": "string" | null,
    "attendees": ["string"],
    "recurrence": "RRULE string" | null
  }
}

RULES:
- Resolve relative dates ("today", "next Tuesday") against CURRENT TIME.
- Leave fields null when the message does not state them; do not invent values.
- "confidence" reflects how certain you are that the action and entities are right."#;
