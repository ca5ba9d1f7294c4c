//! Fixed, intent-keyed suggestion and follow-up prompt lists.
//!
//! These are deliberately NOT model-generated: the conversational chrome
//! around an action is a product decision, not an inference.

/// Suggestion chips offered with a response.
pub fn suggestions_for(key: &str) -> Vec<String> {
    let items: &[&str] = match key {
        "create_success" => &[
            "Add attendees to this event",
            "Set a reminder",
            "Schedule another event",
        ],
        "update_success" => &["Undo this change", "View the updated event"],
        "delete_success" => &["Schedule something in that slot", "View your calendar"],
        "conflict" => &[
            "Take the suggested time",
            "See more open slots",
            "Book it anyway",
        ],
        "availability" => &["Schedule a meeting in a free slot", "Check another day"],
        "query" => &["Check your availability", "Schedule a new event"],
        "clarify" => &[
            "Try: schedule lunch tomorrow at noon",
            "Try: what's on my calendar this week",
        ],
        "disambiguate" => &["Just this occurrence", "The whole series"],
        "auth" => &["Reconnect your calendar"],
        _ => &[],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Follow-up questions the assistant may append.
pub fn follow_ups_for(key: &str) -> Vec<String> {
    let items: &[&str] = match key {
        "create_success" => &[
            "Should this event repeat?",
            "Want a notification before it starts?",
        ],
        "conflict" => &["Should I book the first alternative instead?"],
        "availability" => &["Want me to schedule something in a free slot?"],
        "delete_success" => &["Anything else to clean up?"],
        _ => &[],
    };
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keys_are_nonempty() {
        for key in [
            "create_success",
            "update_success",
            "delete_success",
            "conflict",
            "availability",
            "query",
            "clarify",
            "disambiguate",
            "auth",
        ] {
            assert!(!suggestions_for(key).is_empty(), "no suggestions for {key}");
        }
    }

    #[test]
    fn test_unknown_key_yields_empty() {
        assert!(suggestions_for("nope").is_empty());
        assert!(follow_ups_for("nope").is_empty());
    }

    #[test]
    fn test_create_follow_ups_ask_recurrence_and_notification() {
        let ups = follow_ups_for("create_success");
        assert!(ups.iter().any(|q| q.contains("repeat")));
        assert!(ups.iter().any(|q| q.contains("notification")));
    }
}
