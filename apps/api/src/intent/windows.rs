//! Query-window derivation for availability questions.
//!
//! Literal phrase matches, fixed precedence, exactly one rule per message.
//! The fallback window is "now through +24h".

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};

use crate::models::intent::TimeWindow;

/// Vocabulary that routes a message to the availability sub-intent before
/// any generic parsing happens.
const AVAILABILITY_PHRASES: &[&str] = &["available", "check my", "what's on my calendar"];

pub fn is_availability_query(text: &str) -> bool {
    let lowered = text.to_lowercase();
    AVAILABILITY_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Derives the `[start, end)` window for an availability query.
///
/// Precedence (first match wins): tomorrow, next week, this week, today,
/// morning, afternoon, evening. "next week" is checked before "this week"
/// so the shared word "week" cannot misroute.
pub fn derive_window(text: &str, now: DateTime<Utc>, tz: FixedOffset) -> TimeWindow {
    let lowered = text.to_lowercase();
    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();

    if lowered.contains("tomorrow") {
        let start = local_midnight(today + Duration::days(1), tz);
        return TimeWindow {
            start,
            end: local_midnight(today + Duration::days(2), tz),
        };
    }
    if lowered.contains("next week") {
        let monday = next_weekday(today, Weekday::Mon);
        let start = local_midnight(monday, tz);
        return TimeWindow {
            start,
            end: local_midnight(monday + Duration::days(7), tz),
        };
    }
    if lowered.contains("this week") {
        return TimeWindow {
            start: now,
            end: local_midnight(next_weekday(today, Weekday::Sat), tz),
        };
    }
    if lowered.contains("today") {
        return TimeWindow {
            start: now,
            end: local_midnight(today + Duration::days(1), tz),
        };
    }
    if let Some(window) = clock_window(&lowered, today, tz) {
        return window;
    }

    TimeWindow {
        start: now,
        end: now + Duration::hours(24),
    }
}

/// Fixed clock windows: morning 08-12, afternoon 12-18, evening 18-22.
fn clock_window(lowered: &str, today: NaiveDate, tz: FixedOffset) -> Option<TimeWindow> {
    let (from, to) = if lowered.contains("morning") {
        (8, 12)
    } else if lowered.contains("afternoon") {
        (12, 18)
    } else if lowered.contains("evening") {
        (18, 22)
    } else {
        return None;
    };
    Some(TimeWindow {
        start: local_hour(today, from, tz),
        end: local_hour(today, to, tz),
    })
}

/// The next occurrence of `weekday` strictly after `date`.
fn next_weekday(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - date.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    date + Duration::days(ahead as i64)
}

fn local_midnight(date: NaiveDate, tz: FixedOffset) -> DateTime<Utc> {
    local_hour(date, 0, tz)
}

fn local_hour(date: NaiveDate, hour: u32, tz: FixedOffset) -> DateTime<Utc> {
    // FixedOffset has no DST gaps, so a local wall time is always unambiguous.
    let naive = date
        .and_hms_opt(hour, 0, 0)
        .expect("hour is always in 0..24");
    tz.from_local_datetime(&naive)
        .single()
        .expect("fixed offsets map local times uniquely")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    // Wednesday.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap()
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_availability_vocabulary() {
        assert!(is_availability_query("Am I available at 3?"));
        assert!(is_availability_query("Can you check my schedule"));
        assert!(is_availability_query("What's on my calendar tomorrow"));
        assert!(!is_availability_query("Schedule a meeting tomorrow"));
    }

    #[test]
    fn test_tomorrow_covers_full_next_day() {
        let w = derive_window("what's on my calendar tomorrow", now(), utc());
        assert_eq!(w.start, day(13, 0));
        assert_eq!(w.end, day(14, 0));
    }

    #[test]
    fn test_today_runs_to_end_of_day() {
        let w = derive_window("am I available today", now(), utc());
        assert_eq!(w.start, now());
        assert_eq!(w.end, day(13, 0));
    }

    #[test]
    fn test_this_week_ends_upcoming_saturday() {
        let w = derive_window("what's on my calendar this week", now(), utc());
        assert_eq!(w.start, now());
        assert_eq!(w.end, day(15, 0)); // Saturday 2025-03-15
    }

    #[test]
    fn test_next_week_is_following_monday_through_sunday() {
        let w = derive_window("check my next week", now(), utc());
        assert_eq!(w.start, day(17, 0)); // Monday 2025-03-17
        assert_eq!(w.end, day(24, 0));
    }

    #[test]
    fn test_clock_windows() {
        let m = derive_window("am I available in the morning", now(), utc());
        assert_eq!((m.start, m.end), (day(12, 8), day(12, 12)));

        let a = derive_window("check my afternoon", now(), utc());
        assert_eq!((a.start, a.end), (day(12, 12), day(12, 18)));

        let e = derive_window("am I available this evening", now(), utc());
        assert_eq!((e.start, e.end), (day(12, 18), day(12, 22)));
    }

    #[test]
    fn test_exactly_one_rule_applies() {
        // "tomorrow" outranks "morning".
        let w = derive_window("am I available tomorrow morning", now(), utc());
        assert_eq!(w.start, day(13, 0));
        assert_eq!(w.end, day(14, 0));
    }

    #[test]
    fn test_default_window_is_next_24_hours() {
        let w = derive_window("am I available", now(), utc());
        assert_eq!(w.start, now());
        assert_eq!(w.end, now() + Duration::hours(24));
    }

    #[test]
    fn test_window_respects_timezone() {
        // UTC-5: "tomorrow" starts at 05:00 UTC.
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let w = derive_window("what's on my calendar tomorrow", now(), tz);
        assert_eq!(w.start, day(13, 5));
        assert_eq!(w.end, day(14, 5));
    }
}
