//! Forward search for alternative slots.
//!
//! A deterministic linear scan, not an optimizer: step from the preferred
//! start in fixed increments, keep candidates whose whole interval sits
//! inside a single day's business-hours window and whose conflict check
//! comes back empty. Conflict checks are issued sequentially so calendar
//! reads stay monotonic and the gateway is never flooded.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use uuid::Uuid;

use super::Scheduler;
use crate::calendar::gateway::GatewayError;
use crate::config::SchedulerConfig;
use crate::time::{add_minutes, step_forward};

/// True iff `[candidate, candidate + duration)` lies fully inside the
/// business-hours window of one day, evaluated in `tz`.
pub fn fits_business_hours(
    candidate: DateTime<Utc>,
    duration_minutes: i64,
    config: &SchedulerConfig,
    tz: FixedOffset,
) -> bool {
    let local = candidate.with_timezone(&tz);
    let date = local.date_naive();
    let Some(day_open) = date
        .and_hms_opt(config.business_start_hour, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).single())
    else {
        return false;
    };
    let day_close =
        day_open + Duration::hours((config.business_end_hour - config.business_start_hour) as i64);

    let end = local + Duration::minutes(duration_minutes);
    local >= day_open && end <= day_close
}

impl Scheduler {
    /// Searches forward from `preferred_start` for up to `count` free,
    /// business-hours slots of `duration_minutes`.
    ///
    /// The horizon is bounded; exhausting it returns whatever was found,
    /// possibly nothing. Results are pairwise distinct and strictly
    /// increasing by construction. Each slot was conflict-free at generation
    /// time — a concurrent writer may have taken it since.
    pub async fn propose_alternatives(
        &self,
        user_id: Uuid,
        preferred_start: DateTime<Utc>,
        duration_minutes: i64,
        count: usize,
        tz: FixedOffset,
    ) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        if duration_minutes <= 0 || count == 0 {
            return Ok(Vec::new());
        }

        let config = self.config().clone();
        let horizon_end = preferred_start + Duration::days(config.search_horizon_days);
        let mut found = Vec::with_capacity(count);
        let mut candidate = preferred_start;

        while candidate < horizon_end && found.len() < count {
            if fits_business_hours(candidate, duration_minutes, &config, tz) {
                let end = add_minutes(candidate, duration_minutes);
                // One sequential read per candidate, by design.
                let conflicts = self.find_conflicts(user_id, candidate, end, None).await?;
                if conflicts.is_empty() {
                    found.push(candidate);
                }
            }
            candidate = step_forward(candidate, config.slot_step_minutes);
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::fake::FakeCalendarGateway;
    use crate::models::event::CalendarEvent;
    use crate::time::overlaps;
    use chrono::{TimeZone, Timelike};
    use std::sync::Arc;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, min, 0).unwrap()
    }

    fn existing(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: id.to_string(),
            start,
            end,
            location: None,
            attendees: vec![],
            recurring: false,
        }
    }

    fn scheduler(gateway: Arc<FakeCalendarGateway>) -> Scheduler {
        Scheduler::new(gateway, SchedulerConfig::default())
    }

    #[test]
    fn test_fits_business_hours_boundaries() {
        let cfg = SchedulerConfig::default();
        // 09:00 + 30m fits; 08:30 does not start inside the window.
        assert!(fits_business_hours(at(10, 9, 0), 30, &cfg, utc()));
        assert!(!fits_business_hours(at(10, 8, 30), 30, &cfg, utc()));
        // 16:30 + 30m ends exactly at close: contained.
        assert!(fits_business_hours(at(10, 16, 30), 30, &cfg, utc()));
        // 16:45 + 30m spills past close.
        assert!(!fits_business_hours(at(10, 16, 45), 30, &cfg, utc()));
    }

    #[test]
    fn test_fits_business_hours_respects_timezone() {
        let cfg = SchedulerConfig::default();
        // 14:00 UTC is 09:00 in UTC-5: inside; in UTC it is already afternoon.
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        assert!(fits_business_hours(at(10, 14, 0), 30, &cfg, tz));
        assert!(!fits_business_hours(at(10, 13, 0), 30, &cfg, tz));
    }

    #[tokio::test]
    async fn test_alternatives_skip_busy_block() {
        // 10:00-12:00 is busy; searching from 10:00 lands at 12:00.
        let gateway = Arc::new(FakeCalendarGateway::with_events(vec![existing(
            "block",
            at(10, 10, 0),
            at(10, 12, 0),
        )]));
        let sched = scheduler(gateway);
        let user = Uuid::new_v4();

        let alts = sched
            .propose_alternatives(user, at(10, 10, 0), 30, 3, utc())
            .await
            .unwrap();

        assert_eq!(alts, vec![at(10, 12, 0), at(10, 12, 30), at(10, 13, 0)]);
    }

    #[tokio::test]
    async fn test_alternatives_after_hours_roll_to_next_morning() {
        let gateway = Arc::new(FakeCalendarGateway::new());
        let sched = scheduler(gateway);
        let user = Uuid::new_v4();

        let alts = sched
            .propose_alternatives(user, at(10, 18, 0), 30, 1, utc())
            .await
            .unwrap();

        assert_eq!(alts, vec![at(11, 9, 0)]);
    }

    #[tokio::test]
    async fn test_alternatives_strictly_increasing_unique_in_hours() {
        let gateway = Arc::new(FakeCalendarGateway::with_events(vec![
            existing("a", at(10, 9, 0), at(10, 10, 30)),
            existing("b", at(10, 11, 0), at(10, 11, 15)),
        ]));
        let sched = scheduler(gateway.clone());
        let user = Uuid::new_v4();
        let cfg = SchedulerConfig::default();

        let alts = sched
            .propose_alternatives(user, at(10, 9, 0), 60, 5, utc())
            .await
            .unwrap();

        assert_eq!(alts.len(), 5);
        for pair in alts.windows(2) {
            assert!(pair[0] < pair[1], "results must be strictly increasing");
        }
        for slot in &alts {
            let hour = slot.with_timezone(&utc()).hour();
            assert!((9..17).contains(&hour), "slot {slot} outside business hours");
            assert!(fits_business_hours(*slot, 60, &cfg, utc()));
            let end = add_minutes(*slot, 60);
            for event in gateway.events() {
                assert!(
                    !overlaps(event.start, event.end, *slot, end),
                    "slot {slot} conflicts with {}",
                    event.id
                );
            }
        }
    }

    #[tokio::test]
    async fn test_full_day_duration_only_fits_at_open() {
        let gateway = Arc::new(FakeCalendarGateway::new());
        let sched = scheduler(gateway);
        let user = Uuid::new_v4();

        // Eight hours fills the whole window: only 09:00 starts qualify.
        let alts = sched
            .propose_alternatives(user, at(10, 9, 0), 8 * 60, 2, utc())
            .await
            .unwrap();
        assert_eq!(alts, vec![at(10, 9, 0), at(11, 9, 0)]);
    }

    #[tokio::test]
    async fn test_exhausted_horizon_returns_partial_or_empty() {
        let gateway = Arc::new(FakeCalendarGateway::new());
        let sched = scheduler(gateway);
        let user = Uuid::new_v4();

        // Ten hours never fits an eight-hour window anywhere in the horizon.
        let alts = sched
            .propose_alternatives(user, at(10, 9, 0), 10 * 60, 3, utc())
            .await
            .unwrap();
        assert!(alts.is_empty());
    }
}
