//! Conflict-aware scheduler.
//!
//! Read-then-decide, not transactional: availability is checked against the
//! calendar of record and the create/update happens afterwards. A concurrent
//! writer landing between the check and the write can still double-book.
//! That race is accepted; callers are told so on `SchedulingOutcome`.

mod alternatives;

pub use alternatives::fits_business_hours;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::calendar::gateway::{CalendarGateway, GatewayError};
use crate::config::SchedulerConfig;
use crate::models::event::{CalendarEvent, EventSpec};
use crate::time::overlaps;

/// Alternatives offered alongside a conflict report.
const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed request, rejected before any remote call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Result of a conflict-checked create or update.
///
/// A conflict is a normal negative result, not an error: `success == false`
/// with the conflicting events and up to three alternative start times.
/// `needs_disambiguation` is set when the request targets a recurring event
/// and the caller must ask "single instance or whole series?" first.
///
/// `success == true` is best-effort: the availability check and the write
/// are separate calls, so a concurrent writer can still produce an overlap.
#[derive(Debug, Clone)]
pub struct SchedulingOutcome {
    pub success: bool,
    pub event: Option<CalendarEvent>,
    pub conflicts: Vec<CalendarEvent>,
    pub alternatives: Vec<DateTime<Utc>>,
    pub needs_disambiguation: bool,
}

impl SchedulingOutcome {
    fn created(event: CalendarEvent) -> Self {
        SchedulingOutcome {
            success: true,
            event: Some(event),
            conflicts: Vec::new(),
            alternatives: Vec::new(),
            needs_disambiguation: false,
        }
    }

    fn conflicted(conflicts: Vec<CalendarEvent>, alternatives: Vec<DateTime<Utc>>) -> Self {
        SchedulingOutcome {
            success: false,
            event: None,
            conflicts,
            alternatives,
            needs_disambiguation: false,
        }
    }

    fn disambiguation_required() -> Self {
        SchedulingOutcome {
            success: false,
            event: None,
            conflicts: Vec::new(),
            alternatives: Vec::new(),
            needs_disambiguation: true,
        }
    }
}

pub struct Scheduler {
    gateway: Arc<dyn CalendarGateway>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(gateway: Arc<dyn CalendarGateway>, config: SchedulerConfig) -> Self {
        Scheduler { gateway, config }
    }

    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn gateway(&self) -> &dyn CalendarGateway {
        self.gateway.as_ref()
    }

    /// True iff free/busy reports no busy blocks in `[start, end)`. Read-only.
    pub async fn check_availability(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        self.gateway.query_free_busy(user_id, start, end).await
    }

    /// Events overlapping `[start, end)`, excluding `exclude_id` (so an
    /// update does not conflict with itself).
    pub async fn find_conflicts(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let events = self.gateway.list_events(user_id, start, end).await?;
        Ok(events
            .into_iter()
            .filter(|e| exclude_id != Some(e.id.as_str()))
            .filter(|e| overlaps(e.start, e.end, start, end))
            .collect())
    }

    /// Creates an event iff the requested interval is conflict-free.
    pub async fn create_with_conflict_check(
        &self,
        user_id: Uuid,
        spec: &EventSpec,
        tz: FixedOffset,
    ) -> Result<SchedulingOutcome, SchedulerError> {
        self.conflict_checked_write(user_id, spec, None, tz).await
    }

    /// Same as `create_with_conflict_check`, but the event itself is excluded
    /// from the conflict search.
    pub async fn update_with_conflict_check(
        &self,
        user_id: Uuid,
        event_id: &str,
        spec: &EventSpec,
        tz: FixedOffset,
    ) -> Result<SchedulingOutcome, SchedulerError> {
        self.conflict_checked_write(user_id, spec, Some(event_id), tz)
            .await
    }

    async fn conflict_checked_write(
        &self,
        user_id: Uuid,
        spec: &EventSpec,
        exclude_id: Option<&str>,
        tz: FixedOffset,
    ) -> Result<SchedulingOutcome, SchedulerError> {
        if spec.duration_minutes <= 0 {
            return Err(SchedulerError::Validation(
                "duration must be positive".to_string(),
            ));
        }

        // Recurring requests are ambiguous (single instance vs. series);
        // refuse before touching the calendar rather than silently picking one.
        if spec.recurrence.is_some() {
            return Ok(SchedulingOutcome::disambiguation_required());
        }

        let conflicts = self
            .find_conflicts(user_id, spec.start, spec.end(), exclude_id)
            .await?;

        if !conflicts.is_empty() {
            debug!(
                user_id = %user_id,
                conflicts = conflicts.len(),
                "Requested interval is busy, searching alternatives"
            );
            let alternatives = self
                .propose_alternatives(
                    user_id,
                    spec.start,
                    spec.duration_minutes,
                    MAX_ALTERNATIVES,
                    tz,
                )
                .await?;
            return Ok(SchedulingOutcome::conflicted(conflicts, alternatives));
        }

        let event = match exclude_id {
            Some(id) => self.gateway.update_event(user_id, id, spec).await?,
            None => self.gateway.create_event(user_id, spec).await?,
        };
        Ok(SchedulingOutcome::created(event))
    }
}
