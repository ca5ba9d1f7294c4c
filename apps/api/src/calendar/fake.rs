//! In-memory calendar gateway used by scheduler and dispatcher tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calendar::gateway::{CalendarGateway, GatewayError};
use crate::models::event::{CalendarEvent, EventSpec};
use crate::time::overlaps;

#[derive(Default)]
pub struct FakeCalendarGateway {
    events: Mutex<Vec<CalendarEvent>>,
    next_id: AtomicU32,
    pub calls: AtomicU32,
    /// When set, every operation fails with this error kind.
    fail_auth: std::sync::atomic::AtomicBool,
}

impl FakeCalendarGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let fake = Self::new();
        *fake.events.lock().unwrap() = events;
        fake
    }

    pub fn fail_with_auth(&self) {
        self.fail_auth.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(GatewayError::AuthRequired);
        }
        Ok(())
    }

    fn materialize(&self, id: String, spec: &EventSpec) -> CalendarEvent {
        CalendarEvent {
            id,
            title: spec.title.clone(),
            start: spec.start,
            end: spec.end(),
            location: spec.location.clone(),
            attendees: spec.attendees.clone(),
            recurring: spec.recurrence.is_some(),
        }
    }
}

#[async_trait]
impl CalendarGateway for FakeCalendarGateway {
    async fn list_events(
        &self,
        _user_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        self.check()?;
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| overlaps(e.start, e.end, range_start, range_end))
            .cloned()
            .collect())
    }

    async fn get_event(
        &self,
        _user_id: Uuid,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, GatewayError> {
        self.check()?;
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == event_id)
            .cloned())
    }

    async fn create_event(
        &self,
        _user_id: Uuid,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, GatewayError> {
        self.check()?;
        let id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let event = self.materialize(id, spec);
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn update_event(
        &self,
        _user_id: Uuid,
        event_id: &str,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, GatewayError> {
        self.check()?;
        let updated = self.materialize(event_id.to_string(), spec);
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|e| e.id == event_id) {
            Some(slot) => {
                *slot = updated.clone();
                Ok(updated)
            }
            None => Err(GatewayError::RemoteUnavailable(format!(
                "no such event {event_id}"
            ))),
        }
    }

    async fn delete_event(&self, _user_id: Uuid, event_id: &str) -> Result<(), GatewayError> {
        self.check()?;
        self.events.lock().unwrap().retain(|e| e.id != event_id);
        Ok(())
    }

    async fn query_free_busy(
        &self,
        _user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        self.check()?;
        Ok(!self
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| overlaps(e.start, e.end, start, end)))
    }
}
