//! Async linkage queue.
//!
//! Decouples "record a side-effect against thread X" from X's existence.
//! Producers enqueue and return immediately; a single cooperative drain task
//! retries each item on a step-indexed backoff schedule until the target
//! appears or the retry ceiling drops the item with a logged terminal
//! failure. Nothing is ever surfaced back to the originating request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LinkageConfig;
use crate::linkage::store::{StepRecord, ThreadStore};

/// Target identifier, decided once at the enqueue boundary.
///
/// `Fixed` is the primary-key form, `Token` the secondary lookup token.
/// Exactly one lookup strategy applies to a well-formed id; the form is
/// never re-sniffed on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Fixed(Uuid),
    Token(String),
}

impl Identifier {
    pub fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw) {
            Ok(id) => Identifier::Fixed(id),
            Err(_) => Identifier::Token(raw.to_string()),
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Fixed(id) => write!(f, "{id}"),
            Identifier::Token(token) => write!(f, "{token}"),
        }
    }
}

/// The two side-effect kinds, drained from independent FIFO queues.
#[derive(Debug, Clone)]
pub enum LinkagePayload {
    /// Append-only, non-idempotent by design: the producer calls it
    /// at-most-once per real event.
    AppendStep(StepRecord),
    /// Set-union, idempotent.
    AddLink { linked_id: String },
}

#[derive(Debug)]
struct QueueItem {
    target: Identifier,
    payload: LinkagePayload,
    attempts: u32,
    created_at: DateTime<Utc>,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
    not_before: Instant,
}

#[derive(Default)]
struct Inner {
    steps: VecDeque<QueueItem>,
    links: VecDeque<QueueItem>,
    /// Guards against re-entrant drains; enqueues during a drain are picked
    /// up by that same drain.
    draining: bool,
}

enum Next {
    Item(QueueItem),
    Wait(std::time::Duration),
    Empty,
}

pub struct LinkageQueue {
    store: Arc<dyn ThreadStore>,
    config: LinkageConfig,
    inner: Mutex<Inner>,
}

impl LinkageQueue {
    pub fn new(store: Arc<dyn ThreadStore>, config: LinkageConfig) -> Arc<Self> {
        Arc::new(LinkageQueue {
            store,
            config,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Enqueues a processing-step record against a thread that may not
    /// exist yet. Fire-and-forget.
    pub fn enqueue_step(self: &Arc<Self>, target: Identifier, step: StepRecord) {
        self.enqueue(target, LinkagePayload::AppendStep(step));
    }

    /// Enqueues a cross-entity link. Fire-and-forget, idempotent on apply.
    pub fn enqueue_link(self: &Arc<Self>, target: Identifier, linked_id: String) {
        self.enqueue(target, LinkagePayload::AddLink { linked_id });
    }

    /// Items still waiting, per queue: `(steps, links)`.
    pub fn pending(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.steps.len(), inner.links.len())
    }

    fn enqueue(self: &Arc<Self>, target: Identifier, payload: LinkagePayload) {
        let item = QueueItem {
            target,
            payload,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt: None,
            last_error: None,
            not_before: Instant::now(),
        };

        let start_drain = {
            let mut inner = self.inner.lock().unwrap();
            match &item.payload {
                LinkagePayload::AppendStep(_) => inner.steps.push_back(item),
                LinkagePayload::AddLink { .. } => inner.links.push_back(item),
            }
            if inner.draining {
                false
            } else {
                inner.draining = true;
                true
            }
        };

        if start_drain {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain().await });
        }
    }

    /// Single cooperative drain loop. Runs until both queues are empty, then
    /// clears the draining flag (under the same lock that checks emptiness,
    /// so a concurrent enqueue either lands before the check or starts a new
    /// drain).
    async fn drain(self: Arc<Self>) {
        loop {
            match self.take_next() {
                Next::Item(item) => self.process(item).await,
                Next::Wait(delay) => tokio::time::sleep(delay).await,
                Next::Empty => return,
            }
        }
    }

    /// Pops the first ready item, favoring the step queue; otherwise reports
    /// how long until something becomes ready.
    fn take_next(&self) -> Next {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        for queue in [&mut inner.steps, &mut inner.links] {
            if let Some(pos) = queue.iter().position(|i| i.not_before <= now) {
                // Preceding items are all backing off; FIFO among ready items.
                return Next::Item(queue.remove(pos).expect("position is in bounds"));
            }
        }

        let earliest = inner
            .steps
            .iter()
            .chain(inner.links.iter())
            .map(|i| i.not_before)
            .min();
        match earliest {
            Some(at) => Next::Wait(at.saturating_duration_since(now)),
            None => {
                inner.draining = false;
                Next::Empty
            }
        }
    }

    async fn process(&self, mut item: QueueItem) {
        item.attempts += 1;
        item.last_attempt = Some(Utc::now());

        // Exactly one lookup strategy per identifier form.
        let lookup = match &item.target {
            Identifier::Fixed(id) => self.store.find_by_id(*id).await,
            Identifier::Token(token) => self.store.find_by_token(token).await,
        };

        let thread = match lookup {
            Ok(found) => found,
            Err(e) => {
                item.last_error = Some(e.to_string());
                self.retry_or_drop(item);
                return;
            }
        };

        let Some(thread) = thread else {
            item.last_error = Some("target thread not found".to_string());
            self.retry_or_drop(item);
            return;
        };

        let applied = match &item.payload {
            LinkagePayload::AppendStep(step) => self.store.append_step(thread.id, step).await,
            LinkagePayload::AddLink { linked_id } => self.store.add_link(thread.id, linked_id).await,
        };

        match applied {
            Ok(()) => {
                debug!(target = %item.target, attempts = item.attempts, "Linkage applied");
            }
            Err(e) => {
                item.last_error = Some(e.to_string());
                self.retry_or_drop(item);
            }
        }
    }

    /// Rotates a failed item to the tail with its backoff delay, or drops it
    /// once the retry ceiling is reached. The drop is terminal: logged, never
    /// reported to the producer, never retried again.
    fn retry_or_drop(&self, mut item: QueueItem) {
        if item.attempts >= self.config.max_retries {
            warn!(
                target = %item.target,
                attempts = item.attempts,
                created_at = %item.created_at,
                error = item.last_error.as_deref().unwrap_or("unknown"),
                "Linkage exhausted, dropping item"
            );
            return;
        }

        item.not_before = Instant::now() + self.config.delay_for_attempt(item.attempts);
        let mut inner = self.inner.lock().unwrap();
        match &item.payload {
            LinkagePayload::AppendStep(_) => inner.steps.push_back(item),
            LinkagePayload::AddLink { .. } => inner.links.push_back(item),
        }
    }
}
