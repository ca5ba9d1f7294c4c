use std::sync::Arc;

use crate::conversation::{Dispatcher, SessionStore};
use crate::linkage::{LinkageQueue, ThreadStore};
use crate::nlp::CommandParser;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable message parser. Production: `NlpClient` against the
    /// Anthropic API; tests swap in a scripted stub.
    pub nlp: Arc<dyn CommandParser>,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionStore>,
    pub threads: Arc<dyn ThreadStore>,
    pub linkage: Arc<LinkageQueue>,
}
