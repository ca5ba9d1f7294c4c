mod calendar;
mod config;
mod conversation;
mod db;
mod errors;
mod intent;
mod linkage;
mod models;
mod nlp;
mod routes;
mod scheduler;
mod state;
mod time;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::calendar::auth::CredentialStore;
use crate::calendar::HttpCalendarGateway;
use crate::config::Config;
use crate::conversation::{Dispatcher, SessionStore};
use crate::db::create_pool;
use crate::linkage::{LinkageQueue, PgThreadStore};
use crate::nlp::NlpClient;
use crate::routes::build_router;
use crate::scheduler::Scheduler;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting calendar assistant API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Calendar gateway with cached, auto-refreshing credentials
    let credentials = Arc::new(CredentialStore::new(
        db.clone(),
        config.calendar_token_url.clone(),
        Duration::from_secs(config.credential_cache_ttl_secs),
    ));
    let gateway = Arc::new(HttpCalendarGateway::new(
        config.calendar_base_url.clone(),
        credentials,
    ));
    info!("Calendar gateway initialized ({})", config.calendar_base_url);

    // NLP client
    let nlp = Arc::new(NlpClient::new(config.anthropic_api_key.clone()));
    info!("NLP client initialized (model: {})", nlp::MODEL);

    // Scheduler and dispatcher
    let scheduler = Arc::new(Scheduler::new(gateway.clone(), config.scheduler.clone()));
    let dispatcher = Arc::new(Dispatcher::new(scheduler, gateway));

    // Session and thread persistence, plus the async linkage queue
    let sessions = Arc::new(SessionStore::new(db.clone(), config.session_idle_hours));
    let threads = Arc::new(PgThreadStore::new(db));
    let linkage = LinkageQueue::new(threads.clone(), config.linkage.clone());

    let state = AppState {
        nlp,
        dispatcher,
        sessions,
        threads,
        linkage,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
