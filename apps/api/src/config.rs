use std::time::Duration;

use anyhow::{Context, Result};

/// Scheduling tunables. Defaults match the product behavior; everything is
/// overridable through the environment so business hours and search bounds
/// are injected rather than hard-coded at call sites.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// First bookable local clock hour (inclusive).
    pub business_start_hour: u32,
    /// Last bookable local clock hour (exclusive).
    pub business_end_hour: u32,
    /// Forward-search step for alternative slots, in minutes.
    pub slot_step_minutes: i64,
    /// How far ahead the alternative search may look.
    pub search_horizon_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            business_start_hour: 9,
            business_end_hour: 17,
            slot_step_minutes: 30,
            search_horizon_days: 14,
        }
    }
}

/// Linkage-queue tunables.
#[derive(Debug, Clone)]
pub struct LinkageConfig {
    /// Step-indexed retry delays; the last value repeats for later attempts.
    pub backoff: Vec<Duration>,
    /// Attempts before an item is dropped with a terminal failure.
    pub max_retries: u32,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        LinkageConfig {
            backoff: vec![
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(3000),
            ],
            max_retries: 5,
        }
    }
}

impl LinkageConfig {
    /// Delay before the next attempt, given how many attempts have been made.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let idx = (attempts.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[idx]
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub calendar_base_url: String,
    pub calendar_token_url: String,
    pub port: u16,
    pub rust_log: String,
    pub scheduler: SchedulerConfig,
    pub linkage: LinkageConfig,
    /// Sessions idle longer than this are treated as expired.
    pub session_idle_hours: i64,
    /// How long a fetched access token is served from cache.
    pub credential_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            calendar_base_url: require_env("CALENDAR_BASE_URL")?,
            calendar_token_url: require_env("CALENDAR_TOKEN_URL")?,
            port: env_or("PORT", "8080")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            scheduler: SchedulerConfig {
                business_start_hour: env_or("BUSINESS_START_HOUR", "9")?,
                business_end_hour: env_or("BUSINESS_END_HOUR", "17")?,
                slot_step_minutes: env_or("SLOT_STEP_MINUTES", "30")?,
                search_horizon_days: env_or("SEARCH_HORIZON_DAYS", "14")?,
            },
            linkage: LinkageConfig {
                max_retries: env_or("LINKAGE_MAX_RETRIES", "5")?,
                ..LinkageConfig::default()
            },
            session_idle_hours: env_or("SESSION_IDLE_HOURS", "6")?,
            credential_cache_ttl_secs: env_or("CREDENTIAL_CACHE_TTL_SECS", "300")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .with_context(|| format!("'{key}' must be a valid value"))
}
