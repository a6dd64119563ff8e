use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_EVENT_SOURCE: &str = "appointment-service";
pub const DEFAULT_SUGGESTION_PROXIMITY_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub redis_url: Option<String>,
    pub event_source: String,
    pub event_topic_prefix: String,
    pub suggestion_proximity_days: i64,
    pub hourly_tick_seconds: u64,
    pub minute_tick_seconds: u64,
    /// Stamp `sent_date` in the selecting transaction before publishing.
    pub notification_claim_before_send: bool,
    pub scheduler_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            redis_url: None,
            event_source: DEFAULT_EVENT_SOURCE.to_string(),
            event_topic_prefix: String::new(),
            suggestion_proximity_days: DEFAULT_SUGGESTION_PROXIMITY_DAYS,
            hourly_tick_seconds: 3600,
            minute_tick_seconds: 60,
            notification_claim_before_send: false,
            scheduler_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            event_source: env::var("EVENT_SOURCE")
                .unwrap_or_else(|_| defaults.event_source.clone()),
            event_topic_prefix: env::var("EVENT_TOPIC_PREFIX").unwrap_or_default(),
            suggestion_proximity_days: parse_var(
                "SUGGESTION_PROXIMITY_DAYS",
                defaults.suggestion_proximity_days,
            ),
            hourly_tick_seconds: parse_var("HOURLY_TICK_SECONDS", defaults.hourly_tick_seconds),
            minute_tick_seconds: parse_var("MINUTE_TICK_SECONDS", defaults.minute_tick_seconds),
            notification_claim_before_send: parse_var(
                "NOTIFICATION_CLAIM_BEFORE_SEND",
                defaults.notification_claim_before_send,
            ),
            scheduler_enabled: parse_var("SCHEDULER_ENABLED", defaults.scheduler_enabled),
        };

        if !config.is_supabase_configured() {
            warn!("Supabase not configured - clinic settings and patient directory fall back to local defaults");
        }
        if !config.is_redis_configured() {
            warn!("REDIS_URL not set - domain events will only be logged");
        }

        config
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
