use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,

    /// Base URL of the moderation classifier function.
    pub moderation_url: String,
    /// Base URL of the content-generation / email functions.
    pub functions_url: String,
    /// Bearer token shared with the serverless functions.
    pub functions_token: String,

    /// Public base URL used in listing links sent by email.
    pub listing_base_url: String,

    /// Quiet period for draft autosave, in milliseconds.
    pub autosave_debounce_ms: u64,
    /// How often the outbox worker polls for due tasks, in seconds.
    pub outbox_poll_secs: u64,
    /// Scheduling window for generated social posts, in days.
    pub social_window_days: i64,
    /// Attempts before an outbox task is marked failed.
    pub outbox_max_attempts: i32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("GATE").separator("_"))
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("listing_base_url", "https://market.example.com")?
            .set_default("autosave_debounce_ms", 2000)?
            .set_default("outbox_poll_secs", 15)?
            .set_default("social_window_days", 7)?
            .set_default("outbox_max_attempts", 3)?
            .build()?;

        config.try_deserialize()
    }
}
