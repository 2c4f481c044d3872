use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub notifiers: NotifiersSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// `<store-location>,<routing-config-path>`
    #[serde(default = "default_open_string")]
    pub open_string: String,
    /// Persist notifications but never hand them to a notifier
    #[serde(default)]
    pub never_send: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Routing config reload interval in seconds
    #[serde(default = "default_reload_interval")]
    pub reload_interval_seconds: u64,
    /// Scheduled delivery interval in seconds
    #[serde(default = "default_delivery_interval")]
    pub delivery_interval_seconds: u64,
    /// How long shutdown waits for in-flight dispatches, in seconds
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifiersSettings {
    #[serde(default)]
    pub log: LogNotifierSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogNotifierSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_open_string() -> String {
    "notifications.db,routing.json".to_string()
}

fn default_reload_interval() -> u64 {
    300 // 5 minutes
}

fn default_delivery_interval() -> u64 {
    60 // 1 minute
}

fn default_drain_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("backend.open_string", default_open_string())?
            .set_default("backend.never_send", false)?
            .set_default("scheduler.reload_interval_seconds", default_reload_interval())?
            .set_default("scheduler.delivery_interval_seconds", default_delivery_interval())?
            .set_default("scheduler.drain_timeout_seconds", default_drain_timeout())?
            .set_default("notifiers.log.enabled", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // HERALD_BACKEND__OPEN_STRING, HERALD_BACKEND__NEVER_SEND, HERALD_SCHEDULER__..., etc.
            .add_source(
                Environment::with_prefix("HERALD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl SchedulerSettings {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_seconds.max(1))
    }

    pub fn delivery_interval(&self) -> Duration {
        Duration::from_secs(self.delivery_interval_seconds.max(1))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            open_string: default_open_string(),
            never_send: false,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            reload_interval_seconds: default_reload_interval(),
            delivery_interval_seconds: default_delivery_interval(),
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

impl Default for LogNotifierSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.backend.open_string, "notifications.db,routing.json");
        assert!(!settings.backend.never_send);
        assert_eq!(settings.scheduler.reload_interval(), Duration::from_secs(300));
        assert_eq!(settings.scheduler.delivery_interval(), Duration::from_secs(60));
        assert_eq!(settings.scheduler.drain_timeout(), Duration::from_secs(10));
        assert!(settings.notifiers.log.enabled);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let scheduler = SchedulerSettings {
            reload_interval_seconds: 0,
            delivery_interval_seconds: 0,
            drain_timeout_seconds: 0,
        };
        assert_eq!(scheduler.reload_interval(), Duration::from_secs(1));
        assert_eq!(scheduler.delivery_interval(), Duration::from_secs(1));
        assert_eq!(scheduler.drain_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_partial_source_uses_field_defaults() {
        let settings: Settings = Config::builder()
            .set_override("backend.never_send", true)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(settings.backend.never_send);
        assert_eq!(settings.backend.open_string, "notifications.db,routing.json");
        assert_eq!(settings.scheduler.delivery_interval_seconds, 60);
    }
}
