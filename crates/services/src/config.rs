use std::env;
use std::time::Duration;

use onboard_core::model::RESUME_CEILING_PERCENT;

use crate::error::ConfigError;

/// Timing and threshold knobs for `VideoProgressTracker`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Quiet period after the last time-advance before a save fires.
    pub save_debounce: Duration,
    /// How long an unanswered resume prompt stays on screen.
    pub prompt_timeout: Duration,
    /// Lifetime of the "video completed" notification.
    pub notification_ttl: Duration,
    /// Stored progress at or above this percentage never prompts.
    pub resume_ceiling_percent: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_secs(5),
            prompt_timeout: Duration::from_secs(10),
            notification_ttl: Duration::from_secs(5),
            resume_ceiling_percent: RESUME_CEILING_PERCENT,
        }
    }
}

impl TrackerConfig {
    /// Defaults overridden by `ONBOARD_SAVE_DEBOUNCE_MS`, `ONBOARD_PROMPT_TIMEOUT_MS`,
    /// `ONBOARD_NOTIFICATION_TTL_MS` and `ONBOARD_RESUME_CEILING_PERCENT`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let millis = |key: &'static str| -> Result<Option<Duration>, ConfigError> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|_| ConfigError::Invalid { key, raw })
                })
                .transpose()
        };

        if let Some(value) = millis("ONBOARD_SAVE_DEBOUNCE_MS")? {
            config.save_debounce = value;
        }
        if let Some(value) = millis("ONBOARD_PROMPT_TIMEOUT_MS")? {
            config.prompt_timeout = value;
        }
        if let Some(value) = millis("ONBOARD_NOTIFICATION_TTL_MS")? {
            config.notification_ttl = value;
        }
        if let Some(raw) = lookup("ONBOARD_RESUME_CEILING_PERCENT") {
            let key = "ONBOARD_RESUME_CEILING_PERCENT";
            let value = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| (0.0..=100.0).contains(v))
                .ok_or(ConfigError::Invalid { key, raw })?;
            config.resume_ceiling_percent = value;
        }

        Ok(config)
    }
}
