//! Tracking configuration and host environment
//!
//! The tracking identifier is the only switch the engine recognizes: when it is
//! absent (or blank) every component becomes a silent no-op.

use crate::error::TrackError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Environment variable holding the tracking identifier
pub const TRACKING_ID_ENV: &str = "PAGEPULSE_TRACKING_ID";

/// Default delay between the load signal and reading navigation timing
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Upper bound on the settle delay (one hour)
pub const MAX_SETTLE_DELAY_MS: u64 = 60 * 60 * 1000;

/// Session-scoped tracking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Analytics property identifier; `None` disables tracking
    #[serde(default)]
    pub tracking_id: Option<String>,
    /// Settle delay before the performance collector reads timing entries
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TrackingConfig {
    /// Enabled configuration for the given tracking identifier
    pub fn new(tracking_id: impl Into<String>) -> Self {
        Self {
            tracking_id: Some(tracking_id.into()),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }

    /// Configuration with tracking switched off
    pub fn disabled() -> Self {
        Self {
            tracking_id: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }

    /// Read the tracking identifier from `PAGEPULSE_TRACKING_ID`
    pub fn from_env() -> Self {
        match std::env::var(TRACKING_ID_ENV) {
            Ok(id) => Self::new(id),
            Err(_) => Self::disabled(),
        }
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, TrackError> {
        let config: TrackingConfig = serde_json::from_str(json)
            .map_err(|e| TrackError::InvalidConfig(e.to_string()))?;
        if config.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            return Err(TrackError::InvalidConfig(format!(
                "settle_delay_ms {} exceeds {}",
                config.settle_delay_ms, MAX_SETTLE_DELAY_MS
            )));
        }
        Ok(config)
    }

    /// Settle delay as a duration, capped at [`MAX_SETTLE_DELAY_MS`]
    pub fn settle_delay(&self) -> Duration {
        let millis = self.settle_delay_ms.min(MAX_SETTLE_DELAY_MS);
        Duration::milliseconds(millis as i64)
    }

    /// Override the settle delay
    pub fn with_settle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.settle_delay_ms = delay_ms;
        self
    }

    /// The tracking identifier, if it is present and non-blank
    pub fn active_tracking_id(&self) -> Option<&str> {
        self.tracking_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Whether tracking is enabled
    pub fn is_enabled(&self) -> bool {
        self.active_tracking_id().is_some()
    }
}

/// Facts reported by the hosting browser environment.
///
/// Read once when a session starts; none of these change afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Hostname of the current document (e.g. "example.dev")
    pub hostname: String,
    /// IANA timezone reported by the browser
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Negotiated locale (e.g. "en-US")
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Full referrer URL, if the visit came from another page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Document title at session start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl Environment {
    /// Environment for a document served from `hostname`
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            timezone: default_timezone(),
            locale: default_locale(),
            referrer: None,
            title: None,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tracking_id_is_disabled() {
        assert!(!TrackingConfig::new("   ").is_enabled());
        assert!(!TrackingConfig::disabled().is_enabled());
        assert!(TrackingConfig::new("G-TEST123").is_enabled());
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config = TrackingConfig::from_json(r#"{"tracking_id": "G-ABC"}"#).unwrap();
        assert_eq!(config.active_tracking_id(), Some("G-ABC"));
        assert_eq!(config.settle_delay_ms, DEFAULT_SETTLE_DELAY_MS);

        let config = TrackingConfig::from_json("{}").unwrap();
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_settle_delay_out_of_range() {
        let result =
            TrackingConfig::from_json(r#"{"tracking_id":"G-T","settle_delay_ms":9000000000000000}"#);
        assert!(matches!(result, Err(TrackError::InvalidConfig(_))));

        let config = TrackingConfig::from_json(r#"{"settle_delay_ms":3600000}"#).unwrap();
        assert_eq!(config.settle_delay(), Duration::hours(1));

        let config = TrackingConfig::new("G-T").with_settle_delay_ms(u64::MAX);
        assert_eq!(config.settle_delay(), Duration::hours(1));
    }

    #[test]
    fn test_config_from_invalid_json() {
        let result = TrackingConfig::from_json("not json");
        assert!(matches!(result, Err(TrackError::InvalidConfig(_))));
    }

    #[test]
    fn test_environment_deserialization() {
        let json = r#"{"hostname": "example.dev", "timezone": "Europe/Berlin"}"#;
        let env: Environment = serde_json::from_str(json).unwrap();
        assert_eq!(env.hostname, "example.dev");
        assert_eq!(env.timezone, "Europe/Berlin");
        assert_eq!(env.locale, "en-US");
        assert!(env.referrer.is_none());
    }
}
