//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use parley_core::DEFAULT_USER_DOMAIN;

/// Error text for a destination the deliverability lookup rejects
pub const NOT_REGISTERED_ERROR: &str = "destination not registered";

/// Client configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Options handed to the transport
    pub transport: TransportOptions,
    /// Reconnect policy
    pub reconnect: ReconnectPolicy,
    /// Outbound dispatch
    pub dispatch: DispatchConfig,
    /// Inbound routing
    pub routing: RoutingConfig,
    /// Credential persistence
    pub credentials: CredentialsConfig,
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.transport.connect_timeout_ms == 0 {
            return Err("transport.connect_timeout_ms must be greater than 0".to_string());
        }
        if self.transport.keep_alive_interval_ms == 0 {
            return Err("transport.keep_alive_interval_ms must be greater than 0".to_string());
        }
        if self.reconnect.backoff_multiplier < 1.0 {
            return Err("reconnect.backoff_multiplier must be at least 1.0".to_string());
        }
        if self.reconnect.max_attempts == Some(0) {
            return Err("reconnect.max_attempts must be at least 1 (0 means unlimited)".to_string());
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err("reconnect.max_delay_ms must not be below initial_delay_ms".to_string());
        }
        if self.dispatch.user_domain.is_empty() || self.dispatch.user_domain.contains('@') {
            return Err("dispatch.user_domain must be a bare domain".to_string());
        }
        Ok(())
    }
}

/// Options recognized by the transport
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Upper bound on establishing the socket (milliseconds)
    pub connect_timeout_ms: u64,
    /// Liveness ping interval (milliseconds)
    pub keep_alive_interval_ms: u64,
    /// Per-query timeout (milliseconds); 0 means the library default
    pub default_query_timeout_ms: u64,
    /// Surface our own sent messages as inbound notifications
    pub emit_own_events: bool,
    /// Mark the account online when connecting
    pub mark_online_on_connect: bool,
    /// Client identity label: platform, browser, version
    pub browser: [String; 3],
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 60_000,
            keep_alive_interval_ms: 10_000,
            default_query_timeout_ms: 0,
            emit_own_events: true,
            mark_online_on_connect: true,
            browser: [
                "Ubuntu".to_string(),
                "Chrome".to_string(),
                "20.0.04".to_string(),
            ],
        }
    }
}

impl TransportOptions {
    /// Connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Keep-alive interval as Duration
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Per-query timeout, `None` meaning the library default
    pub fn query_timeout(&self) -> Option<Duration> {
        match self.default_query_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Reconnect policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay (milliseconds)
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    /// Written as `0` in config files.
    #[serde(with = "attempt_limit")]
    pub max_attempts: Option<u32>,
}

/// `max_attempts` on disk: `0` for unlimited, since TOML has no null
mod attempt_limit {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match u32::deserialize(deserializer)? {
            0 => None,
            max => Some(max),
        })
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay, unbounded attempts
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            backoff_multiplier: 1.0,
            max_attempts: None,
        }
    }

    /// Set the attempt bound
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Calculate delay for a reconnect attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Outbound dispatch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Domain appended to bare destinations
    pub user_domain: String,
    /// Error text returned when the lookup rejects a destination
    pub not_registered_error: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            user_domain: DEFAULT_USER_DOMAIN.to_string(),
            not_registered_error: NOT_REGISTERED_ERROR.to_string(),
        }
    }
}

/// Which handlers fire when several match one message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Only the first matching handler, in registration order
    #[default]
    FirstMatch,
    /// Every matching handler, in registration order
    AllMatches,
}

/// Inbound routing configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Match policy
    pub policy: DispatchPolicy,
}

/// Credential persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Credential directory; treat as secret
    pub dir: PathBuf,
    /// Discard stored credentials when the account is logged out
    pub clear_on_logout: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("auth_info"),
            clear_on_logout: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport.query_timeout(), None);
        assert_eq!(config.dispatch.not_registered_error, "destination not registered");
    }

    #[test]
    fn test_reconnect_delay() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for_attempt(0).as_millis(), 3_000);
        assert_eq!(policy.delay_for_attempt(1).as_millis(), 6_000);
        assert_eq!(policy.delay_for_attempt(2).as_millis(), 12_000);
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = ReconnectPolicy {
            max_delay_ms: 10_000,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(100).as_millis(), 10_000);
        assert_eq!(policy.delay_for_attempt(u32::MAX).as_millis(), 10_000);
    }

    #[test]
    fn test_fixed_policy() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(3_000));

        assert_eq!(policy.delay_for_attempt(0), policy.delay_for_attempt(50));
        assert!(policy.allows(u32::MAX - 1));
    }

    #[test]
    fn test_attempt_bound() {
        let policy = ReconnectPolicy::default().with_max_attempts(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ClientConfig::default();
        config.dispatch.user_domain = "x@y".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.reconnect.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"routing": {"policy": "all_matches"}}"#).unwrap();
        assert_eq!(config.routing.policy, DispatchPolicy::AllMatches);
        assert_eq!(config.reconnect.initial_delay_ms, 3_000);
        assert_eq!(config.reconnect.max_attempts, Some(10));
    }

    #[test]
    fn test_unlimited_attempts_written_as_zero() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(3));
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["max_attempts"], 0);

        let reloaded: ReconnectPolicy = serde_json::from_value(value).unwrap();
        assert_eq!(reloaded.max_attempts, None);

        let bounded: ReconnectPolicy = serde_json::from_str(r#"{"max_attempts": 4}"#).unwrap();
        assert_eq!(bounded.max_attempts, Some(4));
    }

    #[test]
    fn test_zero_attempt_bound_rejected() {
        let mut config = ClientConfig::default();
        config.reconnect.max_attempts = Some(0);
        assert!(config.validate().is_err());
    }
}
