//! Runtime configuration

use std::time::Duration;

/// Poll cadence used while the bus is in the foreground
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
/// Poll cadence used while the bus is backgrounded
pub const BACKGROUND_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Cadence an open, focused conversation asks the bus for
pub const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// A zero or near-zero interval would turn the poll timer into a busy loop
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Backgrounded conversations older than this re-initialize on resume
pub const INACTIVE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Tuning for the event bus and conversation agents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub default_poll_interval: Duration,
    pub background_poll_interval: Duration,
    pub active_poll_interval: Duration,
    /// Additional attempts after a retryable network failure
    pub network_retries: u32,
    /// Delay before the first retry; doubles on each subsequent attempt
    pub retry_backoff: Duration,
    pub history_page_size: u32,
    pub inactive_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: DEFAULT_POLL_INTERVAL,
            background_poll_interval: BACKGROUND_POLL_INTERVAL,
            active_poll_interval: ACTIVE_POLL_INTERVAL,
            network_retries: 2,
            retry_backoff: Duration::from_millis(500),
            history_page_size: 50,
            inactive_timeout: INACTIVE_TIMEOUT,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_poll_interval: env_interval(
                "CONVO_SYNC_DEFAULT_POLL_MS",
                defaults.default_poll_interval,
            ),
            background_poll_interval: env_interval(
                "CONVO_SYNC_BACKGROUND_POLL_MS",
                defaults.background_poll_interval,
            ),
            active_poll_interval: env_interval(
                "CONVO_SYNC_ACTIVE_POLL_MS",
                defaults.active_poll_interval,
            ),
            network_retries: env_parse("CONVO_SYNC_NETWORK_RETRIES")
                .unwrap_or(defaults.network_retries),
            retry_backoff: env_parse("CONVO_SYNC_RETRY_BACKOFF_MS")
                .map_or(defaults.retry_backoff, Duration::from_millis),
            history_page_size: env_parse("CONVO_SYNC_HISTORY_PAGE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_page_size),
            inactive_timeout: env_parse("CONVO_SYNC_INACTIVE_TIMEOUT_MS")
                .map_or(defaults.inactive_timeout, Duration::from_millis),
        }
    }
}

/// Connection settings for the chat service
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Base URL of the chat service (e.g. `https://api.bsky.chat`)
    pub service_url: Option<String>,
    pub access_token: Option<String>,
    /// Value for the `atproto-proxy` header when going through a PDS
    pub proxy: Option<String>,
    /// DID of the signed-in account; authors optimistic sends and reactions
    pub viewer_did: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            service_url: std::env::var("CHAT_SERVICE_URL").ok(),
            access_token: std::env::var("CHAT_ACCESS_TOKEN").ok(),
            proxy: std::env::var("CHAT_PROXY").ok(),
            viewer_did: std::env::var("CHAT_VIEWER_DID").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_interval(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key)
        .map_or(default, Duration::from_millis)
        .max(MIN_POLL_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ordered() {
        let config = SyncConfig::default();
        assert!(config.active_poll_interval < config.default_poll_interval);
        assert!(config.default_poll_interval < config.background_poll_interval);
        assert_eq!(config.network_retries, 2);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        std::env::set_var("CONVO_SYNC_TEST_ZERO_MS", "0");
        assert_eq!(
            env_interval("CONVO_SYNC_TEST_ZERO_MS", DEFAULT_POLL_INTERVAL),
            MIN_POLL_INTERVAL
        );
        std::env::remove_var("CONVO_SYNC_TEST_ZERO_MS");
    }

    #[test]
    fn test_unparseable_value_falls_back() {
        std::env::set_var("CONVO_SYNC_TEST_GARBAGE_MS", "soon");
        assert_eq!(
            env_interval("CONVO_SYNC_TEST_GARBAGE_MS", DEFAULT_POLL_INTERVAL),
            DEFAULT_POLL_INTERVAL
        );
        std::env::remove_var("CONVO_SYNC_TEST_GARBAGE_MS");
    }
}
