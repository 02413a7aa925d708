use std::str::FromStr;

use serde::Deserialize;
use uuid::Uuid;

/// A recipient-suffix routing rule: recipients ending with `suffix` go to `channel_id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutingRuleConfig {
    pub suffix: String,
    pub channel_id: Uuid,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Address the HTTP server binds to (default: 0.0.0.0:3000)
    pub bind_addr: String,

    /// Secret used to verify bearer tokens issued by the identity provider
    pub jwt_secret: String,

    /// Language used when a template has no content for the requested one
    pub default_language: String,

    /// Channel used when neither the request nor a routing rule selects one
    pub default_channel_id: Option<Uuid>,

    /// Recipient-suffix routing rules, evaluated in order
    pub routing_rules: Vec<RoutingRuleConfig>,

    /// Upper bound on concurrent sender invocations (default: 16)
    pub dispatch_max_concurrency: usize,

    /// Hard timeout for a single sender invocation in milliseconds (default: 15000)
    pub send_timeout_ms: u64,

    /// Largest page size accepted by the send record query (default: 100)
    pub send_records_max_page_size: u32,

    /// Replace every transport with the debug transport
    pub channel_debug_enabled: bool,

    /// Lower bound of the simulated debug transport latency
    pub channel_debug_min_sleep_ms: u64,

    /// Upper bound of the simulated debug transport latency
    pub channel_debug_max_sleep_ms: u64,

    /// Test sends allowed per user within one window (default: 5)
    pub test_send_max_requests: u32,

    /// Length of the test-send rate limit window in seconds (default: 60)
    pub test_send_window_secs: u64,

    /// Longest accepted test-send target
    pub test_send_max_target_length: usize,

    /// Longest accepted test-send content
    pub test_send_max_content_length: usize,

    /// Secret sealing sensitive channel properties at rest; unset disables decryption
    pub property_secret: Option<String>,

    /// Key fragments marking a channel property as sensitive
    pub sensitive_property_keys: Vec<String>,

    /// Emit logs as JSON lines
    pub json_logs: bool,
}

/// `SEND_TIMEOUT_MS` when unset.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 15_000;

/// Matchers used when `SENSITIVE_PROPERTY_KEYS` is unset.
pub const DEFAULT_SENSITIVE_PROPERTY_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "apikey",
    "api_key",
    "accesskey",
    "privatekey",
];

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .unwrap_or_else(|_| "en".to_string()),
            default_channel_id: match std::env::var("DEFAULT_CHANNEL_ID") {
                Ok(raw) if !raw.trim().is_empty() => Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| anyhow::anyhow!("DEFAULT_CHANNEL_ID must be a valid UUID"))?,
                ),
                _ => None,
            },
            routing_rules: parse_routing_rules(
                &std::env::var("ROUTING_RULES").unwrap_or_default(),
            )?,
            dispatch_max_concurrency: env_or("DISPATCH_MAX_CONCURRENCY", 16)?,
            send_timeout_ms: env_or("SEND_TIMEOUT_MS", DEFAULT_SEND_TIMEOUT_MS)?,
            send_records_max_page_size: env_or("SEND_RECORDS_MAX_PAGE_SIZE", 100)?,
            channel_debug_enabled: env_or("CHANNEL_DEBUG_ENABLED", false)?,
            channel_debug_min_sleep_ms: env_or("CHANNEL_DEBUG_MIN_SLEEP_MS", 60)?,
            channel_debug_max_sleep_ms: env_or("CHANNEL_DEBUG_MAX_SLEEP_MS", 120)?,
            test_send_max_requests: env_or("TEST_SEND_MAX_REQUESTS", 5)?,
            test_send_window_secs: env_or("TEST_SEND_WINDOW_SECS", 60)?,
            test_send_max_target_length: env_or("TEST_SEND_MAX_TARGET_LENGTH", 255)?,
            test_send_max_content_length: env_or("TEST_SEND_MAX_CONTENT_LENGTH", 2000)?,
            property_secret: std::env::var("PROPERTY_ENCRYPTION_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            sensitive_property_keys: match std::env::var("SENSITIVE_PROPERTY_KEYS") {
                Ok(raw) => parse_key_list(&raw),
                Err(_) => DEFAULT_SENSITIVE_PROPERTY_KEYS
                    .iter()
                    .map(|k| k.to_string())
                    .collect(),
            },
            json_logs: env_or("JSON_LOGS", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that parse individually but cannot work together.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch_max_concurrency == 0 {
            anyhow::bail!("DISPATCH_MAX_CONCURRENCY must be greater than 0");
        }
        if self.send_records_max_page_size == 0 {
            anyhow::bail!("SEND_RECORDS_MAX_PAGE_SIZE must be greater than 0");
        }
        if self.channel_debug_max_sleep_ms < self.channel_debug_min_sleep_ms {
            anyhow::bail!(
                "CHANNEL_DEBUG_MAX_SLEEP_MS must be greater than or equal to CHANNEL_DEBUG_MIN_SLEEP_MS"
            );
        }
        if self.test_send_max_requests == 0 {
            anyhow::bail!("TEST_SEND_MAX_REQUESTS must be greater than 0");
        }
        Ok(())
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated list, dropping blank entries.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `ROUTING_RULES`, a `;`-separated list of `suffix=channel-uuid` pairs.
pub fn parse_routing_rules(raw: &str) -> anyhow::Result<Vec<RoutingRuleConfig>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (suffix, channel) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("ROUTING_RULES entry '{}' must be suffix=uuid", entry))?;
            let suffix = suffix.trim();
            if suffix.is_empty() {
                anyhow::bail!("ROUTING_RULES entry '{}' has an empty suffix", entry);
            }
            let channel_id = channel.trim().parse().map_err(|_| {
                anyhow::anyhow!("ROUTING_RULES entry '{}' has an invalid channel id", entry)
            })?;
            Ok(RoutingRuleConfig {
                suffix: suffix.to_string(),
                channel_id,
            })
        })
        .collect()
}
