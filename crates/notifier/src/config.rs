//! Validated, immutable sender configurations.
//!
//! Secrets live only in these structs. Their `Debug` impls redact them, and
//! nothing here implements `Serialize`.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigValidationError;
use crate::properties::{Properties, PropertyReader};
use crate::schema::ProtocolSchema;

/// Concrete transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderType {
    #[serde(rename = "SMTP")]
    Smtp,
    #[serde(rename = "HTTP_API", alias = "HTTP")]
    HttpApi,
    #[serde(rename = "DINGTALK")]
    DingTalk,
    #[serde(rename = "WECHAT_WORK")]
    WechatWork,
    #[serde(rename = "DEBUG")]
    Debug,
}

impl SenderType {
    pub const ALL: [SenderType; 5] = [
        SenderType::Smtp,
        SenderType::HttpApi,
        SenderType::DingTalk,
        SenderType::WechatWork,
        SenderType::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Smtp => "SMTP",
            SenderType::HttpApi => "HTTP_API",
            SenderType::DingTalk => "DINGTALK",
            SenderType::WechatWork => "WECHAT_WORK",
            SenderType::Debug => "DEBUG",
        }
    }
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderType {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        if normalized == "HTTP" {
            return Ok(SenderType::HttpApi);
        }
        SenderType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ConfigValidationError::UnknownSenderType(s.to_string()))
    }
}

/// Fixed-delay retry settings shared by every network transport.
///
/// A send makes at most `1 + max_retries` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    fn read(reader: &mut PropertyReader<'_>) -> Self {
        Self {
            max_retries: reader.number_in("maxRetries", 1).unwrap_or(1),
            retry_delay: reader.duration("retryDelay").unwrap_or_default(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Longest a retried send can take when every attempt runs for `per_attempt`.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        per_attempt * self.attempts() + self.retry_delay * self.max_retries
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub ssl_enabled: bool,
    /// Falls back to `username` when unset
    pub from: Option<String>,
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl SmtpConfig {
    pub fn from_address(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }

    fn read(reader: &mut PropertyReader<'_>) -> Self {
        Self {
            host: reader.string("host").unwrap_or_default(),
            port: reader.number_in("port", 1).unwrap_or_default(),
            username: reader.string("username").unwrap_or_default(),
            password: reader.string("password").unwrap_or_default(),
            ssl_enabled: reader.boolean("sslEnabled").unwrap_or(true),
            from: reader.string("from"),
            connection_timeout: reader.duration("connectionTimeout").unwrap_or_default(),
            read_timeout: reader.duration("readTimeout").unwrap_or_default(),
            retry: RetryPolicy::read(reader),
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_enabled", &self.ssl_enabled)
            .field("from", &self.from)
            .field("connection_timeout", &self.connection_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct HttpApiConfig {
    pub base_url: String,
    pub path: String,
    pub api_key_header: String,
    pub api_key: String,
    pub from: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpApiConfig {
    /// `base_url` and `path` joined with exactly one slash.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    fn read(reader: &mut PropertyReader<'_>) -> Self {
        let config = Self {
            base_url: reader.string("baseUrl").unwrap_or_default(),
            path: reader.string("path").unwrap_or_default(),
            api_key_header: reader.string("apiKeyHeader").unwrap_or_default(),
            api_key: reader.string("apiKey").unwrap_or_default(),
            from: reader.string("from"),
            timeout: reader.duration("timeout").unwrap_or_default(),
            retry: RetryPolicy::read(reader),
        };
        if !config.base_url.is_empty()
            && let Err(problem) = parse_http_url(&config.base_url)
        {
            reader.violate("baseUrl", problem);
        }
        if !config.api_key_header.is_empty()
            && reqwest::header::HeaderName::from_bytes(config.api_key_header.as_bytes()).is_err()
        {
            reader.violate("apiKeyHeader", "is not a valid header name");
        }
        config
    }
}

impl std::fmt::Debug for HttpApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiConfig")
            .field("base_url", &self.base_url)
            .field("path", &self.path)
            .field("api_key_header", &self.api_key_header)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DingTalkConfig {
    /// Carries the robot's `access_token`
    pub webhook_url: String,
    /// Enables request signing when set
    pub secret: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl DingTalkConfig {
    fn read(reader: &mut PropertyReader<'_>) -> Self {
        let config = Self {
            webhook_url: reader.string("webhookUrl").unwrap_or_default(),
            secret: reader.string("secret"),
            timeout: reader.duration("timeout").unwrap_or_default(),
            retry: RetryPolicy::read(reader),
        };
        if !config.webhook_url.is_empty() {
            match parse_http_url(&config.webhook_url) {
                Err(problem) => reader.violate("webhookUrl", problem),
                Ok(url) if query_param(&url, "access_token").is_none() => {
                    reader.violate("webhookUrl", "must carry an access_token query parameter")
                }
                Ok(_) => {}
            }
        }
        config
    }
}

impl std::fmt::Debug for DingTalkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkConfig")
            .field("webhook_url", &redact_query(&self.webhook_url))
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct WechatWorkConfig {
    pub webhook_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl WechatWorkConfig {
    fn read(reader: &mut PropertyReader<'_>) -> Self {
        let config = Self {
            webhook_url: reader.string("webhookUrl").unwrap_or_default(),
            timeout: reader.duration("timeout").unwrap_or_default(),
            retry: RetryPolicy::read(reader),
        };
        if !config.webhook_url.is_empty()
            && let Err(problem) = parse_http_url(&config.webhook_url)
        {
            reader.violate("webhookUrl", problem);
        }
        config
    }
}

impl std::fmt::Debug for WechatWorkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatWorkConfig")
            .field("webhook_url", &redact_query(&self.webhook_url))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub simulate_failure: bool,
}

impl DebugConfig {
    fn read(reader: &mut PropertyReader<'_>) -> Self {
        let config = Self {
            min_delay: reader.duration("minDelayMs").unwrap_or_default(),
            max_delay: reader.duration("maxDelayMs").unwrap_or_default(),
            simulate_failure: reader.boolean("simulateFailure").unwrap_or(false),
        };
        if !reader.has_violation("minDelayMs")
            && !reader.has_violation("maxDelayMs")
            && config.max_delay < config.min_delay
        {
            reader.violate("maxDelayMs", "must be greater than or equal to minDelayMs");
        }
        config
    }
}

/// A validated configuration for exactly one sender type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderConfig {
    Smtp(SmtpConfig),
    HttpApi(HttpApiConfig),
    DingTalk(DingTalkConfig),
    WechatWork(WechatWorkConfig),
    Debug(DebugConfig),
}

impl SenderConfig {
    /// Validate `values` against `schema`, reporting every problem at once.
    pub fn parse(
        schema: &ProtocolSchema,
        values: &Properties,
    ) -> Result<SenderConfig, ConfigValidationError> {
        let mut reader = PropertyReader::new(schema, values);
        let config = match schema.protocol {
            SenderType::Smtp => SenderConfig::Smtp(SmtpConfig::read(&mut reader)),
            SenderType::HttpApi => SenderConfig::HttpApi(HttpApiConfig::read(&mut reader)),
            SenderType::DingTalk => SenderConfig::DingTalk(DingTalkConfig::read(&mut reader)),
            SenderType::WechatWork => {
                SenderConfig::WechatWork(WechatWorkConfig::read(&mut reader))
            }
            SenderType::Debug => SenderConfig::Debug(DebugConfig::read(&mut reader)),
        };
        reader.finish()?;
        Ok(config)
    }

    /// Upper bound on one `send`, retries included.
    pub fn worst_case_duration(&self) -> Duration {
        match self {
            SenderConfig::Smtp(c) => c.retry.worst_case(c.connection_timeout + c.read_timeout),
            SenderConfig::HttpApi(c) => c.retry.worst_case(c.timeout),
            SenderConfig::DingTalk(c) => c.retry.worst_case(c.timeout),
            SenderConfig::WechatWork(c) => c.retry.worst_case(c.timeout),
            SenderConfig::Debug(c) => c.max_delay,
        }
    }

    pub fn sender_type(&self) -> SenderType {
        match self {
            SenderConfig::Smtp(_) => SenderType::Smtp,
            SenderConfig::HttpApi(_) => SenderType::HttpApi,
            SenderConfig::DingTalk(_) => SenderType::DingTalk,
            SenderConfig::WechatWork(_) => SenderType::WechatWork,
            SenderConfig::Debug(_) => SenderType::Debug,
        }
    }
}

/// An absolute `http`/`https` URL with a host, or the reason it is not one.
pub(crate) fn parse_http_url(raw: &str) -> Result<Url, &'static str> {
    let url = Url::parse(raw.trim()).map_err(|_| "must be a valid URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("must use http or https");
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("must include a host");
    }
    Ok(url)
}

/// Value of the first non-empty `name` query parameter.
pub(crate) fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Webhook URLs carry their credential in the query string.
pub(crate) fn redact_query(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            if url.query().is_some() {
                url.set_query(Some("redacted"));
            }
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
