//! Declarative property schemas, one per sender type.
//!
//! The same schema drives validation in [`crate::properties`] and is served to
//! clients so they can render a configuration form.

use serde::Serialize;

use crate::config::SenderType;

/// Data type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    /// A string that is never echoed back or logged
    Secret,
    Number,
    Boolean,
    /// Milliseconds, as a number or numeric string
    Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    /// Empty when the field has no default
    pub default_value: String,
    pub placeholder: &'static str,
}

impl FieldSchema {
    fn new(
        key: &'static str,
        label: &'static str,
        field_type: FieldType,
        required: bool,
        default_value: impl Into<String>,
        placeholder: &'static str,
    ) -> Self {
        Self {
            key,
            label,
            field_type,
            required,
            default_value: default_value.into(),
            placeholder,
        }
    }

    pub fn default(&self) -> Option<&str> {
        (!self.default_value.is_empty()).then_some(self.default_value.as_str())
    }
}

/// The form for one sender type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSchema {
    pub protocol: SenderType,
    pub label: &'static str,
    /// Name of the nested object that may carry this protocol's values
    pub property_key: &'static str,
    pub fields: Vec<FieldSchema>,
}

impl ProtocolSchema {
    pub fn field(&self, key: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// The protocols a channel type can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSchema {
    pub default_protocol: Option<SenderType>,
    pub protocols: Vec<ProtocolSchema>,
}

/// Defaults of the debug transport, taken from the application configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugDefaults {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DebugDefaults {
    fn default() -> Self {
        Self {
            min_delay_ms: 60,
            max_delay_ms: 120,
        }
    }
}

// Chosen so a default send, retries included, finishes inside the default
// dispatch timeout (`DEFAULT_SEND_TIMEOUT_MS`).
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 4_000;
pub const DEFAULT_SMTP_CONNECTION_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SMTP_READ_TIMEOUT_MS: u64 = 2_500;

fn retry_fields() -> [FieldSchema; 2] {
    [
        FieldSchema::new(
            "maxRetries",
            "Max retries",
            FieldType::Number,
            false,
            DEFAULT_MAX_RETRIES.to_string(),
            "2",
        ),
        FieldSchema::new(
            "retryDelay",
            "Retry delay (ms)",
            FieldType::Duration,
            false,
            DEFAULT_RETRY_DELAY_MS.to_string(),
            "500",
        ),
    ]
}

fn timeout_field() -> FieldSchema {
    FieldSchema::new(
        "timeout",
        "Timeout (ms)",
        FieldType::Duration,
        false,
        DEFAULT_HTTP_TIMEOUT_MS.to_string(),
        "4000",
    )
}

/// Build the schema for `sender_type`.
pub fn protocol_schema(sender_type: SenderType, debug: DebugDefaults) -> ProtocolSchema {
    use FieldType::*;

    let (label, property_key, mut fields) = match sender_type {
        SenderType::Smtp => (
            "SMTP",
            "smtp",
            vec![
                FieldSchema::new("host", "SMTP host", String, true, "", "smtp.example.com"),
                FieldSchema::new("port", "Port", Number, true, "465", "465"),
                FieldSchema::new("username", "Username", String, true, "", "user@example.com"),
                FieldSchema::new("password", "Password", Secret, true, "", ""),
                FieldSchema::new("sslEnabled", "Enable SSL", Boolean, false, "true", "true"),
                FieldSchema::new("from", "Sender address", String, false, "", "user@example.com"),
                FieldSchema::new(
                    "connectionTimeout",
                    "Connection timeout (ms)",
                    Duration,
                    false,
                    DEFAULT_SMTP_CONNECTION_TIMEOUT_MS.to_string(),
                    "2000",
                ),
                FieldSchema::new(
                    "readTimeout",
                    "Read timeout (ms)",
                    Duration,
                    false,
                    DEFAULT_SMTP_READ_TIMEOUT_MS.to_string(),
                    "2500",
                ),
            ],
        ),
        SenderType::HttpApi => (
            "HTTP API",
            "httpApi",
            vec![
                FieldSchema::new("baseUrl", "API base URL", String, true, "", "https://api.example.com"),
                FieldSchema::new("path", "Send path", String, true, "", "/api/mail/send"),
                FieldSchema::new(
                    "apiKeyHeader",
                    "Auth header",
                    String,
                    true,
                    "Authorization",
                    "Authorization",
                ),
                FieldSchema::new("apiKey", "API key", Secret, true, "", ""),
                FieldSchema::new("from", "Sender address", String, false, "", "user@example.com"),
                timeout_field(),
            ],
        ),
        SenderType::DingTalk => (
            "DingTalk robot",
            "dingTalk",
            vec![
                FieldSchema::new(
                    "webhookUrl",
                    "Webhook URL",
                    String,
                    true,
                    "",
                    "https://oapi.dingtalk.com/robot/send?access_token=xxx",
                ),
                FieldSchema::new("secret", "Signing secret", Secret, false, "", "SEC..."),
                timeout_field(),
            ],
        ),
        SenderType::WechatWork => (
            "WeChat Work robot",
            "wechatWork",
            vec![
                FieldSchema::new(
                    "webhookUrl",
                    "Webhook URL",
                    String,
                    true,
                    "",
                    "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=xxx",
                ),
                timeout_field(),
            ],
        ),
        SenderType::Debug => (
            "Debug",
            "debug",
            vec![
                FieldSchema::new(
                    "minDelayMs",
                    "Min delay (ms)",
                    Duration,
                    false,
                    debug.min_delay_ms.to_string(),
                    "60",
                ),
                FieldSchema::new(
                    "maxDelayMs",
                    "Max delay (ms)",
                    Duration,
                    false,
                    debug.max_delay_ms.to_string(),
                    "120",
                ),
                FieldSchema::new(
                    "simulateFailure",
                    "Simulate failure",
                    Boolean,
                    false,
                    "false",
                    "false",
                ),
            ],
        ),
    };

    if sender_type != SenderType::Debug {
        fields.extend(retry_fields());
    }

    ProtocolSchema {
        protocol: sender_type,
        label,
        property_key,
        fields,
    }
}
