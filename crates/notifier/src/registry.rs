//! Static registry of sender types, their schemas and the sender factory.
//!
//! Built once at startup and shared behind an `Arc`; nothing in it changes
//! afterwards, so reads take no locks.

use std::collections::HashMap;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::types::ChannelType;
use serde_json::Value;

use crate::config::{DebugConfig, SenderConfig, SenderType};
use crate::error::{ConfigValidationError, NotifierError};
use crate::properties::{as_object, merge_nested, protocol_name};
use crate::schema::{ChannelSchema, DebugDefaults, ProtocolSchema, protocol_schema};
use crate::sender::{
    DebugSender, DingTalkSender, HttpApiSender, Sender, SmtpSender, WechatWorkSender,
};

/// Sender types a channel type accepts, and its default when no protocol is given.
pub fn channel_protocols(channel_type: ChannelType) -> (&'static [SenderType], Option<SenderType>) {
    match channel_type {
        ChannelType::Email => (
            &[SenderType::Smtp, SenderType::HttpApi, SenderType::Debug],
            Some(SenderType::Smtp),
        ),
        ChannelType::Im => (
            &[SenderType::DingTalk, SenderType::WechatWork, SenderType::Debug],
            None,
        ),
        ChannelType::Sms | ChannelType::Push => (&[SenderType::Debug], Some(SenderType::Debug)),
    }
}

pub struct SenderRegistry {
    schemas: HashMap<SenderType, ProtocolSchema>,
    channels: HashMap<ChannelType, ChannelSchema>,
    /// When set, every build yields the debug transport with this config
    debug_override: Option<DebugConfig>,
    client: reqwest::Client,
}

impl SenderRegistry {
    /// Register the built-in sender types.
    pub fn builtin(
        client: reqwest::Client,
        debug_defaults: DebugDefaults,
        debug_override: bool,
    ) -> Self {
        let schemas: HashMap<_, _> = SenderType::ALL
            .into_iter()
            .map(|t| (t, protocol_schema(t, debug_defaults)))
            .collect();

        let channels = ChannelType::ALL
            .into_iter()
            .map(|channel_type| {
                let (protocols, default_protocol) = channel_protocols(channel_type);
                let schema = ChannelSchema {
                    default_protocol,
                    protocols: protocols
                        .iter()
                        .filter_map(|t| schemas.get(t).cloned())
                        .collect(),
                };
                (channel_type, schema)
            })
            .collect();

        let debug_override = debug_override.then(|| DebugConfig {
            min_delay: Duration::from_millis(debug_defaults.min_delay_ms),
            max_delay: Duration::from_millis(debug_defaults.max_delay_ms),
            simulate_failure: false,
        });

        Self {
            schemas,
            channels,
            debug_override,
            client,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifierError::Build(format!("HTTP client: {e}")))?;

        if config.channel_debug_enabled {
            tracing::warn!("Channel debug override enabled, every channel uses the debug transport");
        }

        Ok(Self::builtin(
            client,
            DebugDefaults {
                min_delay_ms: config.channel_debug_min_sleep_ms,
                max_delay_ms: config.channel_debug_max_sleep_ms,
            },
            config.channel_debug_enabled,
        ))
    }

    pub fn debug_override_enabled(&self) -> bool {
        self.debug_override.is_some()
    }

    pub fn schema_for_sender(&self, sender_type: SenderType) -> Option<&ProtocolSchema> {
        self.schemas.get(&sender_type)
    }

    pub fn schema_for_channel(&self, channel_type: ChannelType) -> Option<&ChannelSchema> {
        self.channels.get(&channel_type)
    }

    /// Validate properties for an explicitly chosen sender type.
    ///
    /// Values may sit at the root or under the type's `propertyKey` object.
    pub fn validate_sender(
        &self,
        sender_type: SenderType,
        raw: &Value,
    ) -> Result<SenderConfig, ConfigValidationError> {
        let schema = self
            .schema_for_sender(sender_type)
            .ok_or_else(|| ConfigValidationError::UnknownSenderType(sender_type.to_string()))?;
        let properties = as_object(raw)?;
        SenderConfig::parse(schema, &merge_nested(&properties, schema.property_key))
    }

    /// Validate the stored properties of a channel, resolving its protocol first.
    pub fn validate_channel(
        &self,
        channel_type: ChannelType,
        raw: &Value,
    ) -> Result<SenderConfig, ConfigValidationError> {
        let properties = as_object(raw)?;
        let (allowed, default) = channel_protocols(channel_type);

        let sender_type = match protocol_name(&properties) {
            Some(name) => name
                .parse::<SenderType>()
                .ok()
                .filter(|t| allowed.contains(t))
                .ok_or_else(|| ConfigValidationError::UnsupportedProtocol {
                    channel_type: channel_type.to_string(),
                    protocol: name.clone(),
                })?,
            None => default
                .ok_or_else(|| ConfigValidationError::ProtocolRequired(channel_type.to_string()))?,
        };

        self.validate_sender(sender_type, &Value::Object(properties))
    }

    /// Construct a live transport for `config`.
    pub fn build(&self, config: &SenderConfig) -> Result<Sender, NotifierError> {
        if let Some(debug) = &self.debug_override {
            tracing::debug!(
                sender_type = %config.sender_type(),
                "Debug override replaces configured transport"
            );
            return Ok(Sender::Debug(DebugSender::new(debug.clone())));
        }

        let sender = match config {
            SenderConfig::Smtp(c) => Sender::Smtp(SmtpSender::new(c.clone())?),
            SenderConfig::HttpApi(c) => {
                Sender::HttpApi(HttpApiSender::new(self.client.clone(), c.clone()))
            }
            SenderConfig::DingTalk(c) => {
                Sender::DingTalk(DingTalkSender::new(self.client.clone(), c.clone()))
            }
            SenderConfig::WechatWork(c) => {
                Sender::WechatWork(WechatWorkSender::new(self.client.clone(), c.clone()))
            }
            SenderConfig::Debug(c) => Sender::Debug(DebugSender::new(c.clone())),
        };
        Ok(sender)
    }
}
