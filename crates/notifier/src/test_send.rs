//! One-off delivery with unsaved properties, used to check a configuration
//! before it is stored as a channel. Nothing is persisted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_common::config::AppConfig;
use courier_common::types::ChannelType;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{SenderConfig, SenderType};
use crate::error::{ConfigValidationError, NotifierError};
use crate::message::{MessageRequest, MessageResponse, codes};
use crate::rate_limit::RateLimiter;
use crate::registry::SenderRegistry;

pub const TEST_SUBJECT: &str = "Test message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestSendLimits {
    pub max_target_length: usize,
    pub max_content_length: usize,
    /// Hard bound on the single send, retries included
    pub send_timeout: Duration,
}

impl From<&AppConfig> for TestSendLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_target_length: config.test_send_max_target_length,
            max_content_length: config.test_send_max_content_length,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
        }
    }
}

/// What the configuration under test is: a channel or a bare sender type.
#[derive(Debug, Clone, Copy)]
enum Subject {
    Channel(ChannelType),
    Sender(SenderType),
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Channel(t) => write!(f, "channel {t}"),
            Subject::Sender(t) => write!(f, "sender {t}"),
        }
    }
}

#[derive(Clone)]
pub struct TestSendService {
    registry: Arc<SenderRegistry>,
    rate_limiter: Arc<dyn RateLimiter>,
    limits: TestSendLimits,
}

impl TestSendService {
    pub fn new(
        registry: Arc<SenderRegistry>,
        rate_limiter: Arc<dyn RateLimiter>,
        limits: TestSendLimits,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            limits,
        }
    }

    pub async fn test_channel(
        &self,
        user_id: &str,
        channel_type: ChannelType,
        properties: &Value,
        target: &str,
        content: &str,
    ) -> Result<MessageResponse, NotifierError> {
        self.run(user_id, Subject::Channel(channel_type), target, content, || {
            self.registry.validate_channel(channel_type, properties)
        })
        .await
    }

    pub async fn test_sender(
        &self,
        user_id: &str,
        sender_type: SenderType,
        properties: &Value,
        target: &str,
        content: &str,
    ) -> Result<MessageResponse, NotifierError> {
        self.run(user_id, Subject::Sender(sender_type), target, content, || {
            self.registry.validate_sender(sender_type, properties)
        })
        .await
    }

    fn check_lengths(&self, target: &str, content: &str) -> Result<(), NotifierError> {
        let mut problems = Vec::new();
        let target = target.trim();
        if target.is_empty() {
            problems.push("target is required".to_string());
        } else if target.chars().count() > self.limits.max_target_length {
            problems.push(format!(
                "target must be at most {} characters",
                self.limits.max_target_length
            ));
        }
        if content.trim().is_empty() {
            problems.push("content is required".to_string());
        } else if content.chars().count() > self.limits.max_content_length {
            problems.push(format!(
                "content must be at most {} characters",
                self.limits.max_content_length
            ));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Validation(problems.join("; ")))
        }
    }

    async fn run<V>(
        &self,
        user_id: &str,
        subject: Subject,
        target: &str,
        content: &str,
        validate: V,
    ) -> Result<MessageResponse, NotifierError>
    where
        V: FnOnce() -> Result<SenderConfig, ConfigValidationError>,
    {
        self.check_lengths(target, content)?;

        if !self.rate_limiter.try_acquire(user_id).await? {
            let settings = self.rate_limiter.settings();
            tracing::warn!(
                user_id,
                max_requests = settings.max_requests,
                window_secs = settings.window.as_secs(),
                "Test send rate limit exceeded"
            );
            return Err(NotifierError::RateLimited(
                "Too many test sends, try again later".to_string(),
            ));
        }

        let test_id = Uuid::new_v4();
        let config = match validate() {
            Ok(config) => config,
            Err(e) => {
                tracing::info!(user_id, %test_id, %subject, error = %e, "Test send rejected, invalid config");
                return Ok(MessageResponse::failure(codes::INVALID_CONFIG, e.to_string()));
            }
        };

        let sender = match self.registry.build(&config) {
            Ok(sender) => sender,
            Err(e) => {
                tracing::warn!(user_id, %test_id, %subject, error = %e, "Test send sender build failed");
                return Ok(MessageResponse::failure(codes::SENDER_BUILD_FAILED, e.to_string()));
            }
        };

        let mut message = MessageRequest::new(target.trim(), content)
            .with_subject(TEST_SUBJECT)
            .with_metadata("testSendId", test_id.to_string())
            .with_metadata("senderType", config.sender_type().as_str());
        if let Subject::Channel(channel_type) = subject {
            message = message.with_metadata("channelType", channel_type.as_str());
        }

        tracing::info!(
            user_id,
            %test_id,
            %subject,
            sender_type = %sender.sender_type(),
            "Test send started"
        );
        let started = Instant::now();
        let response =
            match tokio::time::timeout(self.limits.send_timeout, sender.send(&message)).await {
                Ok(response) => response,
                Err(_) => MessageResponse::failure(
                    codes::TIMEOUT,
                    format!(
                        "Send did not finish within {} ms",
                        self.limits.send_timeout.as_millis()
                    ),
                ),
            };
        tracing::info!(
            user_id,
            %test_id,
            success = response.is_success(),
            error_code = response.error_code().unwrap_or_default(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Test send finished"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{MemoryRateLimiter, RateLimitSettings};
    use crate::schema::DebugDefaults;
    use serde_json::json;

    fn service(max_requests: u32) -> TestSendService {
        let registry = SenderRegistry::builtin(
            reqwest::Client::new(),
            DebugDefaults {
                min_delay_ms: 0,
                max_delay_ms: 1,
            },
            false,
        );
        TestSendService::new(
            Arc::new(registry),
            Arc::new(MemoryRateLimiter::new(RateLimitSettings {
                max_requests,
                window: Duration::from_secs(60),
            })),
            TestSendLimits {
                max_target_length: 32,
                max_content_length: 64,
                send_timeout: Duration::from_millis(200),
            },
        )
    }

    #[tokio::test]
    async fn test_invalid_properties_return_failure_naming_field() {
        let response = service(5)
            .test_channel(
                "user-1",
                ChannelType::Email,
                &json!({"protocol": "SMTP", "port": 465, "username": "u@x.com", "password": "p"}),
                "a@x.com",
                "hello",
            )
            .await
            .unwrap();
        assert_eq!(response.error_code(), Some("INVALID_CONFIG"));
        assert!(response.error_message().unwrap().contains("host"));
    }

    #[tokio::test]
    async fn test_debug_sender_succeeds() {
        let response = service(5)
            .test_sender("user-1", SenderType::Debug, &json!({}), "a@x.com", "hello")
            .await
            .unwrap();
        assert!(response.message_id().unwrap().starts_with("DEBUG-"));
    }

    #[tokio::test]
    async fn test_length_limits_are_validation_errors() {
        let err = service(5)
            .test_sender(
                "user-1",
                SenderType::Debug,
                &json!({}),
                &"x".repeat(33),
                &"y".repeat(65),
            )
            .await
            .unwrap_err();
        let NotifierError::Validation(message) = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("target must be at most 32 characters"));
        assert!(message.contains("content must be at most 64 characters"));
    }

    #[tokio::test]
    async fn test_rate_limit_per_user() {
        let service = service(1);
        let send = |user: &'static str| {
            let service = service.clone();
            async move {
                service
                    .test_sender(user, SenderType::Debug, &json!({}), "a@x.com", "hi")
                    .await
            }
        };
        assert!(send("alice").await.is_ok());
        assert!(matches!(send("alice").await, Err(NotifierError::RateLimited(_))));
        assert!(send("bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_sender_times_out() {
        let started = Instant::now();
        let response = service(5)
            .test_sender(
                "user-1",
                SenderType::Debug,
                &json!({"minDelayMs": 3_600_000, "maxDelayMs": 3_600_000}),
                "a@x.com",
                "hello",
            )
            .await
            .unwrap();
        assert_eq!(response.error_code(), Some(codes::TIMEOUT));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
