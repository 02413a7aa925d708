//! Simulated transport for local development and pipeline tests.

use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::config::DebugConfig;
use crate::message::{MessageRequest, MessageResponse, codes};

pub struct DebugSender {
    config: DebugConfig,
}

impl DebugSender {
    pub fn new(config: DebugConfig) -> Self {
        Self { config }
    }

    fn delay(&self) -> Duration {
        let min = self.config.min_delay.as_millis() as u64;
        let max = (self.config.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    pub async fn send(&self, message: &MessageRequest) -> MessageResponse {
        let delay = self.delay();
        tokio::time::sleep(delay).await;

        if self.config.simulate_failure {
            tracing::info!(
                target_address = %message.target,
                delay_ms = delay.as_millis() as u64,
                "Debug transport simulated a failure"
            );
            return MessageResponse::failure(
                codes::DEBUG_SIMULATED_FAILURE,
                "Simulated delivery failure",
            );
        }

        let message_id = format!("DEBUG-{}", Uuid::new_v4());
        tracing::info!(
            target_address = %message.target,
            message_id = %message_id,
            delay_ms = delay.as_millis() as u64,
            content_length = message.content.len(),
            "Debug transport accepted message"
        );
        MessageResponse::success(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(simulate_failure: bool) -> DebugSender {
        DebugSender::new(DebugConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(3),
            simulate_failure,
        })
    }

    #[tokio::test]
    async fn test_debug_send_returns_prefixed_id() {
        let response = sender(false).send(&MessageRequest::new("a@x.com", "hi")).await;
        let id = response.message_id().unwrap();
        assert!(id.starts_with("DEBUG-"));
        assert!(Uuid::parse_str(&id["DEBUG-".len()..]).is_ok());
    }

    #[tokio::test]
    async fn test_debug_send_simulated_failure() {
        let response = sender(true).send(&MessageRequest::new("a@x.com", "hi")).await;
        assert_eq!(response.error_code(), Some("DEBUG_SIMULATED_FAILURE"));
    }

    #[test]
    fn test_delay_within_bounds() {
        let sender = sender(false);
        for _ in 0..50 {
            let delay = sender.delay();
            assert!(delay >= Duration::from_millis(1) && delay <= Duration::from_millis(3));
        }
    }
}
