//! Email delivery through a provider's JSON HTTP API.

use std::time::Instant;

use serde_json::{Map, Value};

use super::http::{status_failure, transport_error};
use super::retry::{Attempt, with_retry};
use crate::config::HttpApiConfig;
use crate::message::{MessageRequest, MessageResponse, codes};

pub struct HttpApiSender {
    client: reqwest::Client,
    config: HttpApiConfig,
    endpoint: String,
}

impl HttpApiSender {
    pub fn new(client: reqwest::Client, config: HttpApiConfig) -> Self {
        let endpoint = config.endpoint();
        Self {
            client,
            config,
            endpoint,
        }
    }

    /// `{to, subject, content, from?}` with the message metadata merged on top.
    fn body(&self, message: &MessageRequest) -> Value {
        let mut body = Map::new();
        body.insert("to".into(), Value::String(message.target.clone()));
        body.insert("subject".into(), Value::String(message.subject.clone()));
        body.insert("content".into(), Value::String(message.content.clone()));
        if let Some(from) = &self.config.from {
            body.insert("from".into(), Value::String(from.clone()));
        }
        for (key, value) in &message.metadata {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }

    pub async fn send(&self, message: &MessageRequest) -> MessageResponse {
        let body = self.body(message);
        let started = Instant::now();

        let response = with_retry(self.config.retry, "http_api", |_| self.attempt(&body)).await;

        tracing::debug!(
            endpoint = %self.endpoint,
            success = response.is_success(),
            duration_ms = started.elapsed().as_millis() as u64,
            "HTTP API send finished"
        );
        response
    }

    async fn attempt(&self, body: &Value) -> Attempt {
        let result = self
            .client
            .post(&self.endpoint)
            .header(self.config.api_key_header.as_str(), self.config.api_key.as_str())
            .timeout(self.config.timeout)
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => return transport_error(&e, codes::MAIL_SEND_FAILED),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return transport_error(&e, codes::MAIL_SEND_FAILED),
        };

        if !status.is_success() {
            return status_failure(status, &text, codes::MAIL_SEND_FAILED);
        }

        let message_id = text.trim();
        Attempt::Done(MessageResponse::success(
            (!message_id.is_empty()).then(|| message_id.to_string()),
        ))
    }
}
