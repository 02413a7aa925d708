//! Chat robot webhooks: DingTalk and WeChat Work.
//!
//! Both accept a `{"msgtype": "text", "text": {"content": ...}}` body and answer
//! with `{"errcode": 0, "errmsg": "ok"}` even on HTTP 200 failures, so the
//! payload is checked after the status.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;

use super::http::{status_failure, transport_error, truncate};
use super::retry::{Attempt, with_retry};
use crate::config::{DingTalkConfig, RetryPolicy, WechatWorkConfig};
use crate::message::{MessageRequest, MessageResponse, codes};

type HmacSha256 = Hmac<Sha256>;

/// WeChat Work rejects text content longer than this many UTF-8 bytes.
pub const WECHAT_WORK_MAX_CONTENT_BYTES: usize = 2048;

#[derive(Debug, Deserialize)]
struct RobotReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    msgid: Option<String>,
}

/// `【subject】\ncontent`, or just the content when there is no subject.
fn text_content(message: &MessageRequest) -> String {
    let subject = message.subject.trim();
    if subject.is_empty() {
        message.content.clone()
    } else {
        format!("【{}】\n{}", subject, message.content)
    }
}

fn text_body(content: &str) -> Value {
    json!({ "msgtype": "text", "text": { "content": content } })
}

/// URL-encoded base64 HMAC-SHA256 of `"{timestamp}\n{secret}"`, keyed by `secret`.
pub fn dingtalk_signature(secret: &str, timestamp_ms: i64) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());
    Some(urlencoding::encode(&signature).into_owned())
}

async fn post_robot(
    client: &reqwest::Client,
    url: &str,
    body: &Value,
    timeout: std::time::Duration,
    api_error: &'static str,
) -> Attempt {
    let response = match client.post(url).timeout(timeout).json(body).send().await {
        Ok(r) => r,
        Err(e) => return transport_error(&e.without_url(), api_error),
    };

    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return transport_error(&e.without_url(), api_error),
    };
    if !status.is_success() {
        return status_failure(status, &text, api_error);
    }

    match serde_json::from_str::<RobotReply>(&text) {
        Ok(reply) if reply.errcode == 0 => Attempt::Done(MessageResponse::success(reply.msgid)),
        Ok(reply) => Attempt::Done(MessageResponse::failure(
            api_error,
            format!("errcode {}: {}", reply.errcode, reply.errmsg),
        )),
        Err(_) => Attempt::Done(MessageResponse::failure(
            api_error,
            format!("Unexpected robot response: {}", truncate(&text, 256)),
        )),
    }
}

async fn deliver(
    client: &reqwest::Client,
    transport: &'static str,
    retry: RetryPolicy,
    body: Value,
    url: impl Fn() -> String,
    timeout: std::time::Duration,
    api_error: &'static str,
) -> MessageResponse {
    with_retry(retry, transport, |_| {
        let url = url();
        let body = &body;
        async move { post_robot(client, &url, body, timeout, api_error).await }
    })
    .await
}

pub struct DingTalkSender {
    client: reqwest::Client,
    config: DingTalkConfig,
}

impl DingTalkSender {
    pub fn new(client: reqwest::Client, config: DingTalkConfig) -> Self {
        Self { client, config }
    }

    /// The webhook URL, with a fresh timestamp and signature when a secret is set.
    fn signed_url(&self) -> String {
        let Some(secret) = self.config.secret.as_deref() else {
            return self.config.webhook_url.clone();
        };
        let timestamp = chrono::Utc::now().timestamp_millis();
        match dingtalk_signature(secret, timestamp) {
            Some(sign) => format!(
                "{}&timestamp={}&sign={}",
                self.config.webhook_url, timestamp, sign
            ),
            None => self.config.webhook_url.clone(),
        }
    }

    pub async fn send(&self, message: &MessageRequest) -> MessageResponse {
        let body = text_body(&text_content(message));
        deliver(
            &self.client,
            "dingtalk",
            self.config.retry,
            body,
            || self.signed_url(),
            self.config.timeout,
            codes::DINGTALK_API_ERROR,
        )
        .await
    }
}

pub struct WechatWorkSender {
    client: reqwest::Client,
    config: WechatWorkConfig,
}

impl WechatWorkSender {
    pub fn new(client: reqwest::Client, config: WechatWorkConfig) -> Self {
        Self { client, config }
    }

    pub async fn send(&self, message: &MessageRequest) -> MessageResponse {
        let content = text_content(message);
        let body = text_body(truncate(&content, WECHAT_WORK_MAX_CONTENT_BYTES));
        deliver(
            &self.client,
            "wechat_work",
            self.config.retry,
            body,
            || self.config.webhook_url.clone(),
            self.config.timeout,
            codes::WECHAT_WORK_API_ERROR,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dingtalk_signature_is_url_safe() {
        let sign = dingtalk_signature("SECtest", 1_700_000_000_000).unwrap();
        assert!(!sign.contains('+'));
        assert!(!sign.contains('/'));
        assert!(!sign.contains('='));
        let decoded = urlencoding::decode(&sign).unwrap();
        assert_eq!(STANDARD.decode(decoded.as_bytes()).unwrap().len(), 32);
    }

    #[test]
    fn test_dingtalk_signature_is_deterministic() {
        assert_eq!(
            dingtalk_signature("s", 42),
            dingtalk_signature("s", 42)
        );
        assert_ne!(dingtalk_signature("s", 42), dingtalk_signature("s", 43));
    }

    #[test]
    fn test_text_content_prefixes_subject() {
        let message = MessageRequest::new("", "body").with_subject("Alert");
        assert_eq!(text_content(&message), "【Alert】\nbody");
        assert_eq!(text_content(&MessageRequest::new("", "body")), "body");
    }
}
