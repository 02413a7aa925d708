//! The closed set of transports.

mod debug;
mod http;
mod http_api;
mod retry;
mod smtp;
mod webhook;

pub use debug::DebugSender;
pub use http_api::HttpApiSender;
pub use smtp::SmtpSender;
pub use webhook::{DingTalkSender, WECHAT_WORK_MAX_CONTENT_BYTES, WechatWorkSender, dingtalk_signature};

use crate::config::SenderType;
use crate::message::{MessageRequest, MessageResponse};

/// A ready-to-use transport, built by [`crate::registry::SenderRegistry::build`].
///
/// `send` never panics or errors for an ordinary delivery problem; every
/// failure comes back as [`MessageResponse::Failure`].
pub enum Sender {
    Smtp(SmtpSender),
    HttpApi(HttpApiSender),
    DingTalk(DingTalkSender),
    WechatWork(WechatWorkSender),
    Debug(DebugSender),
}

impl Sender {
    pub async fn send(&self, message: &MessageRequest) -> MessageResponse {
        match self {
            Sender::Smtp(s) => s.send(message).await,
            Sender::HttpApi(s) => s.send(message).await,
            Sender::DingTalk(s) => s.send(message).await,
            Sender::WechatWork(s) => s.send(message).await,
            Sender::Debug(s) => s.send(message).await,
        }
    }

    pub fn sender_type(&self) -> SenderType {
        match self {
            Sender::Smtp(_) => SenderType::Smtp,
            Sender::HttpApi(_) => SenderType::HttpApi,
            Sender::DingTalk(_) => SenderType::DingTalk,
            Sender::WechatWork(_) => SenderType::WechatWork,
            Sender::Debug(_) => SenderType::Debug,
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sender").field(&self.sender_type()).finish()
    }
}
