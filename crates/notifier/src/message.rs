//! Transport-neutral message and outcome types.

use serde::{Deserialize, Serialize, Serializer};

/// Failure codes shared by every transport and by the dispatch engine.
pub mod codes {
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    pub const INVALID_RECIPIENT: &str = "INVALID_RECIPIENT";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const MAIL_SEND_FAILED: &str = "MAIL_SEND_FAILED";
    pub const DINGTALK_API_ERROR: &str = "DINGTALK_API_ERROR";
    pub const WECHAT_WORK_API_ERROR: &str = "WECHAT_WORK_API_ERROR";
    pub const DEBUG_SIMULATED_FAILURE: &str = "DEBUG_SIMULATED_FAILURE";
    pub const SENDER_BUILD_FAILED: &str = "SENDER_BUILD_FAILED";
}

/// What a sender is asked to deliver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Recipient address. Ignored by webhook transports, whose URL is the recipient.
    pub target: String,
    /// Email subject / chat title; may be empty.
    pub subject: String,
    pub content: String,
    /// Extra key/values. The HTTP API email transport merges them into its request body.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MessageRequest {
    pub fn new(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of one delivery attempt. The tag is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageResponse {
    Success {
        message_id: Option<String>,
    },
    Failure {
        error_code: String,
        error_message: String,
    },
}

impl MessageResponse {
    pub fn success(message_id: impl Into<Option<String>>) -> Self {
        MessageResponse::Success {
            message_id: message_id.into(),
        }
    }

    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        MessageResponse::Failure {
            error_code: error_code.into(),
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MessageResponse::Success { .. })
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            MessageResponse::Success { message_id } => message_id.as_deref(),
            MessageResponse::Failure { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            MessageResponse::Success { .. } => None,
            MessageResponse::Failure { error_code, .. } => Some(error_code),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            MessageResponse::Success { .. } => None,
            MessageResponse::Failure { error_message, .. } => Some(error_message),
        }
    }
}

/// Wire shape: `{success, messageId?, errorCode?, errorMessage?}`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponseWire<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

impl Serialize for MessageResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MessageResponseWire {
            success: self.is_success(),
            message_id: self.message_id(),
            error_code: self.error_code(),
            error_message: self.error_message(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_success_wire_shape() {
        let value = serde_json::to_value(MessageResponse::success(Some("m-1".to_string()))).unwrap();
        assert_eq!(value, json!({"success": true, "messageId": "m-1"}));

        let value = serde_json::to_value(MessageResponse::success(None)).unwrap();
        assert_eq!(value, json!({"success": true}));
    }

    #[test]
    fn test_failure_wire_shape() {
        let value =
            serde_json::to_value(MessageResponse::failure(codes::TIMEOUT, "took too long")).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "errorCode": "TIMEOUT", "errorMessage": "took too long"})
        );
    }

    #[test]
    fn test_request_builder() {
        let request = MessageRequest::new("a@x.com", "hi")
            .with_subject("Hello")
            .with_metadata("channelType", "EMAIL");
        assert_eq!(request.target, "a@x.com");
        assert_eq!(request.subject, "Hello");
        assert_eq!(request.metadata["channelType"], "EMAIL");
    }
}
