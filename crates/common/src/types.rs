use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ChannelType {
    Email,
    Im,
    Sms,
    Push,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [
        ChannelType::Email,
        ChannelType::Im,
        ChannelType::Sms,
        ChannelType::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "EMAIL",
            ChannelType::Im => "IM",
            ChannelType::Sms => "SMS",
            ChannelType::Push => "PUSH",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        ChannelType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Channel type must be one of EMAIL, IM, SMS, PUSH (got '{}')", s))
    }
}

/// Per-recipient delivery status.
///
/// `Pending` is the only non-terminal state; a record moves to `Sent` or `Failed` once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }

    /// Tri-state outcome: `None` while pending.
    pub fn success(&self) -> Option<bool> {
        match self {
            DeliveryStatus::Pending => None,
            DeliveryStatus::Sent => Some(true),
            DeliveryStatus::Failed => Some(false),
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub template_code: String,
    pub language_code: String,
    /// Placeholder name → value (JSON object)
    pub params: serde_json::Value,
    /// Explicit channel selection from the request, if any
    pub channel_id: Option<Uuid>,
    pub recipients: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

/// The delivery attempt and outcome for one (task, recipient) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SendRecord {
    pub id: Uuid,
    pub task_id: Uuid,
    pub template_code: String,
    pub language_code: String,
    pub params: serde_json::Value,
    pub channel_id: Option<Uuid>,
    pub channel_type: Option<ChannelType>,
    pub channel_name: Option<String>,
    pub recipients: Vec<String>,
    pub recipient: String,
    /// Position of `recipient` in the task's recipient list
    pub recipient_index: i32,
    pub submitted_at: DateTime<Utc>,
    pub rendered_content: Option<String>,
    pub status: DeliveryStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl SendRecord {
    /// Build the pending record for `task.recipients[index]`.
    pub fn pending(task: &Task, index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            template_code: task.template_code.clone(),
            language_code: task.language_code.clone(),
            params: task.params.clone(),
            channel_id: None,
            channel_type: None,
            channel_name: None,
            recipients: task.recipients.clone(),
            recipient: task.recipients[index].clone(),
            recipient_index: index as i32,
            submitted_at: task.submitted_at,
            rendered_content: None,
            status: DeliveryStatus::Pending,
            error_code: None,
            error_message: None,
            sent_at: None,
        }
    }
}

/// A configured transport instance.
///
/// `properties` may hold credentials; it is never part of an API view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub channel_type: ChannelType,
    pub description: Option<String>,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_parse_is_case_insensitive() {
        assert_eq!("email".parse::<ChannelType>(), Ok(ChannelType::Email));
        assert_eq!(" Im ".parse::<ChannelType>(), Ok(ChannelType::Im));
        assert!("fax".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_channel_type_serde_uses_uppercase_tags() {
        assert_eq!(serde_json::to_value(ChannelType::Push).unwrap(), "PUSH");
        let parsed: ChannelType = serde_json::from_value(serde_json::json!("SMS")).unwrap();
        assert_eq!(parsed, ChannelType::Sms);
    }

    #[test]
    fn test_delivery_status_tri_state() {
        assert_eq!(DeliveryStatus::Pending.success(), None);
        assert_eq!(DeliveryStatus::Sent.success(), Some(true));
        assert_eq!(DeliveryStatus::Failed.success(), Some(false));
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_record_copies_task_context() {
        let task = Task {
            id: Uuid::new_v4(),
            template_code: "welcome".into(),
            language_code: "en".into(),
            params: serde_json::json!({"name": "Ann"}),
            channel_id: None,
            recipients: vec!["a@x.com".into(), "b@x.com".into()],
            submitted_at: Utc::now(),
        };
        let record = SendRecord::pending(&task, 1);
        assert_eq!(record.task_id, task.id);
        assert_eq!(record.recipient, "b@x.com");
        assert_eq!(record.recipient_index, 1);
        assert_eq!(record.recipients, task.recipients);
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert!(record.sent_at.is_none());
    }
}
