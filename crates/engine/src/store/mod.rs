//! Persistence contracts for tasks, send records, templates and channels.
//!
//! Two implementations share the same semantics: [`postgres::PgStore`] for
//! production and [`memory::MemoryStore`] for tests and local runs.

pub mod decrypting;
pub mod memory;
pub mod postgres;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::error::AppError;
use courier_common::types::{Channel, ChannelType, DeliveryStatus, SendRecord, Task};
use courier_notifier::{CryptoError, MessageResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record already left `pending`; it was not modified.
    #[error("Send record {0} is no longer pending")]
    Conflict(Uuid),

    #[error("Send record {0} not found")]
    NotFound(Uuid),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Channel {id} properties could not be decrypted: {source}")]
    Undecryptable { id: Uuid, source: CryptoError },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::NotFound(id) => AppError::NotFound(format!("Send record {id} not found")),
            err @ (StoreError::Conflict(_) | StoreError::Duplicate(_)) => {
                AppError::Conflict(err.to_string())
            }
            err @ StoreError::Undecryptable { .. } => AppError::Internal(err.to_string()),
        }
    }
}

/// The channel a record was routed to, copied onto the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRef {
    pub id: Uuid,
    pub channel_type: ChannelType,
    pub name: String,
}

impl From<&Channel> for ChannelRef {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            channel_type: channel.channel_type,
            name: channel.name.clone(),
        }
    }
}

/// Everything written to a record in its single transition out of `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: DeliveryStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub rendered_content: Option<String>,
    pub channel: Option<ChannelRef>,
    pub sent_at: DateTime<Utc>,
}

impl Outcome {
    pub fn from_response(
        response: &MessageResponse,
        rendered_content: Option<String>,
        channel: Option<ChannelRef>,
    ) -> Self {
        let status = if response.is_success() {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        };
        Self {
            status,
            error_code: response.error_code().map(str::to_string),
            error_message: response.error_message().map(str::to_string),
            rendered_content,
            channel,
            sent_at: Utc::now(),
        }
    }

    pub fn failed(
        error_code: &str,
        error_message: impl Into<String>,
        rendered_content: Option<String>,
        channel: Option<ChannelRef>,
    ) -> Self {
        Self::from_response(
            &MessageResponse::failure(error_code, error_message),
            rendered_content,
            channel,
        )
    }

    /// Copy this outcome onto `record`.
    pub(crate) fn apply(&self, record: &mut SendRecord) {
        record.status = self.status;
        record.error_code = self.error_code.clone();
        record.error_message = self.error_message.clone();
        record.rendered_content = self.rendered_content.clone();
        record.channel_id = self.channel.as_ref().map(|c| c.id);
        record.channel_type = self.channel.as_ref().map(|c| c.channel_type);
        record.channel_name = self.channel.as_ref().map(|c| c.name.clone());
        record.sent_at = Some(self.sent_at);
    }
}

/// Tri-state filter on delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessFilter {
    Succeeded,
    Failed,
    Pending,
}

impl SuccessFilter {
    pub fn status(&self) -> DeliveryStatus {
        match self {
            SuccessFilter::Succeeded => DeliveryStatus::Sent,
            SuccessFilter::Failed => DeliveryStatus::Failed,
            SuccessFilter::Pending => DeliveryStatus::Pending,
        }
    }
}

impl FromStr for SuccessFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(SuccessFilter::Succeeded),
            "false" => Ok(SuccessFilter::Failed),
            "pending" => Ok(SuccessFilter::Pending),
            _ => Err(format!("success must be true, false or pending (got '{s}')")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRecordFilter {
    pub task_id: Option<Uuid>,
    /// Exact match on the trimmed recipient
    pub recipient: Option<String>,
    pub channel_type: Option<ChannelType>,
    pub success: Option<SuccessFilter>,
}

impl SendRecordFilter {
    pub fn matches(&self, record: &SendRecord) -> bool {
        self.task_id.is_none_or(|id| record.task_id == id)
            && self
                .recipient
                .as_deref()
                .is_none_or(|r| record.recipient == r)
            && self
                .channel_type
                .is_none_or(|t| record.channel_type == Some(t))
            && self.success.is_none_or(|s| record.status == s.status())
    }
}

/// 1-based page request; validated and clamped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matches across all pages
    pub total: u64,
}

#[async_trait]
pub trait SendRecordStore: Send + Sync {
    async fn create(&self, record: &SendRecord) -> Result<(), StoreError>;

    /// Insert all records, or none if any (task, recipient) pair already exists.
    async fn create_batch(&self, records: &[SendRecord]) -> Result<(), StoreError>;

    /// Move a pending record to its outcome. A non-pending record yields
    /// [`StoreError::Conflict`] and stays unchanged.
    async fn update_outcome(&self, id: Uuid, outcome: &Outcome) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SendRecord>, StoreError>;

    /// Newest task first, then recipient order within a task.
    async fn query(
        &self,
        filter: &SendRecordFilter,
        page: PageRequest,
    ) -> Result<Page<SendRecord>, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: &Task) -> Result<(), StoreError>;

    /// Insert the task and all its records in one transaction. On error
    /// nothing is stored.
    async fn create_with_records(
        &self,
        task: &Task,
        records: &[SendRecord],
    ) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Content of template `code` in exactly `language` (lowercase).
    async fn find_content(&self, code: &str, language: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Channel>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_filter_parsing() {
        assert_eq!("true".parse(), Ok(SuccessFilter::Succeeded));
        assert_eq!("FALSE".parse(), Ok(SuccessFilter::Failed));
        assert_eq!("pending".parse(), Ok(SuccessFilter::Pending));
        assert!("maybe".parse::<SuccessFilter>().is_err());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(PageRequest { page: 1, size: 10 }.offset(), 0);
        assert_eq!(PageRequest { page: 3, size: 10 }.offset(), 20);
    }

    #[test]
    fn test_outcome_from_failure() {
        let outcome = Outcome::from_response(
            &MessageResponse::failure("TIMEOUT", "slow"),
            Some("Hi".into()),
            None,
        );
        assert_eq!(outcome.status, DeliveryStatus::Failed);
        assert_eq!(outcome.error_code.as_deref(), Some("TIMEOUT"));
        assert_eq!(outcome.rendered_content.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_store_errors_map_to_app_errors() {
        assert!(matches!(
            AppError::from(StoreError::Conflict(Uuid::nil())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::NotFound(Uuid::nil())),
            AppError::NotFound(_)
        ));
    }
}
