//! Send record queries.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{ChannelType, DeliveryStatus, SendRecord};
use courier_engine::RecordPage;
use courier_engine::store::{SendRecordFilter, SuccessFilter};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sendRecords", get(list_send_records))
        .route("/api/sendRecords/{id}", get(get_send_record))
}

/// Query string of the list endpoint. Values are parsed by hand so every
/// malformed parameter is reported in one `{ "error": ... }` body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRecordQuery {
    pub task_id: Option<String>,
    pub recipient: Option<String>,
    pub channel_type: Option<String>,
    pub success: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SendRecordQuery {
    /// Returns the filter and the requested (page, size).
    fn parse(&self) -> Result<(SendRecordFilter, u32, u32), AppError> {
        let mut problems = Vec::new();

        let task_id = present(&self.task_id).and_then(|raw| {
            raw.parse::<Uuid>()
                .map_err(|_| problems.push(format!("taskId '{raw}' is not a valid UUID")))
                .ok()
        });
        let channel_type = present(&self.channel_type).and_then(|raw| {
            raw.parse::<ChannelType>().map_err(|e| problems.push(e)).ok()
        });
        let success = present(&self.success).and_then(|raw| {
            raw.parse::<SuccessFilter>().map_err(|e| problems.push(e)).ok()
        });
        let mut number = |name: &str, raw: Option<&str>, default: u32| match raw {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                problems.push(format!("{name} must be a positive integer"));
                default
            }),
        };
        let page = number("page", present(&self.page), 1);
        let size = number("size", present(&self.size), DEFAULT_PAGE_SIZE);

        if !problems.is_empty() {
            return Err(AppError::validation_list(&problems));
        }

        let filter = SendRecordFilter {
            task_id,
            recipient: present(&self.recipient).map(str::to_string),
            channel_type,
            success,
        };
        Ok((filter, page, size))
    }
}

/// A send record as returned to clients. Channel properties never appear here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRecordView {
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
    pub recipient_index: i32,
    pub submitted_at: DateTime<Utc>,
    pub rendered_content: Option<String>,
    pub status: DeliveryStatus,
    /// `null` while pending
    pub success: Option<bool>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<SendRecord> for SendRecordView {
    fn from(record: SendRecord) -> Self {
        Self {
            id: record.id,
            task_id: record.task_id,
            template_code: record.template_code,
            language_code: record.language_code,
            params: record.params,
            channel_id: record.channel_id,
            channel_type: record.channel_type,
            channel_name: record.channel_name,
            recipients: record.recipients,
            recipient: record.recipient,
            recipient_index: record.recipient_index,
            submitted_at: record.submitted_at,
            rendered_content: record.rendered_content,
            success: record.status.success(),
            status: record.status,
            error_code: record.error_code,
            error_message: record.error_message,
            sent_at: record.sent_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendRecordPage {
    pub items: Vec<SendRecordView>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

impl From<RecordPage> for SendRecordPage {
    fn from(page: RecordPage) -> Self {
        Self {
            items: page.items.into_iter().map(SendRecordView::from).collect(),
            page: page.page,
            size: page.size,
            total: page.total,
        }
    }
}

/// GET /api/sendRecords: filtered, paginated send records, newest task first.
async fn list_send_records(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<SendRecordQuery>,
) -> Result<Json<SendRecordPage>, AppError> {
    let (filter, page, size) = query.parse()?;
    let page = state.engine.list_send_records(&filter, page, size).await?;
    Ok(Json(page.into()))
}

/// GET /api/sendRecords/{id}
async fn get_send_record(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SendRecordView>, AppError> {
    state
        .engine
        .get_send_record(id)
        .await?
        .map(|record| Json(record.into()))
        .ok_or_else(|| AppError::NotFound(format!("Send record {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> SendRecordQuery {
        let mut q = SendRecordQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "taskId" => q.task_id = value,
                "recipient" => q.recipient = value,
                "channelType" => q.channel_type = value,
                "success" => q.success = value,
                "page" => q.page = value,
                "size" => q.size = value,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn test_defaults() {
        let (filter, page, size) = query(&[]).parse().unwrap();
        assert_eq!(filter, SendRecordFilter::default());
        assert_eq!((page, size), (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_parses_every_filter() {
        let task_id = Uuid::new_v4().to_string();
        let (filter, page, size) = query(&[
            ("taskId", &task_id),
            ("recipient", " a@x.com "),
            ("channelType", "email"),
            ("success", "false"),
            ("page", "2"),
            ("size", "10"),
        ])
        .parse()
        .unwrap();
        assert_eq!(filter.recipient.as_deref(), Some("a@x.com"));
        assert_eq!(filter.channel_type, Some(ChannelType::Email));
        assert_eq!(filter.success, Some(SuccessFilter::Failed));
        assert_eq!((page, size), (2, 10));
    }

    #[test]
    fn test_reports_all_malformed_parameters() {
        let err = query(&[("taskId", "nope"), ("success", "maybe"), ("size", "-1")])
            .parse()
            .unwrap_err();
        let AppError::Validation(message) = err else {
            panic!("expected validation error");
        };
        assert_eq!(message.split("; ").count(), 3);
    }
}
