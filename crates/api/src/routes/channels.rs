//! Channel configuration helpers: test sends and property schemas.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use courier_common::error::AppError;
use courier_common::types::ChannelType;
use courier_notifier::MessageResponse;
use courier_notifier::schema::ChannelSchema;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/channel/testSend", post(test_send))
        .route("/api/channel/emailProtocolSchema", get(email_protocol_schema))
        .route("/api/channel/schema/{channel_type}", get(channel_schema))
}

/// Body shared by both test-send endpoints.
#[derive(Debug, Deserialize)]
pub struct TestSendBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub content: String,
}

fn parse_channel_type(raw: &str) -> Result<ChannelType, AppError> {
    raw.parse().map_err(AppError::Validation)
}

/// POST /api/channel/testSend: deliver one message with unsaved channel properties.
///
/// Configuration problems come back as a failed `MessageResponse`, not an HTTP error.
async fn test_send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<TestSendBody>,
) -> Result<Json<MessageResponse>, AppError> {
    let channel_type = parse_channel_type(&body.kind)?;
    let response = state
        .test_send
        .test_channel(
            &auth.user_id,
            channel_type,
            &body.properties,
            &body.target,
            &body.content,
        )
        .await?;
    Ok(Json(response))
}

/// GET /api/channel/emailProtocolSchema
async fn email_protocol_schema(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<ChannelSchema>, AppError> {
    lookup(&state, ChannelType::Email)
}

/// GET /api/channel/schema/{channelType}
async fn channel_schema(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(channel_type): Path<String>,
) -> Result<Json<ChannelSchema>, AppError> {
    lookup(&state, parse_channel_type(&channel_type)?)
}

fn lookup(state: &AppState, channel_type: ChannelType) -> Result<Json<ChannelSchema>, AppError> {
    state
        .registry()
        .schema_for_channel(channel_type)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No schema for channel type {channel_type}")))
}
