//! Sender-level test sends and schemas, bypassing channel protocol resolution.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use courier_common::error::AppError;
use courier_notifier::schema::ProtocolSchema;
use courier_notifier::{MessageResponse, SenderType};

use super::channels::TestSendBody;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sender/testSend", post(test_send))
        .route("/api/sender/schema/{sender_type}", get(sender_schema))
}

fn parse_sender_type(raw: &str) -> Result<SenderType, AppError> {
    raw.parse()
        .map_err(|e: courier_notifier::ConfigValidationError| AppError::Validation(e.to_string()))
}

/// POST /api/sender/testSend
async fn test_send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<TestSendBody>,
) -> Result<Json<MessageResponse>, AppError> {
    let sender_type = parse_sender_type(&body.kind)?;
    let response = state
        .test_send
        .test_sender(
            &auth.user_id,
            sender_type,
            &body.properties,
            &body.target,
            &body.content,
        )
        .await?;
    Ok(Json(response))
}

/// GET /api/sender/schema/{senderType}
async fn sender_schema(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(sender_type): Path<String>,
) -> Result<Json<ProtocolSchema>, AppError> {
    let sender_type = parse_sender_type(&sender_type)?;
    state
        .registry()
        .schema_for_sender(sender_type)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No schema for sender type {sender_type}")))
}
