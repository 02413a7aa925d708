//! Task submission.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_engine::SubmitRequest;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/submit", post(submit_task))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    #[serde(default)]
    pub template_code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub channel_id: Option<Uuid>,
}

impl From<SubmitBody> for SubmitRequest {
    fn from(body: SubmitBody) -> Self {
        Self {
            template_code: body.template_code,
            language: body.language,
            params: body.params,
            recipients: body.recipients,
            channel_id: body.channel_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: Uuid,
}

/// POST /api/submit: persist the task and start delivering it.
///
/// Returns as soon as the records are stored; outcomes show up in `/api/sendRecords`.
async fn submit_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let handle = state.engine.submit(body.into()).await?;
    tracing::info!(user_id = %auth.user_id, task_id = %handle.task_id(), "Task submitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: handle.task_id(),
        }),
    ))
}
