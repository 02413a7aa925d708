//! Template preview.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use courier_common::error::AppError;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/template/fill", post(fill_template))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillBody {
    #[serde(default)]
    pub template_code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct FillResponse {
    pub content: String,
}

/// POST /api/template/fill: render a template with the given parameters.
async fn fill_template(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<FillBody>,
) -> Result<Json<FillResponse>, AppError> {
    let mut problems = Vec::new();
    if body.template_code.trim().is_empty() {
        problems.push("templateCode is required".to_string());
    }
    if body.language.trim().is_empty() {
        problems.push("language is required".to_string());
    }
    if !(body.params.is_null() || body.params.is_object()) {
        problems.push("params must be a JSON object".to_string());
    }
    if !problems.is_empty() {
        return Err(AppError::validation_list(&problems));
    }

    let content = state
        .engine
        .fill_template(&body.template_code, &body.language, &body.params)
        .await?;
    Ok(Json(FillResponse { content }))
}
