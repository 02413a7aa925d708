pub mod channels;
pub mod health;
pub mod send_records;
pub mod senders;
pub mod submit;
pub mod templates;

use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::middleware::request_id::with_request_id;
use crate::state::AppState;

/// Request bodies above this size are rejected with 413.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(health::router())
        .merge(submit::router())
        .merge(templates::router())
        .merge(send_records::router())
        .merge(channels::router())
        .merge(senders::router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state);
    with_request_id(router)
}
