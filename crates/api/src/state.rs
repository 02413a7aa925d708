//! Shared application state for the Axum API server.

use std::sync::Arc;

use courier_common::config::AppConfig;
use courier_engine::DispatchEngine;
use courier_notifier::SenderRegistry;
use courier_notifier::test_send::TestSendService;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub engine: DispatchEngine,
    pub test_send: TestSendService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(engine: DispatchEngine, test_send: TestSendService, config: AppConfig) -> Self {
        Self {
            engine,
            test_send,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &SenderRegistry {
        self.engine.registry()
    }
}
