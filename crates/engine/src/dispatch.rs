//! Accept-then-process dispatch.
//!
//! `submit` validates the request, persists the task and one pending record per
//! recipient, then hands the task to a background tokio task:
//! 1. Resolve the template once for the whole task
//! 2. Route every recipient to a channel and build each channel's sender once
//! 3. Fan the sends out over a `JoinSet`, bounded by a process-wide semaphore
//! 4. Write each record's outcome exactly once
//!
//! One recipient's failure never affects another. A submitted task is never
//! cancelled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_common::config::{AppConfig, DEFAULT_SEND_TIMEOUT_MS};
use courier_common::error::AppError;
use courier_common::types::{SendRecord, Task};
use courier_notifier::message::codes as transport_codes;
use courier_notifier::{MessageRequest, MessageResponse, PropertyCrypto, Sender, SenderRegistry};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::router::RoutingPolicy;
use crate::store::decrypting::DecryptingChannelStore;
use crate::store::{
    ChannelRef, ChannelStore, Outcome, Page, PageRequest, SendRecordFilter, SendRecordStore,
    StoreError, TaskStore, TemplateStore,
};
use crate::template::{TemplateError, TemplateResolver};

/// Per-record failure codes produced by the engine itself.
pub mod codes {
    pub const TEMPLATE_ERROR: &str = "TEMPLATE_ERROR";
    pub const NO_ROUTE: &str = "NO_ROUTE";
    pub const CHANNEL_NOT_FOUND: &str = "CHANNEL_NOT_FOUND";
    pub const SENDER_CONFIG_ERROR: &str = "SENDER_CONFIG_ERROR";
    pub const SENDER_BUILD_FAILED: &str = courier_notifier::message::codes::SENDER_BUILD_FAILED;
    pub const TIMEOUT: &str = courier_notifier::message::codes::TIMEOUT;
    pub const SEND_PANIC: &str = "SEND_PANIC";
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Dispatch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(problems) => AppError::validation_list(&problems),
            EngineError::Store(e) => e.into(),
            EngineError::Join(e) => AppError::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Upper bound on sends in flight across all tasks
    pub max_concurrency: usize,
    pub send_timeout: Duration,
    pub max_page_size: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            max_page_size: 100,
        }
    }
}

impl From<&AppConfig> for DispatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrency: config.dispatch_max_concurrency,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            max_page_size: config.send_records_max_page_size,
        }
    }
}

/// The stores the engine reads and writes.
#[derive(Clone)]
pub struct EngineStores {
    pub tasks: Arc<dyn TaskStore>,
    pub records: Arc<dyn SendRecordStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub channels: Arc<dyn ChannelStore>,
}

impl EngineStores {
    /// Use one backend for every store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: TaskStore + SendRecordStore + TemplateStore + ChannelStore + 'static,
    {
        Self {
            tasks: store.clone(),
            records: store.clone(),
            templates: store.clone(),
            channels: store,
        }
    }

    /// Open sealed sensitive properties whenever a channel is loaded.
    pub fn with_property_crypto(mut self, crypto: Arc<PropertyCrypto>) -> Self {
        self.channels = Arc::new(DecryptingChannelStore::new(self.channels, crypto));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitRequest {
    pub template_code: String,
    pub language: String,
    /// JSON object of placeholder values; `null` means none
    pub params: Value,
    pub recipients: Vec<String>,
    pub channel_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Returned by `submit`. Await it for the summary or drop it to detach.
pub struct DispatchHandle {
    task_id: Uuid,
    join: JoinHandle<TaskSummary>,
}

impl DispatchHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub async fn wait(self) -> Result<TaskSummary, EngineError> {
        Ok(self.join.await?)
    }
}

/// One page of send records together with the effective paging.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub items: Vec<SendRecord>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

struct Inner {
    stores: EngineStores,
    resolver: TemplateResolver,
    registry: Arc<SenderRegistry>,
    routing: RoutingPolicy,
    permits: Arc<Semaphore>,
    settings: DispatchSettings,
}

#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<Inner>,
}

/// A channel prepared for one task: either a live sender or the reason it has none.
#[derive(Clone)]
enum Route {
    Ready {
        sender: Arc<Sender>,
        channel: ChannelRef,
    },
    Broken {
        error_code: &'static str,
        error_message: String,
        channel: Option<ChannelRef>,
    },
}

impl DispatchEngine {
    pub fn new(
        stores: EngineStores,
        registry: Arc<SenderRegistry>,
        routing: RoutingPolicy,
        settings: DispatchSettings,
        default_language: impl Into<String>,
    ) -> Self {
        let resolver = TemplateResolver::new(stores.templates.clone(), default_language);
        Self {
            inner: Arc::new(Inner {
                stores,
                resolver,
                registry,
                routing,
                permits: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
                settings,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<SenderRegistry> {
        &self.inner.registry
    }

    /// Validate and persist a submission, then start delivering it in the background.
    pub async fn submit(&self, request: SubmitRequest) -> Result<DispatchHandle, EngineError> {
        let task = validate_submission(request)?;
        let records: Vec<SendRecord> = (0..task.recipients.len())
            .map(|i| SendRecord::pending(&task, i))
            .collect();

        self.inner
            .stores
            .tasks
            .create_with_records(&task, &records)
            .await?;

        tracing::info!(
            task_id = %task.id,
            template_code = %task.template_code,
            language = %task.language_code,
            recipients = records.len(),
            "Task accepted"
        );

        let task_id = task.id;
        let inner = self.inner.clone();
        let join = tokio::spawn(async move { inner.process(task, records).await });
        Ok(DispatchHandle { task_id, join })
    }

    /// Render a template without creating a task.
    pub async fn fill_template(
        &self,
        template_code: &str,
        language: &str,
        params: &Value,
    ) -> Result<String, TemplateError> {
        self.inner
            .resolver
            .resolve(template_code, language, params)
            .await
    }

    pub async fn list_send_records(
        &self,
        filter: &SendRecordFilter,
        page: u32,
        size: u32,
    ) -> Result<RecordPage, EngineError> {
        let mut problems = Vec::new();
        if page < 1 {
            problems.push("page must be at least 1".to_string());
        }
        if size < 1 {
            problems.push("size must be at least 1".to_string());
        }
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems));
        }

        let size = size.min(self.inner.settings.max_page_size);
        let Page { items, total } = self
            .inner
            .stores
            .records
            .query(filter, PageRequest { page, size })
            .await?;
        Ok(RecordPage {
            items,
            page,
            size,
            total,
        })
    }

    pub async fn get_send_record(&self, id: Uuid) -> Result<Option<SendRecord>, EngineError> {
        Ok(self.inner.stores.records.get(id).await?)
    }
}

/// Trim recipients, drop blanks and repeats (first occurrence kept).
pub fn normalize_recipients(recipients: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    recipients
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .filter(|r| seen.insert(r.to_string()))
        .map(str::to_string)
        .collect()
}

fn validate_submission(request: SubmitRequest) -> Result<Task, EngineError> {
    let mut problems = Vec::new();

    let template_code = request.template_code.trim().to_string();
    if template_code.is_empty() {
        problems.push("templateCode is required".to_string());
    }
    let language = request.language.trim().to_string();
    if language.is_empty() {
        problems.push("language is required".to_string());
    }
    let params = match request.params {
        Value::Null => Value::Object(Default::default()),
        params @ Value::Object(_) => params,
        _ => {
            problems.push("params must be a JSON object".to_string());
            Value::Null
        }
    };
    let recipients = normalize_recipients(&request.recipients);
    if recipients.is_empty() {
        problems.push("recipients must contain at least one non-blank address".to_string());
    }

    if !problems.is_empty() {
        return Err(EngineError::Validation(problems));
    }

    Ok(Task {
        id: Uuid::new_v4(),
        template_code,
        language_code: language,
        params,
        channel_id: request.channel_id,
        recipients,
        submitted_at: chrono::Utc::now(),
    })
}

impl Inner {
    async fn process(self: Arc<Self>, task: Task, records: Vec<SendRecord>) -> TaskSummary {
        let started = Instant::now();
        let mut summary = TaskSummary {
            task_id: task.id,
            total: records.len(),
            succeeded: 0,
            failed: 0,
        };

        let rendered = match self
            .resolver
            .resolve(&task.template_code, &task.language_code, &task.params)
            .await
        {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Template resolution failed");
                for record in &records {
                    let outcome = Outcome::failed(codes::TEMPLATE_ERROR, e.to_string(), None, None);
                    self.write_outcome(record, &outcome).await;
                }
                summary.failed = records.len();
                return summary;
            }
        };

        let mut routes: HashMap<Uuid, Route> = HashMap::new();
        let mut units = JoinSet::new();
        let mut in_flight: HashMap<Uuid, &SendRecord> = HashMap::new();

        for record in &records {
            let Some(channel_id) = self.routing.route(&record.recipient, task.channel_id) else {
                let outcome = Outcome::failed(
                    codes::NO_ROUTE,
                    format!("No channel routes recipient '{}'", record.recipient),
                    Some(rendered.clone()),
                    None,
                );
                self.write_outcome(record, &outcome).await;
                summary.failed += 1;
                continue;
            };

            let route = match routes.get(&channel_id) {
                Some(route) => route.clone(),
                None => {
                    let route = self.prepare_route(task.id, channel_id).await;
                    routes.insert(channel_id, route.clone());
                    route
                }
            };

            match route {
                Route::Broken {
                    error_code,
                    error_message,
                    channel,
                } => {
                    let outcome =
                        Outcome::failed(error_code, error_message, Some(rendered.clone()), channel);
                    self.write_outcome(record, &outcome).await;
                    summary.failed += 1;
                }
                Route::Ready { sender, channel } => {
                    in_flight.insert(record.id, record);
                    units.spawn(self.clone().deliver(
                        record.clone(),
                        sender,
                        channel,
                        rendered.clone(),
                    ));
                }
            }
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((record_id, success)) => {
                    in_flight.remove(&record_id);
                    if success {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(task_id = %task.id, error = %e, "Delivery unit aborted");
                }
            }
        }

        // Units that never reported back panicked.
        for record in in_flight.into_values() {
            let channel = self
                .routing
                .route(&record.recipient, task.channel_id)
                .and_then(|id| match routes.get(&id) {
                    Some(Route::Ready { channel, .. }) => Some(channel.clone()),
                    _ => None,
                });
            let outcome = Outcome::failed(
                codes::SEND_PANIC,
                "Sender panicked during delivery",
                Some(rendered.clone()),
                channel,
            );
            self.write_outcome(record, &outcome).await;
            summary.failed += 1;
        }

        tracing::info!(
            task_id = %task.id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Task processed"
        );
        summary
    }

    /// Load, validate and build the sender for `channel_id`.
    async fn prepare_route(&self, task_id: Uuid, channel_id: Uuid) -> Route {
        let channel = match self.stores.channels.get(channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                return Route::Broken {
                    error_code: codes::CHANNEL_NOT_FOUND,
                    error_message: format!("Channel {channel_id} does not exist"),
                    channel: None,
                };
            }
            Err(e @ StoreError::Undecryptable { .. }) => {
                tracing::error!(task_id = %task_id, channel_id = %channel_id, error = %e, "Channel properties unreadable");
                return Route::Broken {
                    error_code: codes::SENDER_CONFIG_ERROR,
                    error_message: e.to_string(),
                    channel: None,
                };
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, channel_id = %channel_id, error = %e, "Channel lookup failed");
                return Route::Broken {
                    error_code: codes::CHANNEL_NOT_FOUND,
                    error_message: format!("Channel {channel_id} could not be loaded: {e}"),
                    channel: None,
                };
            }
        };
        let channel_ref = ChannelRef::from(&channel);

        let config = match self
            .registry
            .validate_channel(channel.channel_type, &channel.properties)
        {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(task_id = %task_id, channel_id = %channel_id, error = %e, "Channel configuration invalid");
                return Route::Broken {
                    error_code: codes::SENDER_CONFIG_ERROR,
                    error_message: e.to_string(),
                    channel: Some(channel_ref),
                };
            }
        };

        let worst_case = config.worst_case_duration();
        if worst_case > self.settings.send_timeout {
            tracing::warn!(
                task_id = %task_id,
                channel_id = %channel_id,
                worst_case_ms = worst_case.as_millis() as u64,
                send_timeout_ms = self.settings.send_timeout.as_millis() as u64,
                "Channel retries can outlast the dispatch timeout"
            );
        }

        match self.registry.build(&config) {
            Ok(sender) => {
                tracing::debug!(
                    task_id = %task_id,
                    channel_id = %channel_id,
                    sender_type = %sender.sender_type(),
                    "Sender ready"
                );
                Route::Ready {
                    sender: Arc::new(sender),
                    channel: channel_ref,
                }
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, channel_id = %channel_id, error = %e, "Sender build failed");
                Route::Broken {
                    error_code: codes::SENDER_BUILD_FAILED,
                    error_message: e.to_string(),
                    channel: Some(channel_ref),
                }
            }
        }
    }

    /// Send to one recipient and record the outcome. Returns (record id, success).
    async fn deliver(
        self: Arc<Self>,
        record: SendRecord,
        sender: Arc<Sender>,
        channel: ChannelRef,
        rendered: String,
    ) -> (Uuid, bool) {
        let _permit = self.permits.clone().acquire_owned().await.ok();
        let started = Instant::now();

        let message = MessageRequest::new(record.recipient.clone(), rendered.clone())
            .with_metadata("channelType", channel.channel_type.as_str())
            .with_metadata("taskId", record.task_id.to_string())
            .with_metadata("recordId", record.id.to_string());

        let response =
            match tokio::time::timeout(self.settings.send_timeout, sender.send(&message)).await {
                Ok(response) => response,
                Err(_) => MessageResponse::failure(
                    transport_codes::TIMEOUT,
                    format!(
                        "Send did not finish within {} ms",
                        self.settings.send_timeout.as_millis()
                    ),
                ),
            };

        tracing::info!(
            task_id = %record.task_id,
            record_id = %record.id,
            recipient = %record.recipient,
            channel_id = %channel.id,
            success = response.is_success(),
            error_code = response.error_code().unwrap_or_default(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Delivery attempt finished"
        );

        let success = response.is_success();
        let outcome = Outcome::from_response(&response, Some(rendered), Some(channel));
        self.write_outcome(&record, &outcome).await;
        (record.id, success)
    }

    async fn write_outcome(&self, record: &SendRecord, outcome: &Outcome) {
        match self.stores.records.update_outcome(record.id, outcome).await {
            Ok(()) => {}
            Err(StoreError::Conflict(id)) => {
                tracing::warn!(
                    task_id = %record.task_id,
                    record_id = %id,
                    "Outcome already recorded, ignoring write"
                );
            }
            Err(e) => {
                tracing::error!(
                    task_id = %record.task_id,
                    record_id = %record.id,
                    error = %e,
                    "Failed to record outcome"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use courier_common::types::{ChannelType, DeliveryStatus};
    use courier_notifier::schema::DebugDefaults;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to a `MemoryStore`, but panics while writing the delivered
    /// outcome of `recipient`, inside the delivery unit.
    struct PanickingRecords {
        inner: Arc<MemoryStore>,
        recipient: String,
    }

    #[async_trait]
    impl SendRecordStore for PanickingRecords {
        async fn create(&self, record: &SendRecord) -> Result<(), StoreError> {
            SendRecordStore::create(&*self.inner, record).await
        }

        async fn create_batch(&self, records: &[SendRecord]) -> Result<(), StoreError> {
            self.inner.create_batch(records).await
        }

        async fn update_outcome(&self, id: Uuid, outcome: &Outcome) -> Result<(), StoreError> {
            let record = SendRecordStore::get(&*self.inner, id).await?;
            if record.is_some_and(|r| r.recipient == self.recipient)
                && outcome.error_code.as_deref() != Some(codes::SEND_PANIC)
            {
                panic!("transport blew up for {}", self.recipient);
            }
            self.inner.update_outcome(id, outcome).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<SendRecord>, StoreError> {
            SendRecordStore::get(&*self.inner, id).await
        }

        async fn query(
            &self,
            filter: &SendRecordFilter,
            page: PageRequest,
        ) -> Result<Page<SendRecord>, StoreError> {
            self.inner.query(filter, page).await
        }
    }

    /// Tracks how many delivery units write their outcome at the same time.
    /// Units hold their permit while writing, so the peak is bounded by it.
    struct CountingRecords {
        inner: Arc<MemoryStore>,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SendRecordStore for CountingRecords {
        async fn create(&self, record: &SendRecord) -> Result<(), StoreError> {
            SendRecordStore::create(&*self.inner, record).await
        }

        async fn create_batch(&self, records: &[SendRecord]) -> Result<(), StoreError> {
            self.inner.create_batch(records).await
        }

        async fn update_outcome(&self, id: Uuid, outcome: &Outcome) -> Result<(), StoreError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.inner.update_outcome(id, outcome).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<SendRecord>, StoreError> {
            SendRecordStore::get(&*self.inner, id).await
        }

        async fn query(
            &self,
            filter: &SendRecordFilter,
            page: PageRequest,
        ) -> Result<Page<SendRecord>, StoreError> {
            self.inner.query(filter, page).await
        }
    }

    async fn memory_with_channel() -> (Arc<MemoryStore>, Uuid) {
        let memory = Arc::new(MemoryStore::new());
        memory.add_template("welcome", "en", "Hello {{name}}").await;
        let channel = memory
            .add_channel(
                "debug",
                ChannelType::Email,
                json!({"protocol": "DEBUG", "minDelayMs": 0, "maxDelayMs": 2}),
            )
            .await;
        (memory, channel)
    }

    fn engine_over(stores: EngineStores, max_concurrency: usize) -> DispatchEngine {
        let registry =
            SenderRegistry::builtin(reqwest::Client::new(), DebugDefaults::default(), false);
        DispatchEngine::new(
            stores,
            Arc::new(registry),
            RoutingPolicy::default(),
            DispatchSettings {
                max_concurrency,
                ..DispatchSettings::default()
            },
            "en",
        )
    }

    fn request(recipients: &[&str]) -> SubmitRequest {
        SubmitRequest {
            template_code: "welcome".into(),
            language: "en".into(),
            params: json!({"name": "Ann"}),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            channel_id: None,
        }
    }

    #[test]
    fn test_normalize_recipients() {
        let raw: Vec<String> = [" a@x.com", "", "b@x.com", "a@x.com ", "   "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(normalize_recipients(&raw), vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let err = validate_submission(SubmitRequest {
            template_code: " ".into(),
            language: "".into(),
            params: json!([1]),
            recipients: vec!["  ".into()],
            channel_id: None,
        })
        .unwrap_err();
        let EngineError::Validation(problems) = err else {
            panic!("expected validation error");
        };
        assert_eq!(problems.len(), 4);
    }

    #[test]
    fn test_validation_accepts_null_params() {
        let mut req = request(&["a@x.com"]);
        req.params = Value::Null;
        let task = validate_submission(req).unwrap();
        assert_eq!(task.params, json!({}));
        assert_eq!(task.recipients, vec!["a@x.com"]);
    }

    #[tokio::test]
    async fn test_panicking_unit_is_recorded_as_send_panic() {
        let (memory, channel) = memory_with_channel().await;
        let mut stores = EngineStores::shared(memory.clone());
        stores.records = Arc::new(PanickingRecords {
            inner: memory.clone(),
            recipient: "boom@x.com".into(),
        });
        let engine = engine_over(stores, 4);

        let mut req = request(&["a@x.com", "boom@x.com", "c@x.com"]);
        req.channel_id = Some(channel);
        let handle = engine.submit(req).await.unwrap();
        let task_id = handle.task_id();
        let summary = handle.wait().await.unwrap();
        assert_eq!((summary.succeeded, summary.failed), (2, 1));

        let records = memory.records_for_task(task_id).await;
        for record in &records {
            if record.recipient == "boom@x.com" {
                assert_eq!(record.status, DeliveryStatus::Failed);
                assert_eq!(record.error_code.as_deref(), Some(codes::SEND_PANIC));
                assert_eq!(record.channel_id, Some(channel));
                assert_eq!(record.rendered_content.as_deref(), Some("Hello Ann"));
            } else {
                assert_eq!(record.status, DeliveryStatus::Sent);
                assert!(record.error_code.is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_sends_in_flight_never_exceed_max_concurrency() {
        let (memory, channel) = memory_with_channel().await;
        let counting = Arc::new(CountingRecords {
            inner: memory.clone(),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut stores = EngineStores::shared(memory.clone());
        stores.records = counting.clone();
        let engine = engine_over(stores, 3);

        let recipients: Vec<String> = (0..12).map(|i| format!("user{i}@x.com")).collect();
        let refs: Vec<&str> = recipients.iter().map(String::as_str).collect();
        let mut req = request(&refs);
        req.channel_id = Some(channel);
        let summary = engine.submit(req).await.unwrap().wait().await.unwrap();
        assert_eq!(summary.succeeded, 12);

        let peak = counting.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "{peak} sends in flight with a limit of 3");
        assert!(peak >= 2, "sends never overlapped (peak {peak})");
    }
}
