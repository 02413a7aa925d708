//! In-process store behind tokio `RwLock`s.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use courier_common::types::{Channel, ChannelType, DeliveryStatus, SendRecord, Task};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ChannelStore, Outcome, Page, PageRequest, SendRecordFilter, SendRecordStore, StoreError,
    TaskStore, TemplateStore,
};

#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    records: RwLock<HashMap<Uuid, SendRecord>>,
    channels: RwLock<HashMap<Uuid, Channel>>,
    /// (code, lowercase language) → content
    templates: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_template(&self, code: &str, language: &str, content: &str) {
        self.templates.write().await.insert(
            (code.to_string(), language.trim().to_ascii_lowercase()),
            content.to_string(),
        );
    }

    /// Register a channel and return its id.
    pub async fn add_channel(
        &self,
        name: &str,
        channel_type: ChannelType,
        properties: serde_json::Value,
    ) -> Uuid {
        let now = Utc::now();
        let channel = Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            channel_type,
            description: None,
            properties,
            created_at: now,
            updated_at: now,
        };
        let id = channel.id;
        self.channels.write().await.insert(id, channel);
        id
    }

    pub async fn records_for_task(&self, task_id: Uuid) -> Vec<SendRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.recipient_index);
        records
    }
}

/// Reject `records` if any id or (task, recipient) pair is already taken.
fn check_batch(stored: &HashMap<Uuid, SendRecord>, records: &[SendRecord]) -> Result<(), StoreError> {
    for (i, record) in records.iter().enumerate() {
        let clash = stored.values().chain(&records[..i]).any(|r| {
            r.id == record.id || (r.task_id == record.task_id && r.recipient == record.recipient)
        });
        if clash {
            return Err(StoreError::Duplicate(format!(
                "task {} recipient {}",
                record.task_id, record.recipient
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl SendRecordStore for MemoryStore {
    async fn create(&self, record: &SendRecord) -> Result<(), StoreError> {
        self.create_batch(std::slice::from_ref(record)).await
    }

    async fn create_batch(&self, records: &[SendRecord]) -> Result<(), StoreError> {
        let mut stored = self.records.write().await;
        check_batch(&stored, records)?;
        for record in records {
            stored.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn update_outcome(&self, id: Uuid, outcome: &Outcome) -> Result<(), StoreError> {
        let mut stored = self.records.write().await;
        let record = stored.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status != DeliveryStatus::Pending {
            return Err(StoreError::Conflict(id));
        }
        outcome.apply(record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SendRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn query(
        &self,
        filter: &SendRecordFilter,
        page: PageRequest,
    ) -> Result<Page<SendRecord>, StoreError> {
        let stored = self.records.read().await;
        let mut matches: Vec<&SendRecord> = stored.values().filter(|r| filter.matches(r)).collect();
        matches.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
                .then_with(|| a.recipient_index.cmp(&b.recipient_index))
        });

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(format!("task {}", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn create_with_records(
        &self,
        task: &Task,
        records: &[SendRecord],
    ) -> Result<(), StoreError> {
        // Lock order: tasks, then records.
        let mut tasks = self.tasks.write().await;
        let mut stored = self.records.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(format!("task {}", task.id)));
        }
        check_batch(&stored, records)?;
        tasks.insert(task.id, task.clone());
        for record in records {
            stored.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn find_content(&self, code: &str, language: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .templates
            .read()
            .await
            .get(&(code.to_string(), language.to_string()))
            .cloned())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        Ok(self.channels.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SuccessFilter;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn task(recipients: &[&str]) -> Task {
        Task {
            id: Uuid::new_v4(),
            template_code: "welcome".into(),
            language_code: "en".into(),
            params: serde_json::json!({}),
            channel_id: None,
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            submitted_at: Utc::now(),
        }
    }

    fn records(task: &Task) -> Vec<SendRecord> {
        (0..task.recipients.len())
            .map(|i| SendRecord::pending(task, i))
            .collect()
    }

    #[tokio::test]
    async fn test_update_outcome_is_single_transition() {
        let store = MemoryStore::new();
        let task = task(&["a@x.com"]);
        let record = SendRecord::pending(&task, 0);
        SendRecordStore::create(&store, &record).await.unwrap();

        let sent = Outcome::from_response(
            &courier_notifier::MessageResponse::success(Some("m1".to_string())),
            Some("Hi".into()),
            None,
        );
        store.update_outcome(record.id, &sent).await.unwrap();

        let failed = Outcome::failed("TIMEOUT", "late", None, None);
        let err = store.update_outcome(record.id, &failed).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == record.id));

        let stored = SendRecordStore::get(&store, record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Sent);
        assert_eq!(stored.rendered_content.as_deref(), Some("Hi"));
        assert!(stored.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_create_batch_rejects_duplicate_recipient() {
        let store = MemoryStore::new();
        let task = task(&["a@x.com"]);
        let first = records(&task);
        store.create_batch(&first).await.unwrap();

        let again = vec![SendRecord::pending(&task, 0)];
        assert!(matches!(
            store.create_batch(&again).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.records_for_task(task.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_with_records_is_all_or_nothing() {
        let store = MemoryStore::new();
        let task = task(&["a@x.com", "b@x.com"]);
        let mut recs = records(&task);
        recs[1].recipient = "a@x.com".into();

        let result = store.create_with_records(&task, &recs).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
        assert!(TaskStore::get(&store, task.id).await.unwrap().is_none());
        assert!(store.records_for_task(task.id).await.is_empty());

        let recs = records(&task);
        store.create_with_records(&task, &recs).await.unwrap();
        assert!(TaskStore::get(&store, task.id).await.unwrap().is_some());
        assert_eq!(store.records_for_task(task.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_query_pagination_and_order() {
        let store = MemoryStore::new();
        let recipients: Vec<String> = (0..25).map(|i| format!("user{i}@x.com")).collect();
        let refs: Vec<&str> = recipients.iter().map(String::as_str).collect();
        let mut older = task(&refs[..5]);
        older.submitted_at = Utc::now() - Duration::minutes(5);
        let newer = task(&refs[5..]);
        store.create_batch(&records(&older)).await.unwrap();
        store.create_batch(&records(&newer)).await.unwrap();

        let page = store
            .query(&SendRecordFilter::default(), PageRequest { page: 2, size: 10 })
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items.len(), 10);
        assert!(page.items.iter().all(|r| r.task_id == newer.id));
        assert_eq!(page.items[0].recipient_index, 10);

        let last = store
            .query(&SendRecordFilter::default(), PageRequest { page: 3, size: 10 })
            .await
            .unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(last.items.iter().all(|r| r.task_id == older.id));
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = MemoryStore::new();
        let task = task(&["a@x.com", "b@x.com"]);
        let recs = records(&task);
        store.create_batch(&recs).await.unwrap();
        store
            .update_outcome(recs[0].id, &Outcome::failed("NO_ROUTE", "none", None, None))
            .await
            .unwrap();

        let filter = SendRecordFilter {
            success: Some(SuccessFilter::Pending),
            ..Default::default()
        };
        let page = store.query(&filter, PageRequest { page: 1, size: 10 }).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].recipient, "b@x.com");

        let filter = SendRecordFilter {
            recipient: Some("a@x.com".into()),
            ..Default::default()
        };
        let page = store.query(&filter, PageRequest { page: 1, size: 10 }).await.unwrap();
        assert_eq!(page.items[0].error_code.as_deref(), Some("NO_ROUTE"));
    }
}
