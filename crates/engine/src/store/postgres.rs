//! PostgreSQL store. Schema lives in `migrations/`.

use async_trait::async_trait;
use courier_common::types::{Channel, ChannelType, SendRecord, Task};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    ChannelStore, Outcome, Page, PageRequest, SendRecordFilter, SendRecordStore, StoreError,
    TaskStore, TemplateStore,
};

/// Unique (task_id, recipient) violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a template with one language variant, creating the template if needed.
    pub async fn upsert_template(
        &self,
        code: &str,
        language: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let template_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO templates (id, code, name)
            VALUES ($1, $2, $2)
            ON CONFLICT (code) DO UPDATE SET updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO language_templates (id, template_id, language, content)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (template_id, language)
            DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(template_id)
        .bind(language.trim().to_ascii_lowercase())
        .bind(content)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_channel(
        &self,
        name: &str,
        channel_type: ChannelType,
        properties: &serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO channels (id, name, channel_type, properties)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(channel_type.as_str())
        .bind(properties)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }
}

fn map_insert_error(err: sqlx::Error, what: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate(what)
        }
        _ => StoreError::Database(err),
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &SendRecordFilter) {
    builder.push(" WHERE TRUE");
    if let Some(task_id) = filter.task_id {
        builder.push(" AND task_id = ").push_bind(task_id);
    }
    if let Some(recipient) = &filter.recipient {
        builder.push(" AND recipient = ").push_bind(recipient.clone());
    }
    if let Some(channel_type) = filter.channel_type {
        builder
            .push(" AND channel_type = ")
            .push_bind(channel_type.as_str());
    }
    if let Some(success) = filter.success {
        builder
            .push(" AND status = ")
            .push_bind(success.status().as_str());
    }
}

async fn insert_task(conn: &mut PgConnection, task: &Task) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO tasks (id, template_code, language_code, params, channel_id, recipients, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(task.id)
    .bind(&task.template_code)
    .bind(&task.language_code)
    .bind(&task.params)
    .bind(task.channel_id)
    .bind(&task.recipients)
    .bind(task.submitted_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_insert_error(e, format!("task {}", task.id)))?;
    Ok(())
}

async fn insert_records(conn: &mut PgConnection, records: &[SendRecord]) -> Result<(), StoreError> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO send_records (
                id, task_id, template_code, language_code, params, channel_id,
                channel_type, channel_name, recipients, recipient, recipient_index,
                submitted_at, rendered_content, status, error_code, error_message, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(record.id)
        .bind(record.task_id)
        .bind(&record.template_code)
        .bind(&record.language_code)
        .bind(&record.params)
        .bind(record.channel_id)
        .bind(record.channel_type.map(|t| t.as_str()))
        .bind(&record.channel_name)
        .bind(&record.recipients)
        .bind(&record.recipient)
        .bind(record.recipient_index)
        .bind(record.submitted_at)
        .bind(&record.rendered_content)
        .bind(record.status.as_str())
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(record.sent_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            map_insert_error(
                e,
                format!("task {} recipient {}", record.task_id, record.recipient),
            )
        })?;
    }
    Ok(())
}

#[async_trait]
impl SendRecordStore for PgStore {
    async fn create(&self, record: &SendRecord) -> Result<(), StoreError> {
        self.create_batch(std::slice::from_ref(record)).await
    }

    async fn create_batch(&self, records: &[SendRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_records(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_outcome(&self, id: Uuid, outcome: &Outcome) -> Result<(), StoreError> {
        let channel = outcome.channel.as_ref();
        let result = sqlx::query(
            r#"
            UPDATE send_records
            SET status = $2,
                error_code = $3,
                error_message = $4,
                rendered_content = $5,
                channel_id = $6,
                channel_type = $7,
                channel_name = $8,
                sent_at = $9
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(outcome.status.as_str())
        .bind(&outcome.error_code)
        .bind(&outcome.error_message)
        .bind(&outcome.rendered_content)
        .bind(channel.map(|c| c.id))
        .bind(channel.map(|c| c.channel_type.as_str()))
        .bind(channel.map(|c| c.name.as_str()))
        .bind(outcome.sent_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM send_records WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Err(StoreError::Conflict(id))
        } else {
            Err(StoreError::NotFound(id))
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<SendRecord>, StoreError> {
        let record = sqlx::query_as("SELECT * FROM send_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn query(
        &self,
        filter: &SendRecordFilter,
        page: PageRequest,
    ) -> Result<Page<SendRecord>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM send_records");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM send_records");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY submitted_at DESC, task_id, recipient_index LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let items = select
            .build_query_as::<SendRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
        })
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_task(&mut conn, task).await
    }

    async fn create_with_records(
        &self,
        task: &Task,
        records: &[SendRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_task(&mut tx, task).await?;
        insert_records(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }
}

#[async_trait]
impl TemplateStore for PgStore {
    async fn find_content(&self, code: &str, language: &str) -> Result<Option<String>, StoreError> {
        let content = sqlx::query_scalar(
            r#"
            SELECT lt.content
            FROM language_templates lt
            JOIN templates t ON lt.template_id = t.id
            WHERE t.code = $1 AND lt.language = $2
            "#,
        )
        .bind(code)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content)
    }
}

#[async_trait]
impl ChannelStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        let channel = sqlx::query_as("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }
}
