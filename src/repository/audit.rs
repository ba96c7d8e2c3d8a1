//! Access audit trail repository
//!
//! Records are append-only: this subsystem creates them once per module-gate
//! evaluation and never mutates or deletes them.

use crate::domain::{AccessAuditRecord, AuditAction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::MySqlPool;

/// Input for creating an audit record
#[derive(Debug, Clone)]
pub struct CreateAccessAuditInput {
    pub organization_id: i64,
    pub actor_id: i64,
    pub module_id: Option<i64>,
    pub action: AuditAction,
    pub details: serde_json::Value,
}

/// Audit trail query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub organization_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub action: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn create(&self, input: &CreateAccessAuditInput) -> Result<()>;
    async fn find(&self, query: &AuditQuery) -> Result<Vec<AccessAuditRecord>>;
    async fn count(&self, query: &AuditQuery) -> Result<i64>;
}

pub struct AuditRepositoryImpl {
    pool: MySqlPool,
}

impl AuditRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Caller-supplied paging values go straight into `LIMIT ? OFFSET ?`, so
/// out-of-range input is clamped here rather than bounced off the database.
fn page_bounds(query: &AuditQuery) -> (i64, i64) {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

fn push_filters(sql: &mut String, query: &AuditQuery) {
    if query.organization_id.is_some() {
        sql.push_str(" AND organization_id = ?");
    }
    if query.actor_id.is_some() {
        sql.push_str(" AND actor_id = ?");
    }
    if query.action.is_some() {
        sql.push_str(" AND action = ?");
    }
    if query.from_date.is_some() {
        sql.push_str(" AND created_at >= ?");
    }
    if query.to_date.is_some() {
        sql.push_str(" AND created_at <= ?");
    }
}

macro_rules! bind_filters {
    ($builder:expr, $query:expr) => {{
        let mut builder = $builder;
        if let Some(organization_id) = $query.organization_id {
            builder = builder.bind(organization_id);
        }
        if let Some(actor_id) = $query.actor_id {
            builder = builder.bind(actor_id);
        }
        if let Some(ref action) = $query.action {
            builder = builder.bind(action);
        }
        if let Some(from_date) = $query.from_date {
            builder = builder.bind(from_date);
        }
        if let Some(to_date) = $query.to_date {
            builder = builder.bind(to_date);
        }
        builder
    }};
}

#[async_trait]
impl AuditRepository for AuditRepositoryImpl {
    async fn create(&self, input: &CreateAccessAuditInput) -> Result<()> {
        let details = serde_json::to_string(&input.details).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO access_audit_records
                (organization_id, actor_id, module_id, action, details, performed_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(input.organization_id)
        .bind(input.actor_id)
        .bind(input.module_id)
        .bind(input.action.as_str())
        .bind(details)
        .bind(input.actor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, query: &AuditQuery) -> Result<Vec<AccessAuditRecord>> {
        let mut sql = String::from(
            "SELECT id, organization_id, actor_id, module_id, action, details, performed_by, created_at \
             FROM access_audit_records WHERE 1=1",
        );
        push_filters(&mut sql, query);
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let builder = bind_filters!(sqlx::query_as::<_, AccessAuditRecord>(&sql), query);

        let (limit, offset) = page_bounds(query);

        let records = builder.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        Ok(records)
    }

    async fn count(&self, query: &AuditQuery) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM access_audit_records WHERE 1=1");
        push_filters(&mut sql, query);

        let builder = bind_filters!(sqlx::query_as::<_, (i64,)>(&sql), query);

        let (count,) = builder.fetch_one(&self.pool).await?;
        Ok(count)
    }
}
