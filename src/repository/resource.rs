//! Organization-scoped resource existence checks
//!
//! Queries are assembled from the static `ResourceDescriptor` table, so table
//! and column names are compile-time constants; only the id values are bound.

use crate::domain::ResourceType;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Whether a row of the given type exists with this id inside the
    /// organization.
    async fn exists_in_organization(
        &self,
        resource: ResourceType,
        resource_id: i64,
        organization_id: i64,
    ) -> Result<bool>;
}

pub struct ResourceRepositoryImpl {
    pool: MySqlPool,
}

impl ResourceRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceRepository for ResourceRepositoryImpl {
    async fn exists_in_organization(
        &self,
        resource: ResourceType,
        resource_id: i64,
        organization_id: i64,
    ) -> Result<bool> {
        let d = resource.descriptor();
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? AND {} = ? LIMIT 1",
            d.collection, d.id_column, d.org_column
        );

        let row: Option<(i32,)> = sqlx::query_as(&sql)
            .bind(resource_id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }
}
