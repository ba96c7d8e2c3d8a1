//! Module catalog and entitlement repository

use crate::domain::{Module, OrganizationModule, UserModulePermission};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Catalog rows for the given module codes.
    async fn find_by_codes(&self, codes: &[String]) -> Result<Vec<Module>>;

    /// Active, non-expired subscriptions of an organization, restricted to
    /// the given codes. Expiry is evaluated against the store's clock so the
    /// check always reads current state.
    async fn find_active_for_organization(
        &self,
        organization_id: i64,
        codes: &[String],
    ) -> Result<Vec<OrganizationModule>>;

    /// Per-user override rows for `(organization, user)`, restricted to the
    /// given codes.
    async fn find_user_permissions(
        &self,
        organization_id: i64,
        user_id: i64,
        codes: &[String],
    ) -> Result<Vec<UserModulePermission>>;
}

pub struct ModuleRepositoryImpl {
    pool: MySqlPool,
}

impl ModuleRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl ModuleRepository for ModuleRepositoryImpl {
    async fn find_by_codes(&self, codes: &[String]) -> Result<Vec<Module>> {
        if codes.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT id, code, name FROM modules WHERE code IN ({})",
            placeholders(codes.len())
        );

        let mut query = sqlx::query_as::<_, Module>(&sql);
        for code in codes {
            query = query.bind(code);
        }

        let modules = query.fetch_all(&self.pool).await?;
        Ok(modules)
    }

    async fn find_active_for_organization(
        &self,
        organization_id: i64,
        codes: &[String],
    ) -> Result<Vec<OrganizationModule>> {
        if codes.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            r#"
            SELECT om.organization_id, om.module_id, m.code, om.active, om.subscription_end_date
            FROM organization_modules om
            INNER JOIN modules m ON m.id = om.module_id
            WHERE om.organization_id = ?
              AND om.active = TRUE
              AND (om.subscription_end_date IS NULL OR om.subscription_end_date > NOW())
              AND m.code IN ({})
            "#,
            placeholders(codes.len())
        );

        let mut query = sqlx::query_as::<_, OrganizationModule>(&sql).bind(organization_id);
        for code in codes {
            query = query.bind(code);
        }

        let modules = query.fetch_all(&self.pool).await?;
        Ok(modules)
    }

    async fn find_user_permissions(
        &self,
        organization_id: i64,
        user_id: i64,
        codes: &[String],
    ) -> Result<Vec<UserModulePermission>> {
        if codes.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            r#"
            SELECT ump.organization_id, ump.user_id, ump.module_id, m.code,
                   ump.can_access, ump.permissions
            FROM user_module_permissions ump
            INNER JOIN modules m ON m.id = ump.module_id
            WHERE ump.organization_id = ? AND ump.user_id = ? AND m.code IN ({})
            "#,
            placeholders(codes.len())
        );

        let mut query = sqlx::query_as::<_, UserModulePermission>(&sql)
            .bind(organization_id)
            .bind(user_id);
        for code in codes {
            query = query.bind(code);
        }

        let permissions = query.fetch_all(&self.pool).await?;
        Ok(permissions)
    }
}
