//! Organization membership repository

use crate::domain::{OrganizationMembership, Role};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Find the membership linking a user to an organization, if one exists.
    async fn find(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> Result<Option<OrganizationMembership>>;
}

pub struct MembershipRepositoryImpl {
    pool: MySqlPool,
}

impl MembershipRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for MembershipRepositoryImpl {
    async fn find(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> Result<Option<OrganizationMembership>> {
        let row: Option<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT organization_id, user_id, role
            FROM organization_users
            WHERE user_id = ? AND organization_id = ?
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(organization_id, user_id, role)| {
            Ok(OrganizationMembership {
                organization_id,
                user_id,
                role: Role::parse(&role)?,
            })
        })
        .transpose()
    }
}
