//! Resource ownership verification
//!
//! Confirms that a specific resource instance belongs to the active
//! organization. Cross-organization references surface as `NotFound`, never
//! `Forbidden`: a 403 would reveal that the resource exists. `Forbidden` is
//! reserved for same-organization targets whose role disqualifies the caller
//! (decided by the capability matrix).

use crate::domain::{ResourceKind, ResourceType, Role};
use crate::error::{AppError, Result};
use crate::guard::capability::member_access_allowed;
use crate::guard::membership::ResolvedMembership;
use crate::guard::AccessMode;
use crate::repository::{MembershipRepository, ResourceRepository};

/// Verify that the caller may touch `(resource_type, resource_id)` within the
/// active organization.
///
/// List-style requests carry no resource id and pass through: scoping is
/// deferred to the business query itself.
pub async fn verify_resource_access<M, R>(
    memberships: &M,
    resources: &R,
    caller: &ResolvedMembership,
    resource: ResourceType,
    resource_id: Option<i64>,
    mode: AccessMode,
) -> Result<()>
where
    M: MembershipRepository + ?Sized,
    R: ResourceRepository + ?Sized,
{
    let Some(resource_id) = resource_id else {
        return Ok(());
    };

    match resource.kind() {
        ResourceKind::Relationship => {
            match memberships.find(resource_id, caller.organization_id).await? {
                Some(target) => {
                    if member_access_allowed(caller, target.user_id, target.role) {
                        Ok(())
                    } else {
                        Err(AppError::Forbidden(
                            "Your role does not permit access to this user".to_string(),
                        ))
                    }
                }
                None => {
                    // Superadmin may read and write (but not delete) user
                    // records outside the active organization. This reach is
                    // deliberately limited to the user resource type.
                    if caller.role == Role::Superadmin && mode != AccessMode::Delete {
                        Ok(())
                    } else {
                        Err(AppError::NotFound(format!(
                            "User {} not found",
                            resource_id
                        )))
                    }
                }
            }
        }
        ResourceKind::Owned => {
            let exists = resources
                .exists_in_organization(resource, resource_id, caller.organization_id)
                .await?;
            if exists {
                Ok(())
            } else {
                Err(AppError::NotFound(format!(
                    "Resource {} not found",
                    resource_id
                )))
            }
        }
    }
}
