//! Membership resolution for the current request
//!
//! Determines the active organization and the actor's role within it. The
//! organization id comes from the path parameter, the query parameter or the
//! body field, in that priority order; when none is supplied the actor's
//! first membership is used. The fallback is a usability shortcut, not a
//! security decision, and it is logged and stamped into the audit trail so
//! the default path stays distinguishable from explicit resolution.

use crate::domain::{Actor, Role};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Where the active organization id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgSource {
    PathParam,
    QueryParam,
    BodyField,
    DefaultMembership,
}

impl OrgSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgSource::PathParam => "path_param",
            OrgSource::QueryParam => "query_param",
            OrgSource::BodyField => "body_field",
            OrgSource::DefaultMembership => "default_membership",
        }
    }
}

/// Organization-id candidates extracted from the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrgIdHints {
    pub path: Option<i64>,
    pub query: Option<i64>,
    pub body: Option<i64>,
}

/// The membership resolved for the current request, attached to the request
/// context for downstream guards and handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMembership {
    pub organization_id: i64,
    pub actor_id: i64,
    pub role: Role,
    pub source: OrgSource,
}

/// Resolve the active organization and the actor's role within it.
pub fn resolve_membership(actor: &Actor, hints: &OrgIdHints) -> Result<ResolvedMembership> {
    let (organization_id, source) = if let Some(id) = hints.path {
        (id, OrgSource::PathParam)
    } else if let Some(id) = hints.query {
        (id, OrgSource::QueryParam)
    } else if let Some(id) = hints.body {
        (id, OrgSource::BodyField)
    } else if let Some(membership) = actor.memberships.first() {
        tracing::info!(
            actor_id = actor.id,
            organization_id = membership.organization_id,
            "no explicit organization id supplied; defaulting to first membership"
        );
        (membership.organization_id, OrgSource::DefaultMembership)
    } else {
        return Err(AppError::OrganizationRequired);
    };

    let membership = actor.membership_in(organization_id).ok_or_else(|| {
        AppError::Forbidden("You are not a member of this organization".to_string())
    })?;

    Ok(ResolvedMembership {
        organization_id,
        actor_id: actor.id,
        role: membership.role,
        source,
    })
}

/// Compare the resolved role against an endpoint's allow-list.
pub fn require_role(caller: &ResolvedMembership, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&caller.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Your role does not permit this operation".to_string(),
        ))
    }
}
