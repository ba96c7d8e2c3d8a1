//! Access control guard pipeline
//!
//! A request's authorization plan is data: an [`AccessPolicy`] expands into
//! an ordered list of [`GuardStep`]s, and [`AccessEngine::authorize`] runs
//! the steps in order, stopping at the first denial. Each step is backed by
//! a free function or gate method that can be unit-tested on its own.

pub mod capability;
pub mod membership;
pub mod module_gate;
pub mod ownership;

pub use capability::member_access_allowed;
pub use membership::{resolve_membership, OrgIdHints, OrgSource, ResolvedMembership};
pub use module_gate::{ModuleGate, ModuleGrant};
pub use ownership::verify_resource_access;

use crate::domain::{Actor, OrganizationModule, ResourceType, Role};
use crate::error::{AppError, Result};
use crate::repository::{
    AuditRepository, MembershipRepository, ModuleRepository, ResourceRepository,
};
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// How the request intends to touch the resource, derived from the verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Delete,
}

impl From<&Method> for AccessMode {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => AccessMode::Read,
            Method::DELETE => AccessMode::Delete,
            _ => AccessMode::Write,
        }
    }
}

/// Request facts carried through the guards for auditing and verb mapping.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub path: String,
}

impl RequestMeta {
    pub fn mode(&self) -> AccessMode {
        AccessMode::from(&self.method)
    }
}

/// A single module + feature key requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequirement {
    pub module: String,
    pub feature: String,
}

/// What an endpoint requires of the caller. Unset parts skip their step.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Verify ownership of the addressed resource instance, when an id is
    /// present in the request.
    pub resource: Option<ResourceType>,
    /// Allow-list of roles permitted on the endpoint.
    pub allowed_roles: Option<Vec<Role>>,
    /// Module codes the organization (and actor) must be entitled to.
    pub required_modules: Vec<String>,
    /// Single feature requirement, gated through its module.
    pub required_feature: Option<FeatureRequirement>,
}

impl AccessPolicy {
    /// The ordered guard plan for this policy. Membership resolution always
    /// runs first; later steps only appear when the policy asks for them.
    pub fn steps(&self) -> Vec<GuardStep> {
        let mut steps = vec![GuardStep::ResolveMembership];
        if self.allowed_roles.is_some() {
            steps.push(GuardStep::RestrictRoles);
        }
        if self.resource.is_some() {
            steps.push(GuardStep::VerifyResource);
        }
        if !self.required_modules.is_empty() {
            steps.push(GuardStep::RequireModules);
        }
        if self.required_feature.is_some() {
            steps.push(GuardStep::RequireFeature);
        }
        steps
    }
}

/// One stage of the guard pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStep {
    ResolveMembership,
    RestrictRoles,
    VerifyResource,
    RequireModules,
    RequireFeature,
}

/// Everything the engine needs from one incoming request.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub actor: Actor,
    pub hints: OrgIdHints,
    pub resource_id: Option<i64>,
    pub meta: RequestMeta,
}

/// The resolved authorization context attached to the request on success.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub actor_id: i64,
    pub organization_id: i64,
    pub role: Role,
    pub source: OrgSource,
    pub modules: Vec<OrganizationModule>,
    pub permissions: HashMap<String, HashMap<String, bool>>,
}

/// The access control engine: membership resolution, resource ownership
/// verification, role capability rules, and module gating, executed as an
/// ordered short-circuiting pipeline.
pub struct AccessEngine<Me, Rr, Mo, Au>
where
    Me: MembershipRepository,
    Rr: ResourceRepository,
    Mo: ModuleRepository,
    Au: AuditRepository,
{
    memberships: Arc<Me>,
    resources: Arc<Rr>,
    gate: ModuleGate<Mo, Au>,
}

impl<Me, Rr, Mo, Au> AccessEngine<Me, Rr, Mo, Au>
where
    Me: MembershipRepository,
    Rr: ResourceRepository,
    Mo: ModuleRepository,
    Au: AuditRepository,
{
    pub fn new(
        memberships: Arc<Me>,
        resources: Arc<Rr>,
        modules: Arc<Mo>,
        audit: Arc<Au>,
    ) -> Self {
        Self {
            memberships,
            resources,
            gate: ModuleGate::new(modules, audit),
        }
    }

    /// Run the policy's guard plan against the request. Returns the populated
    /// [`AccessContext`] on full success; the first failing step's error
    /// otherwise.
    pub async fn authorize(
        &self,
        request: &AccessRequest,
        policy: &AccessPolicy,
    ) -> Result<AccessContext> {
        let mut resolved: Option<ResolvedMembership> = None;
        let mut grant = ModuleGrant::default();

        for step in policy.steps() {
            match step {
                GuardStep::ResolveMembership => {
                    resolved = Some(resolve_membership(&request.actor, &request.hints)?);
                }
                GuardStep::RestrictRoles => {
                    let caller = resolved_or_err(&resolved)?;
                    let allowed = policy.allowed_roles.as_deref().unwrap_or_default();
                    membership::require_role(caller, allowed)?;
                }
                GuardStep::VerifyResource => {
                    let caller = resolved_or_err(&resolved)?;
                    let resource = policy.resource.ok_or_else(|| {
                        AppError::Configuration(
                            "VerifyResource step scheduled without a resource type".to_string(),
                        )
                    })?;
                    verify_resource_access(
                        self.memberships.as_ref(),
                        self.resources.as_ref(),
                        caller,
                        resource,
                        request.resource_id,
                        request.meta.mode(),
                    )
                    .await?;
                }
                GuardStep::RequireModules => {
                    let caller = resolved_or_err(&resolved)?;
                    grant = self
                        .gate
                        .require_modules(caller, &policy.required_modules, &request.meta)
                        .await?;
                }
                GuardStep::RequireFeature => {
                    let caller = resolved_or_err(&resolved)?;
                    let requirement = policy.required_feature.as_ref().ok_or_else(|| {
                        AppError::Configuration(
                            "RequireFeature step scheduled without a feature requirement"
                                .to_string(),
                        )
                    })?;
                    let feature_grant = self
                        .gate
                        .require_feature(
                            caller,
                            &requirement.module,
                            &requirement.feature,
                            &request.meta,
                        )
                        .await?;
                    merge_grant(&mut grant, feature_grant);
                }
            }
        }

        let caller = resolved_or_err(&resolved)?;
        Ok(AccessContext {
            actor_id: caller.actor_id,
            organization_id: caller.organization_id,
            role: caller.role,
            source: caller.source,
            modules: grant.modules,
            permissions: grant.permissions,
        })
    }
}

fn resolved_or_err(resolved: &Option<ResolvedMembership>) -> Result<&ResolvedMembership> {
    resolved.as_ref().ok_or_else(|| {
        AppError::Configuration(
            "Guard pipeline executed a step before membership resolution".to_string(),
        )
    })
}

fn merge_grant(into: &mut ModuleGrant, from: ModuleGrant) {
    for module in from.modules {
        if !into.modules.iter().any(|m| m.module_id == module.module_id) {
            into.modules.push(module);
        }
    }
    into.permissions.extend(from.permissions);
}
