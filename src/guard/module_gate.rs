//! Module subscription gate
//!
//! Confirms the active organization holds a live license for the required
//! feature modules and that no per-user override revokes it. Every gate
//! evaluation writes one audit record before the decision is returned; a
//! failed audit write is logged and does not flip the decision.

use crate::domain::{AuditAction, OrganizationModule, Role};
use crate::error::{AppError, Result};
use crate::guard::membership::{require_role, ResolvedMembership};
use crate::guard::RequestMeta;
use crate::repository::audit::CreateAccessAuditInput;
use crate::repository::{AuditRepository, ModuleRepository};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The entitlement attached to the request context on a successful grant.
#[derive(Debug, Clone, Default)]
pub struct ModuleGrant {
    /// The organization's entitled module rows for the required codes.
    pub modules: Vec<OrganizationModule>,
    /// Per-user feature maps, keyed by module code. Absent entries inherit
    /// the organization-level grant.
    pub permissions: HashMap<String, HashMap<String, bool>>,
}

pub struct ModuleGate<M: ModuleRepository, A: AuditRepository> {
    modules: Arc<M>,
    audit: Arc<A>,
}

impl<M: ModuleRepository, A: AuditRepository> ModuleGate<M, A> {
    pub fn new(modules: Arc<M>, audit: Arc<A>) -> Self {
        Self { modules, audit }
    }

    /// Gate the request on the organization's subscription to every code in
    /// `codes`, then on the actor's per-user overrides.
    pub async fn require_modules(
        &self,
        caller: &ResolvedMembership,
        codes: &[String],
        meta: &RequestMeta,
    ) -> Result<ModuleGrant> {
        if codes.is_empty() {
            return Err(AppError::Configuration(
                "Module gate invoked with an empty module list".to_string(),
            ));
        }

        let catalog = self.modules.find_by_codes(codes).await?;
        let active = self
            .modules
            .find_active_for_organization(caller.organization_id, codes)
            .await?;

        let active_codes: HashSet<&str> = active.iter().map(|m| m.code.as_str()).collect();
        let missing: Vec<String> = codes
            .iter()
            .filter(|code| !active_codes.contains(code.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            let module_id = catalog
                .iter()
                .find(|m| m.code == missing[0])
                .map(|m| m.id);
            let mut details = self.base_details(caller, meta);
            details["missingModules"] = serde_json::json!(missing);
            self.record(caller, module_id, AuditAction::AccessDenied, details)
                .await;
            return Err(AppError::ModuleAccessDenied { missing });
        }

        let overrides = self
            .modules
            .find_user_permissions(caller.organization_id, caller.actor_id, codes)
            .await?;

        let denied: Vec<String> = overrides
            .iter()
            .filter(|o| !o.can_access)
            .map(|o| o.code.clone())
            .collect();

        if !denied.is_empty() {
            let module_id = overrides
                .iter()
                .find(|o| o.code == denied[0])
                .map(|o| o.module_id);
            let mut details = self.base_details(caller, meta);
            details["deniedModules"] = serde_json::json!(denied);
            self.record(caller, module_id, AuditAction::AccessDenied, details)
                .await;
            return Err(AppError::UserModuleAccessDenied { denied });
        }

        let permissions = overrides
            .into_iter()
            .map(|o| (o.code, o.permissions))
            .collect();

        // One grant record per evaluation, keyed by the first required module.
        let module_id = catalog.iter().find(|m| m.code == codes[0]).map(|m| m.id);
        self.record(
            caller,
            module_id,
            AuditAction::AccessGranted,
            self.base_details(caller, meta),
        )
        .await;

        Ok(ModuleGrant {
            modules: active,
            permissions,
        })
    }

    /// Gate a single module plus one feature key within it.
    ///
    /// A feature is denied only when the per-user map for the module exists
    /// and explicitly sets the key to false. Map absent, key absent, or key
    /// true all allow: module grants are coarse and per-feature revocation is
    /// the exception, not the norm.
    pub async fn require_feature(
        &self,
        caller: &ResolvedMembership,
        module: &str,
        feature: &str,
        meta: &RequestMeta,
    ) -> Result<ModuleGrant> {
        let grant = self
            .require_modules(caller, &[module.to_string()], meta)
            .await?;

        if let Some(map) = grant.permissions.get(module) {
            if map.get(feature) == Some(&false) {
                let module_id = grant
                    .modules
                    .iter()
                    .find(|m| m.code == module)
                    .map(|m| m.module_id);
                let mut details = self.base_details(caller, meta);
                details["module"] = serde_json::json!(module);
                details["feature"] = serde_json::json!(feature);
                self.record(caller, module_id, AuditAction::AccessDenied, details)
                    .await;
                return Err(AppError::FeatureAccessDenied {
                    module: module.to_string(),
                    feature: feature.to_string(),
                });
            }
        }

        Ok(grant)
    }

    /// Role allow-list check followed by the module gate. Some endpoints need
    /// both preconditions; keeping the sequencing here lets each half stay
    /// independently testable instead of being duplicated per endpoint.
    pub async fn require_role_and_modules(
        &self,
        caller: &ResolvedMembership,
        allowed: &[Role],
        codes: &[String],
        meta: &RequestMeta,
    ) -> Result<ModuleGrant> {
        require_role(caller, allowed)?;
        self.require_modules(caller, codes, meta).await
    }

    fn base_details(&self, caller: &ResolvedMembership, meta: &RequestMeta) -> serde_json::Value {
        serde_json::json!({
            "path": meta.path,
            "method": meta.method.as_str(),
            "source": caller.source.as_str(),
        })
    }

    /// Best-effort relative to the decision: the write is attempted before
    /// the outcome is returned, but a failed insert never flips a grant into
    /// a denial.
    async fn record(
        &self,
        caller: &ResolvedMembership,
        module_id: Option<i64>,
        action: AuditAction,
        details: serde_json::Value,
    ) {
        let input = CreateAccessAuditInput {
            organization_id: caller.organization_id,
            actor_id: caller.actor_id,
            module_id,
            action,
            details,
        };

        if let Err(e) = self.audit.create(&input).await {
            tracing::error!(error = ?e, "failed to write access audit record");
        }
    }
}
