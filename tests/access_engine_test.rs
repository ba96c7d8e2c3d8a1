//! End-to-end guard pipeline scenarios against in-memory stores.

use async_trait::async_trait;
use axum::http::Method;
use chrono::{Duration, Utc};
use herdgate_core::domain::{
    Actor, AuditAction, Module, OrganizationMembership, OrganizationModule, ResourceType, Role,
    UserModulePermission,
};
use herdgate_core::error::{AppError, Result};
use herdgate_core::guard::{
    AccessEngine, AccessPolicy, AccessRequest, FeatureRequirement, OrgIdHints, RequestMeta,
};
use herdgate_core::repository::audit::{AuditQuery, CreateAccessAuditInput};
use herdgate_core::repository::{
    AuditRepository, MembershipRepository, ModuleRepository, ResourceRepository,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct InMemoryMemberships {
    rows: Vec<OrganizationMembership>,
}

#[async_trait]
impl MembershipRepository for InMemoryMemberships {
    async fn find(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> Result<Option<OrganizationMembership>> {
        Ok(self
            .rows
            .iter()
            .find(|m| m.user_id == user_id && m.organization_id == organization_id)
            .cloned())
    }
}

struct InMemoryResources {
    /// (table, resource id, organization id)
    rows: Vec<(&'static str, i64, i64)>,
    lookups: AtomicUsize,
}

#[async_trait]
impl ResourceRepository for InMemoryResources {
    async fn exists_in_organization(
        &self,
        resource: ResourceType,
        resource_id: i64,
        organization_id: i64,
    ) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let table = resource.descriptor().collection;
        Ok(self
            .rows
            .iter()
            .any(|&(t, id, org)| t == table && id == resource_id && org == organization_id))
    }
}

struct InMemoryModules {
    catalog: Vec<Module>,
    subscriptions: Vec<OrganizationModule>,
    overrides: Vec<UserModulePermission>,
}

#[async_trait]
impl ModuleRepository for InMemoryModules {
    async fn find_by_codes(&self, codes: &[String]) -> Result<Vec<Module>> {
        Ok(self
            .catalog
            .iter()
            .filter(|m| codes.contains(&m.code))
            .cloned()
            .collect())
    }

    async fn find_active_for_organization(
        &self,
        organization_id: i64,
        codes: &[String],
    ) -> Result<Vec<OrganizationModule>> {
        let now = Utc::now();
        Ok(self
            .subscriptions
            .iter()
            .filter(|m| {
                m.organization_id == organization_id
                    && codes.contains(&m.code)
                    && m.is_entitled(now)
            })
            .cloned()
            .collect())
    }

    async fn find_user_permissions(
        &self,
        organization_id: i64,
        user_id: i64,
        codes: &[String],
    ) -> Result<Vec<UserModulePermission>> {
        Ok(self
            .overrides
            .iter()
            .filter(|o| {
                o.organization_id == organization_id
                    && o.user_id == user_id
                    && codes.contains(&o.code)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct RecordingAudit {
    records: Mutex<Vec<CreateAccessAuditInput>>,
}

#[async_trait]
impl AuditRepository for RecordingAudit {
    async fn create(&self, input: &CreateAccessAuditInput) -> Result<()> {
        self.records.lock().unwrap().push(input.clone());
        Ok(())
    }

    async fn find(
        &self,
        _query: &AuditQuery,
    ) -> Result<Vec<herdgate_core::domain::AccessAuditRecord>> {
        Ok(vec![])
    }

    async fn count(&self, _query: &AuditQuery) -> Result<i64> {
        Ok(self.records.lock().unwrap().len() as i64)
    }
}

type TestEngine =
    AccessEngine<InMemoryMemberships, InMemoryResources, InMemoryModules, RecordingAudit>;

struct Fixture {
    engine: TestEngine,
    resources: Arc<InMemoryResources>,
    audit: Arc<RecordingAudit>,
}

/// Organization 3: vet (7), client (42), office staff (9), owner (11).
/// Billing is subscribed and live; the reports subscription has lapsed.
fn fixture() -> Fixture {
    let memberships = Arc::new(InMemoryMemberships {
        rows: vec![
            membership(3, 7, Role::Vet),
            membership(3, 42, Role::Client),
            membership(3, 9, Role::OfficeStaff),
            membership(3, 11, Role::Owner),
        ],
    });
    let resources = Arc::new(InMemoryResources {
        rows: vec![("animals", 10, 3), ("animals", 77, 4)],
        lookups: AtomicUsize::new(0),
    });
    let modules = Arc::new(InMemoryModules {
        catalog: vec![
            Module {
                id: 1,
                code: "billing".to_string(),
                name: "Billing".to_string(),
            },
            Module {
                id: 2,
                code: "reports".to_string(),
                name: "Reports".to_string(),
            },
        ],
        subscriptions: vec![
            OrganizationModule {
                organization_id: 3,
                module_id: 1,
                code: "billing".to_string(),
                active: true,
                subscription_end_date: None,
            },
            OrganizationModule {
                organization_id: 3,
                module_id: 2,
                code: "reports".to_string(),
                active: true,
                subscription_end_date: Some(Utc::now() - Duration::days(2)),
            },
        ],
        overrides: vec![],
    });
    let audit = Arc::new(RecordingAudit::default());

    Fixture {
        engine: AccessEngine::new(memberships, resources.clone(), modules, audit.clone()),
        resources,
        audit,
    }
}

fn membership(organization_id: i64, user_id: i64, role: Role) -> OrganizationMembership {
    OrganizationMembership {
        organization_id,
        user_id,
        role,
    }
}

fn actor(id: i64, organization_id: i64, role: Role) -> Actor {
    Actor {
        id,
        memberships: vec![membership(organization_id, id, role)],
    }
}

fn request(actor: Actor, organization_id: i64, resource_id: Option<i64>) -> AccessRequest {
    AccessRequest {
        actor,
        hints: OrgIdHints {
            path: Some(organization_id),
            ..Default::default()
        },
        resource_id,
        meta: RequestMeta {
            method: Method::GET,
            path: "/api/v1/test".to_string(),
        },
    }
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_vet_may_access_client_record() {
    let f = fixture();

    let context = f
        .engine
        .authorize(
            &request(actor(7, 3, Role::Vet), 3, Some(42)),
            &AccessPolicy {
                resource: Some(ResourceType::User),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(context.organization_id, 3);
    assert_eq!(context.role, Role::Vet);
}

#[tokio::test]
async fn test_vet_may_not_access_staff_record() {
    let f = fixture();

    let err = f
        .engine
        .authorize(
            &request(actor(7, 3, Role::Vet), 3, Some(9)),
            &AccessPolicy {
                resource: Some(ResourceType::User),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_owner_may_access_staff_record() {
    let f = fixture();

    let result = f
        .engine
        .authorize(
            &request(actor(11, 3, Role::Owner), 3, Some(9)),
            &AccessPolicy {
                resource: Some(ResourceType::User),
                ..Default::default()
            },
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_active_module_grants_and_exposes_entitlement() {
    let f = fixture();

    let context = f
        .engine
        .authorize(
            &request(actor(7, 3, Role::Vet), 3, None),
            &AccessPolicy {
                required_modules: codes(&["billing"]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(context.modules.len(), 1);
    assert_eq!(context.modules[0].code, "billing");

    let records = f.audit.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::AccessGranted);
    assert_eq!(records[0].module_id, Some(1));
}

#[tokio::test]
async fn test_expired_subscription_denies_with_missing_codes() {
    let f = fixture();

    let err = f
        .engine
        .authorize(
            &request(actor(7, 3, Role::Vet), 3, None),
            &AccessPolicy {
                required_modules: codes(&["reports"]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    match err {
        AppError::ModuleAccessDenied { missing } => {
            assert_eq!(missing, vec!["reports".to_string()])
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let records = f.audit.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::AccessDenied);
    assert_eq!(records[0].module_id, Some(2));
    assert_eq!(
        records[0].details["missingModules"],
        serde_json::json!(["reports"])
    );
}

#[tokio::test]
async fn test_non_member_is_denied_before_any_resource_lookup() {
    let f = fixture();

    let err = f
        .engine
        .authorize(
            &request(actor(7, 4, Role::Vet), 3, Some(10)),
            &AccessPolicy {
                resource: Some(ResourceType::Animal),
                required_modules: codes(&["billing"]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(f.resources.lookups.load(Ordering::SeqCst), 0);
    assert!(f.audit.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cross_organization_animal_reads_as_missing() {
    let f = fixture();

    // Animal 77 exists, but in organization 4.
    let err = f
        .engine
        .authorize(
            &request(actor(7, 3, Role::Vet), 3, Some(77)),
            &AccessPolicy {
                resource: Some(ResourceType::Animal),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_revoked_user_override_denies_despite_live_subscription() {
    let mut f = fixture();
    let modules = InMemoryModules {
        catalog: vec![Module {
            id: 1,
            code: "billing".to_string(),
            name: "Billing".to_string(),
        }],
        subscriptions: vec![OrganizationModule {
            organization_id: 3,
            module_id: 1,
            code: "billing".to_string(),
            active: true,
            subscription_end_date: None,
        }],
        overrides: vec![UserModulePermission {
            organization_id: 3,
            user_id: 7,
            module_id: 1,
            code: "billing".to_string(),
            can_access: false,
            permissions: HashMap::new(),
        }],
    };
    f.engine = AccessEngine::new(
        Arc::new(InMemoryMemberships { rows: vec![] }),
        f.resources.clone(),
        Arc::new(modules),
        f.audit.clone(),
    );

    let err = f
        .engine
        .authorize(
            &request(actor(7, 3, Role::Vet), 3, None),
            &AccessPolicy {
                required_modules: codes(&["billing"]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    match err {
        AppError::UserModuleAccessDenied { denied } => {
            assert_eq!(denied, vec!["billing".to_string()])
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let records = f.audit.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].details["deniedModules"],
        serde_json::json!(["billing"])
    );
}

#[tokio::test]
async fn test_feature_revocation_denies_one_key_only() {
    let mut f = fixture();
    let modules = InMemoryModules {
        catalog: vec![Module {
            id: 1,
            code: "billing".to_string(),
            name: "Billing".to_string(),
        }],
        subscriptions: vec![OrganizationModule {
            organization_id: 3,
            module_id: 1,
            code: "billing".to_string(),
            active: true,
            subscription_end_date: None,
        }],
        overrides: vec![UserModulePermission {
            organization_id: 3,
            user_id: 7,
            module_id: 1,
            code: "billing".to_string(),
            can_access: true,
            permissions: HashMap::from([("export".to_string(), false)]),
        }],
    };
    f.engine = AccessEngine::new(
        Arc::new(InMemoryMemberships { rows: vec![] }),
        f.resources.clone(),
        Arc::new(modules),
        f.audit.clone(),
    );

    let export_policy = AccessPolicy {
        required_feature: Some(FeatureRequirement {
            module: "billing".to_string(),
            feature: "export".to_string(),
        }),
        ..Default::default()
    };
    let err = f
        .engine
        .authorize(&request(actor(7, 3, Role::Vet), 3, None), &export_policy)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::FeatureAccessDenied { .. }));

    let print_policy = AccessPolicy {
        required_feature: Some(FeatureRequirement {
            module: "billing".to_string(),
            feature: "print".to_string(),
        }),
        ..Default::default()
    };
    assert!(f
        .engine
        .authorize(&request(actor(7, 3, Role::Vet), 3, None), &print_policy)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_role_allow_list_short_circuits_module_gate() {
    let f = fixture();

    let err = f
        .engine
        .authorize(
            &request(actor(42, 3, Role::Client), 3, None),
            &AccessPolicy {
                allowed_roles: Some(vec![Role::Owner, Role::Vet]),
                required_modules: codes(&["billing"]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    // The module gate never ran, so no audit record was written.
    assert!(f.audit.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_each_evaluation_writes_its_own_audit_record() {
    let f = fixture();
    let policy = AccessPolicy {
        required_modules: codes(&["billing"]),
        ..Default::default()
    };

    for _ in 0..2 {
        f.engine
            .authorize(&request(actor(7, 3, Role::Vet), 3, None), &policy)
            .await
            .unwrap();
    }

    let records = f.audit.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.action == AuditAction::AccessGranted));
}

#[tokio::test]
async fn test_default_membership_fallback_is_stamped_in_audit() {
    let f = fixture();

    // No organization id anywhere in the request; the actor's sole
    // membership is used and the fallback source lands in the audit trail.
    let req = AccessRequest {
        actor: actor(7, 3, Role::Vet),
        hints: OrgIdHints::default(),
        resource_id: None,
        meta: RequestMeta {
            method: Method::GET,
            path: "/api/v1/test".to_string(),
        },
    };

    let context = f
        .engine
        .authorize(
            &req,
            &AccessPolicy {
                required_modules: codes(&["billing"]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(context.organization_id, 3);

    let records = f.audit.records.lock().unwrap();
    assert_eq!(records[0].details["source"], "default_membership");
}

#[tokio::test]
async fn test_missing_organization_id_is_a_caller_error() {
    let f = fixture();

    let req = AccessRequest {
        actor: Actor {
            id: 7,
            memberships: vec![],
        },
        hints: OrgIdHints::default(),
        resource_id: None,
        meta: RequestMeta {
            method: Method::GET,
            path: "/api/v1/test".to_string(),
        },
    };

    let err = f
        .engine
        .authorize(&req, &AccessPolicy::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OrganizationRequired));
}
