//! Core domain model for the access control engine
//!
//! Roles and resource types are closed enumerations. Role strings are parsed
//! once at the ingestion boundary; everything downstream operates on enum
//! values. Every resource type maps to exactly one backing table and
//! organization-scoping column through a `const` descriptor, so an unmapped
//! type cannot exist at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

use crate::error::{AppError, Result};

/// The role an actor holds within one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Owner,
    Employee,
    OfficeStaff,
    Inseminator,
    VetTech,
    Vet,
    Client,
    Farmer,
    Member,
}

impl Role {
    /// Parse a stored role string. Case-insensitive; this is the single
    /// normalization boundary for role values.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Role::Superadmin),
            "owner" => Ok(Role::Owner),
            "employee" => Ok(Role::Employee),
            "office_staff" => Ok(Role::OfficeStaff),
            "inseminator" => Ok(Role::Inseminator),
            "vet_tech" => Ok(Role::VetTech),
            "vet" => Ok(Role::Vet),
            "client" => Ok(Role::Client),
            "farmer" => Ok(Role::Farmer),
            "member" => Ok(Role::Member),
            other => Err(AppError::Configuration(format!(
                "Unknown role value in membership data: '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Owner => "owner",
            Role::Employee => "employee",
            Role::OfficeStaff => "office_staff",
            Role::Inseminator => "inseminator",
            Role::VetTech => "vet_tech",
            Role::Vet => "vet",
            Role::Client => "client",
            Role::Farmer => "farmer",
            Role::Member => "member",
        }
    }

    /// Staff roles that act on behalf of the organization.
    pub fn is_employee_class(&self) -> bool {
        matches!(
            self,
            Role::Employee | Role::OfficeStaff | Role::Inseminator | Role::VetTech | Role::Vet
        )
    }
}

/// One actor's standing within one organization.
///
/// Invariant: an actor holds at most one role per organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub organization_id: i64,
    pub user_id: i64,
    pub role: Role,
}

/// The authenticated actor attached to the request by the authentication
/// collaborator before this engine runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub memberships: Vec<OrganizationMembership>,
}

impl Actor {
    /// Find this actor's membership in the given organization, if any.
    pub fn membership_in(&self, organization_id: i64) -> Option<&OrganizationMembership> {
        self.memberships
            .iter()
            .find(|m| m.organization_id == organization_id)
    }
}

/// Ownership shape of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// The "resource" is itself an organization-membership row; ownership is
    /// the existence of a membership linking the target user to the org.
    Relationship,
    /// A row keyed by id carrying an organization-scoping column.
    Owned,
}

/// Static mapping from a resource type to its backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub collection: &'static str,
    pub id_column: &'static str,
    pub org_column: &'static str,
    pub kind: ResourceKind,
}

/// Closed enumeration of guarded resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Client,
    Animal,
    Visit,
    Insemination,
    Bull,
    Herd,
}

impl ResourceType {
    /// The table mapping for this resource type. Exhaustive by construction.
    pub const fn descriptor(&self) -> ResourceDescriptor {
        match self {
            ResourceType::User | ResourceType::Client => ResourceDescriptor {
                collection: "organization_users",
                id_column: "user_id",
                org_column: "organization_id",
                kind: ResourceKind::Relationship,
            },
            ResourceType::Animal => ResourceDescriptor {
                collection: "animals",
                id_column: "id",
                org_column: "organization_id",
                kind: ResourceKind::Owned,
            },
            ResourceType::Visit => ResourceDescriptor {
                collection: "visits",
                id_column: "id",
                org_column: "organization_id",
                kind: ResourceKind::Owned,
            },
            ResourceType::Insemination => ResourceDescriptor {
                collection: "inseminations",
                id_column: "id",
                org_column: "organization_id",
                kind: ResourceKind::Owned,
            },
            ResourceType::Bull => ResourceDescriptor {
                collection: "bulls",
                id_column: "id",
                org_column: "organization_id",
                kind: ResourceKind::Owned,
            },
            ResourceType::Herd => ResourceDescriptor {
                collection: "herds",
                id_column: "id",
                org_column: "organization_id",
                kind: ResourceKind::Owned,
            },
        }
    }

    pub const fn kind(&self) -> ResourceKind {
        self.descriptor().kind
    }

    /// Resolve a route configuration key to a resource type.
    ///
    /// An unknown key is a deployment defect in the route table, not a caller
    /// error, and surfaces as a 500-class configuration failure.
    pub fn from_route_key(key: &str) -> Result<Self> {
        match key {
            "user" => Ok(ResourceType::User),
            "client" => Ok(ResourceType::Client),
            "animal" => Ok(ResourceType::Animal),
            "visit" => Ok(ResourceType::Visit),
            "insemination" => Ok(ResourceType::Insemination),
            "bull" => Ok(ResourceType::Bull),
            "herd" => Ok(ResourceType::Herd),
            other => Err(AppError::Configuration(format!(
                "Unmapped resource type '{}' in route configuration",
                other
            ))),
        }
    }
}

/// A licensable feature bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// An organization's subscription to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrganizationModule {
    pub organization_id: i64,
    pub module_id: i64,
    pub code: String,
    pub active: bool,
    pub subscription_end_date: Option<DateTime<Utc>>,
}

impl OrganizationModule {
    /// A module is usable iff it is active and its subscription has not ended.
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self
                .subscription_end_date
                .map(|end| end > now)
                .unwrap_or(true)
    }
}

/// Per-user override on an organization module. Can only narrow access; an
/// absent record means "inherit the organization-level grant".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserModulePermission {
    pub organization_id: i64,
    pub user_id: i64,
    pub module_id: i64,
    pub code: String,
    pub can_access: bool,
    #[sqlx(json)]
    pub permissions: HashMap<String, bool>,
}

/// Outcome recorded for one module-gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccessGranted,
    AccessDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccessGranted => "access_granted",
            AuditAction::AccessDenied => "access_denied",
        }
    }
}

/// One immutable audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessAuditRecord {
    pub id: i64,
    pub organization_id: i64,
    pub actor_id: i64,
    pub module_id: Option<i64>,
    pub action: String,
    #[sqlx(json)]
    pub details: serde_json::Value,
    pub performed_by: i64,
    pub created_at: DateTime<Utc>,
}
