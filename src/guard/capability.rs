//! Role capability matrix for relationship resources
//!
//! Applies only to user/client targets; owned resources are scoped purely by
//! organization membership. Rules are evaluated in precedence order and the
//! matrix fails closed: a role matched by no rule is denied.

use crate::domain::Role;
use crate::guard::membership::ResolvedMembership;

/// Whether the caller may access the target user record.
///
/// Precedence:
/// 1. superadmin: any target
/// 2. owner: any target in the same organization
/// 3. client / farmer: self only
/// 4. employee class: client or farmer targets only (no staff-on-staff reads)
pub fn member_access_allowed(
    caller: &ResolvedMembership,
    target_user_id: i64,
    target_role: Role,
) -> bool {
    match caller.role {
        Role::Superadmin => true,
        Role::Owner => true,
        Role::Client | Role::Farmer => target_user_id == caller.actor_id,
        role if role.is_employee_class() => {
            matches!(target_role, Role::Client | Role::Farmer)
        }
        _ => false,
    }
}
