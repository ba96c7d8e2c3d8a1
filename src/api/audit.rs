//! Access audit trail API handlers

use crate::api::PaginatedResponse;
use crate::domain::Role;
use crate::error::Result;
use crate::guard::AccessContext;
use crate::repository::audit::AuditQuery;
use crate::repository::AuditRepository;
use crate::server::AppState;
use axum::{
    extract::{Extension, Query, State},
    response::IntoResponse,
    Json,
};

/// List access audit records for the caller's organization.
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccessContext>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse> {
    let query = scope_to_caller(&ctx, query);

    let records = state.audit_repo.find(&query).await?;
    let total = state.audit_repo.count(&query).await?;

    let per_page = query.limit.unwrap_or(50).clamp(1, 100);
    let page = query.offset.unwrap_or(0) / per_page + 1;

    Ok(Json(PaginatedResponse::new(records, page, per_page, total)))
}

/// Pin the query to the caller's resolved organization. Whatever filter the
/// request carried is overwritten; only a superadmin may query across
/// organizations.
fn scope_to_caller(ctx: &AccessContext, mut query: AuditQuery) -> AuditQuery {
    if ctx.role != Role::Superadmin {
        query.organization_id = Some(ctx.organization_id);
    }
    query
}
