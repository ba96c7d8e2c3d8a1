//! Access guard middleware
//!
//! Wires the guard pipeline into axum routes. The middleware collects the
//! organization-id hints (path parameter, query parameter, JSON body field),
//! runs [`AccessEngine::authorize`] against the route's [`AccessPolicy`],
//! and on success attaches the resolved [`AccessContext`] to the request
//! extensions for the business handler. Denials render through
//! [`AppError::into_response`].

use axum::{
    body::Body,
    extract::{RawPathParams, State},
    http::{header::CONTENT_TYPE, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    RequestExt,
};
use std::sync::Arc;

use crate::domain::Actor;
use crate::error::{AppError, Result};
use crate::guard::{AccessEngine, AccessPolicy, AccessRequest, OrgIdHints, RequestMeta};
use crate::repository::{
    AuditRepository, MembershipRepository, ModuleRepository, ResourceRepository,
};

/// Default cap on the JSON body size inspected for the organizationId field.
pub const DEFAULT_BODY_INSPECT_LIMIT: usize = 64 * 1024;

/// Per-route middleware state: the shared engine plus this route's policy.
pub struct AccessGuard<Me, Rr, Mo, Au>
where
    Me: MembershipRepository,
    Rr: ResourceRepository,
    Mo: ModuleRepository,
    Au: AuditRepository,
{
    engine: Arc<AccessEngine<Me, Rr, Mo, Au>>,
    policy: Arc<AccessPolicy>,
    body_inspect_limit: usize,
}

impl<Me, Rr, Mo, Au> AccessGuard<Me, Rr, Mo, Au>
where
    Me: MembershipRepository,
    Rr: ResourceRepository,
    Mo: ModuleRepository,
    Au: AuditRepository,
{
    pub fn new(engine: Arc<AccessEngine<Me, Rr, Mo, Au>>, policy: AccessPolicy) -> Self {
        Self {
            engine,
            policy: Arc::new(policy),
            body_inspect_limit: DEFAULT_BODY_INSPECT_LIMIT,
        }
    }

    pub fn with_body_inspect_limit(mut self, limit: usize) -> Self {
        self.body_inspect_limit = limit;
        self
    }
}

impl<Me, Rr, Mo, Au> Clone for AccessGuard<Me, Rr, Mo, Au>
where
    Me: MembershipRepository,
    Rr: ResourceRepository,
    Mo: ModuleRepository,
    Au: AuditRepository,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            policy: Arc::clone(&self.policy),
            body_inspect_limit: self.body_inspect_limit,
        }
    }
}

/// Guard middleware entry point, used with `axum::middleware::from_fn_with_state`.
pub async fn enforce_access<Me, Rr, Mo, Au>(
    State(guard): State<AccessGuard<Me, Rr, Mo, Au>>,
    request: Request<Body>,
    next: Next,
) -> Response
where
    Me: MembershipRepository + 'static,
    Rr: ResourceRepository + 'static,
    Mo: ModuleRepository + 'static,
    Au: AuditRepository + 'static,
{
    match run_guard(&guard, request).await {
        Ok(request) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

async fn run_guard<Me, Rr, Mo, Au>(
    guard: &AccessGuard<Me, Rr, Mo, Au>,
    mut request: Request<Body>,
) -> Result<Request<Body>>
where
    Me: MembershipRepository + 'static,
    Rr: ResourceRepository + 'static,
    Mo: ModuleRepository + 'static,
    Au: AuditRepository + 'static,
{
    let actor = request
        .extensions()
        .get::<Actor>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    let mut hints = OrgIdHints::default();
    let mut resource_id: Option<i64> = None;

    if let Ok(params) = request.extract_parts::<RawPathParams>().await {
        for (key, value) in &params {
            match key {
                "organization_id" => hints.path = Some(parse_path_param(key, value)?),
                "id" => resource_id = Some(parse_path_param(key, value)?),
                _ => {}
            }
        }
    }

    if let Some(query) = request.uri().query() {
        hints.query = query_org_id(query);
    }

    // Only buffer the body when no parameter supplied the organization id
    // and the payload is JSON.
    if hints.path.is_none() && hints.query.is_none() && is_json(&request) {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, guard.body_inspect_limit)
            .await
            .map_err(|_| {
                AppError::BadRequest("Request body too large to inspect".to_string())
            })?;

        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            hints.body = value.get("organizationId").and_then(|v| v.as_i64());
        }

        request = Request::from_parts(parts, Body::from(bytes));
    }

    let meta = RequestMeta {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
    };

    let access_request = AccessRequest {
        actor,
        hints,
        resource_id,
        meta,
    };

    let context = guard
        .engine
        .authorize(&access_request, &guard.policy)
        .await?;
    request.extensions_mut().insert(context);

    Ok(request)
}

fn is_json(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

/// A present path parameter that fails to parse is a malformed address, not
/// an absent one: falling back to `None` would skip the check the policy
/// asked for.
fn parse_path_param(name: &str, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} path parameter", name)))
}

#[derive(serde::Deserialize)]
struct OrgQuery {
    #[serde(rename = "organizationId")]
    organization_id: Option<i64>,
}

fn query_org_id(query: &str) -> Option<i64> {
    serde_urlencoded::from_str::<OrgQuery>(query)
        .ok()
        .and_then(|q| q.organization_id)
}
