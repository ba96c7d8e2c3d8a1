//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::domain::Role;
use crate::guard::{AccessEngine, AccessPolicy};
use crate::middleware::{enforce_access, AccessGuard};
use crate::repository::{
    audit::AuditRepositoryImpl, membership::MembershipRepositoryImpl,
    module::ModuleRepositoryImpl, resource::ResourceRepositoryImpl,
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// The production engine over the MySQL-backed repositories.
pub type Engine = AccessEngine<
    MembershipRepositoryImpl,
    ResourceRepositoryImpl,
    ModuleRepositoryImpl,
    AuditRepositoryImpl,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub engine: Arc<Engine>,
    pub audit_repo: Arc<AuditRepositoryImpl>,
}

/// Start the HTTP server
pub async fn run(config: Config) -> Result<()> {
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    info!("Connected to database");

    let membership_repo = Arc::new(MembershipRepositoryImpl::new(db_pool.clone()));
    let resource_repo = Arc::new(ResourceRepositoryImpl::new(db_pool.clone()));
    let module_repo = Arc::new(ModuleRepositoryImpl::new(db_pool.clone()));
    let audit_repo = Arc::new(AuditRepositoryImpl::new(db_pool.clone()));

    let engine = Arc::new(AccessEngine::new(
        membership_repo,
        resource_repo,
        module_repo,
        audit_repo.clone(),
    ));

    let body_inspect_limit = config.body_inspect_limit;
    let http_addr = config.http_addr();

    let state = AppState {
        config: Arc::new(config),
        db_pool,
        engine,
        audit_repo,
    };

    let app = build_router(state, body_inspect_limit);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server listening on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router
///
/// The audit trail listing is itself a guarded route: only organization
/// owners and superadmins may read it, and the organization id must come
/// from the `organizationId` query parameter.
pub fn build_router(state: AppState, body_inspect_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let audit_guard = AccessGuard::new(
        state.engine.clone(),
        AccessPolicy {
            allowed_roles: Some(vec![Role::Superadmin, Role::Owner]),
            ..Default::default()
        },
    )
    .with_body_inspect_limit(body_inspect_limit);

    let audit_routes = Router::new()
        .route("/api/v1/audit", get(api::audit::list))
        .layer(axum::middleware::from_fn_with_state(
            audit_guard,
            enforce_access,
        ));

    Router::new()
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        .merge(audit_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
