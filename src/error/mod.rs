//! Unified error handling for Herdgate Core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
///
/// Denial variants carry machine-readable codes in the response body so that
/// API clients can branch on them without parsing messages. Cross-organization
/// resource references surface as `NotFound` on purpose: a 403 would reveal
/// that the resource exists.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Organization id is required")]
    OrganizationRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Organization is missing required modules: {}", missing.join(", "))]
    ModuleAccessDenied { missing: Vec<String> },

    #[error("User access to modules has been revoked: {}", denied.join(", "))]
    UserModuleAccessDenied { denied: Vec<String> },

    #[error("Feature '{feature}' of module '{module}' is not available for this user")]
    FeatureAccessDenied { module: String, feature: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
            AppError::OrganizationRequired => (
                StatusCode::BAD_REQUEST,
                "ORGANIZATION_REQUIRED",
                "An organization id must be supplied via path, query or body".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::ModuleAccessDenied { missing } => (
                StatusCode::FORBIDDEN,
                "MODULE_ACCESS_DENIED",
                self.to_string(),
                Some(serde_json::json!({ "missingModules": missing })),
            ),
            AppError::UserModuleAccessDenied { denied } => (
                StatusCode::FORBIDDEN,
                "USER_MODULE_ACCESS_DENIED",
                self.to_string(),
                Some(serde_json::json!({ "deniedModules": denied })),
            ),
            AppError::FeatureAccessDenied { module, feature } => (
                StatusCode::FORBIDDEN,
                "FEATURE_ACCESS_DENIED",
                self.to_string(),
                Some(serde_json::json!({ "module": module, "feature": feature })),
            ),
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "An internal configuration error occurred".to_string(),
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}
