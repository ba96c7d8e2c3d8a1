//! Authenticated actor extraction
//!
//! Token verification happens upstream: the authentication collaborator
//! verifies credentials and inserts the [`Actor`] (id plus organization
//! memberships) into the request extensions before this engine runs. The
//! extractor here only surfaces that identity to guards and handlers, and
//! rejects with a generic 401 when it is absent.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::Actor;

/// Rejection for requests that reach the engine without an identity.
#[derive(Debug, Clone)]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "UNAUTHORIZED",
                "message": "Authentication required"
            })),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or(Unauthenticated)
    }
}
