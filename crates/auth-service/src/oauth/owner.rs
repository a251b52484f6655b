//! Resource owner identity from the fronting proxy
//!
//! Login and sessions live in front of this service; the proxy forwards the
//! authenticated owner id in a trusted header (`owner_header` in config).

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use grant_engine::ResourceOwner;

use super::error::{ErrorBody, OAuthRejection};
use crate::AppState;

/// The authenticated resource owner making this request
pub struct AuthenticatedOwner(pub ResourceOwner);

impl FromRequestParts<Arc<AppState>> for AuthenticatedOwner {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(owner_id) = parts
            .headers
            .get(state.owner_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            tracing::debug!("Request without {} header", state.owner_header);
            return Err(unauthenticated());
        };

        match state.engine.resolve_owner(owner_id).await {
            Ok(Some(owner)) => Ok(AuthenticatedOwner(owner)),
            Ok(None) => {
                tracing::warn!("Unknown resource owner {} in {} header", owner_id, state.owner_header);
                Err(unauthenticated())
            }
            Err(e) => Err(OAuthRejection(e).into_response()),
        }
    }
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "login_required".to_string(),
            error_description: Some("resource owner is not authenticated".to_string()),
        }),
    )
        .into_response()
}
