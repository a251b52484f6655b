//! Shared state and routing

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use grant_engine::GrantEngine;
use tower_http::trace::TraceLayer;

use crate::{oauth, validation};

/// Shared application state
pub struct AppState {
    pub engine: GrantEngine,
    /// Lower-cased name of the trusted owner header
    pub owner_header: String,
    pub public_url: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // OAuth metadata (RFC 8414) and OpenID discovery
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth::metadata::handler),
        )
        .route(
            "/.well-known/openid-configuration",
            get(oauth::metadata::openid_handler),
        )
        // Client registration and management
        .route("/register", post(oauth::applications::register))
        .route("/applications", get(oauth::applications::list))
        .route(
            "/applications/{client_id}",
            get(oauth::applications::detail)
                .patch(oauth::applications::update)
                .delete(oauth::applications::delete),
        )
        // Authorization endpoint
        .route(
            "/authorize",
            get(oauth::authorize::get_handler).post(oauth::authorize::post_handler),
        )
        // Token endpoint
        .route("/token", post(oauth::token::handler))
        // Revocation (RFC 7009) and introspection (RFC 7662)
        .route("/revoke", post(oauth::revoke::handler))
        .route("/introspect", post(oauth::introspect::handler))
        // Validation endpoint for forward_auth
        .route("/validate", get(validation::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
