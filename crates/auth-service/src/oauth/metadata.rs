//! RFC 8414: OAuth 2.0 Authorization Server Metadata
//!
//! Provides `/.well-known/oauth-authorization-server` and the OpenID Connect
//! discovery document that clients use to find endpoints and capabilities.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// OAuth 2.0 Authorization Server Metadata (RFC 8414)
#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    /// The authorization server's issuer identifier (URL)
    pub issuer: String,

    /// URL of the authorization endpoint
    pub authorization_endpoint: String,

    /// URL of the token endpoint
    pub token_endpoint: String,

    /// URL of the client registration endpoint
    pub registration_endpoint: String,

    /// URL of the revocation endpoint (RFC 7009)
    pub revocation_endpoint: String,

    /// URL of the introspection endpoint (RFC 7662)
    pub introspection_endpoint: String,

    /// Scopes clients may request
    pub scopes_supported: Vec<String>,

    /// JSON array of OAuth 2.0 response_type values supported
    pub response_types_supported: Vec<String>,

    /// JSON array of OAuth 2.0 grant_type values supported
    pub grant_types_supported: Vec<String>,

    /// JSON array of PKCE code challenge methods supported
    pub code_challenge_methods_supported: Vec<String>,

    /// JSON array of client authentication methods supported at token endpoint
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// ID token signing algorithms
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Present in the OpenID Connect discovery document only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_types_supported: Option<Vec<String>>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn build(state: &AppState) -> AuthorizationServerMetadata {
    let base_url = &state.public_url;
    let engine = state.engine.config();

    let mut signing_algs = strings(&["HS256", "RS256"]);
    if engine.allow_unsigned_id_tokens {
        signing_algs.push("none".to_string());
    }

    AuthorizationServerMetadata {
        issuer: engine.issuer.clone(),
        authorization_endpoint: format!("{}/authorize", base_url),
        token_endpoint: format!("{}/token", base_url),
        registration_endpoint: format!("{}/register", base_url),
        revocation_endpoint: format!("{}/revoke", base_url),
        introspection_endpoint: format!("{}/introspect", base_url),
        scopes_supported: engine.scopes.keys().cloned().collect(),
        response_types_supported: strings(&[
            "code",
            "token",
            "id_token",
            "id_token token",
            "code id_token",
            "code token",
            "code id_token token",
        ]),
        grant_types_supported: strings(&[
            "authorization_code",
            "implicit",
            "password",
            "client_credentials",
            "refresh_token",
        ]),
        code_challenge_methods_supported: strings(&["plain", "S256"]),
        token_endpoint_auth_methods_supported: strings(&[
            "client_secret_basic",
            "client_secret_post",
            "none",
        ]),
        id_token_signing_alg_values_supported: signing_algs,
        subject_types_supported: None,
    }
}

/// Handler for `GET /.well-known/oauth-authorization-server`
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<AuthorizationServerMetadata> {
    tracing::debug!("Serving authorization server metadata");
    Json(build(&state))
}

/// Handler for `GET /.well-known/openid-configuration`
pub async fn openid_handler(
    State(state): State<Arc<AppState>>,
) -> Json<AuthorizationServerMetadata> {
    let mut metadata = build(&state);
    metadata.subject_types_supported = Some(strings(&["public"]));
    tracing::debug!("Serving OpenID Connect discovery document");
    Json(metadata)
}
