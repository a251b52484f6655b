//! Token validation endpoint for forward_auth
//!
//! Called by the fronting proxy before it forwards a request to a protected
//! resource. Answers 200 with the token's client, owner and scopes in
//! response headers when the bearer access token is valid, 401 otherwise.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use grant_engine::TokenRejection;

use crate::AppState;

const CLIENT_HEADER: HeaderName = HeaderName::from_static("x-auth-client-id");
const OWNER_HEADER: HeaderName = HeaderName::from_static("x-auth-owner-id");
const SCOPE_HEADER: HeaderName = HeaderName::from_static("x-auth-scope");

fn unauthorized(challenge: &'static str, message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        message,
    )
        .into_response()
}

/// Validation endpoint for forward_auth
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    // Extract Authorization header
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        tracing::debug!("No Authorization header present");
        return unauthorized("Bearer", "Missing Authorization header");
    };

    let Ok(auth_str) = auth_header.to_str() else {
        tracing::debug!("Invalid Authorization header encoding");
        return unauthorized("Bearer", "Invalid Authorization header");
    };

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        tracing::debug!("Authorization header does not start with 'Bearer '");
        return unauthorized("Bearer", "Invalid Authorization header format");
    };

    match state.engine.validate(token.trim()).await {
        Ok(info) => {
            tracing::debug!(
                "Request authenticated via access token for client {}",
                info.client_id
            );
            let mut response = StatusCode::OK.into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&info.client_id) {
                headers.insert(CLIENT_HEADER, value);
            }
            if let Some(Ok(value)) = info.owner_id.as_deref().map(HeaderValue::from_str) {
                headers.insert(OWNER_HEADER, value);
            }
            if let Ok(value) = HeaderValue::from_str(&info.scopes.to_string()) {
                headers.insert(SCOPE_HEADER, value);
            }
            response
        }
        Err(rejection) => rejected(rejection),
    }
}

fn rejected(rejection: TokenRejection) -> Response {
    match rejection {
        TokenRejection::ServerError => {
            tracing::error!("Bearer token could not be checked: {}", rejection);
            (StatusCode::INTERNAL_SERVER_ERROR, "Token validation unavailable").into_response()
        }
        _ => {
            tracing::debug!("Rejected bearer token: {}", rejection);
            unauthorized(
                "Bearer error=\"invalid_token\"",
                "Invalid, expired or revoked token",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_outage_is_a_server_error() {
        let response = rejected(TokenRejection::ServerError);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn test_bad_tokens_get_bearer_challenge() {
        for rejection in [
            TokenRejection::Invalid,
            TokenRejection::Expired,
            TokenRejection::Revoked,
        ] {
            let response = rejected(rejection);
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers()[header::WWW_AUTHENTICATE],
                "Bearer error=\"invalid_token\""
            );
        }
    }
}
