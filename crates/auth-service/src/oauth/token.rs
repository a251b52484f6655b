//! OAuth 2.0 Token Endpoint
//!
//! Authenticates the client, then hands the request to the grant engine:
//! `authorization_code`, `refresh_token`, `password` and `client_credentials`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Form, Json,
};
use grant_engine::TokenRequest;
use serde::Deserialize;

use super::client_auth::{client_credentials, ClientForm};
use super::error::OAuthRejection;
use crate::AppState;

/// Token request (form-encoded)
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    #[serde(flatten)]
    pub request: TokenRequest,
    #[serde(flatten)]
    pub client: ClientForm,
}

/// Handler for `POST /token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Response, OAuthRejection> {
    let credentials = client_credentials(&headers, &form.client)?;
    let tokens = state.engine.token(&credentials, &form.request).await?;

    let mut response = Json(tokens).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}
