//! RFC 7009 Token Revocation endpoint

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Form};
use serde::Deserialize;

use super::client_auth::{client_credentials, ClientForm};
use super::error::OAuthRejection;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RevocationForm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    #[serde(flatten)]
    pub client: ClientForm,
}

/// Handler for `POST /revoke`
///
/// Answers 200 for every authenticated client, whether or not the token existed.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<RevocationForm>,
) -> Result<StatusCode, OAuthRejection> {
    let credentials = client_credentials(&headers, &form.client)?;
    state
        .engine
        .revoke(&credentials, &form.token, form.token_type_hint.as_deref())
        .await?;
    Ok(StatusCode::OK)
}
