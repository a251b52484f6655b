//! RFC 7662 Token Introspection endpoint

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Form, Json};
use grant_engine::Introspection;
use serde::Deserialize;

use super::client_auth::{client_credentials, ClientForm};
use super::error::OAuthRejection;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IntrospectionForm {
    #[serde(default)]
    pub token: String,
    /// Accepted and ignored; both token kinds are looked up
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
    #[serde(flatten)]
    pub client: ClientForm,
}

/// Handler for `POST /introspect`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<IntrospectionForm>,
) -> Result<Json<Introspection>, OAuthRejection> {
    let credentials = client_credentials(&headers, &form.client)?;
    let introspection = state.engine.introspect(&credentials, &form.token).await?;
    Ok(Json(introspection))
}
