//! OAuth 2.0 Authorization Endpoint
//!
//! `GET /authorize` validates the request and returns what the consent screen
//! needs to show. `POST /authorize` carries the owner's decision and answers
//! with the redirect back to the client. Errors about the client or its
//! redirect URI are rendered here and never redirected.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use grant_engine::{AuthorizationRequest, AuthorizeError, PendingAuthorization};
use serde::{Deserialize, Serialize};

use super::error::OAuthRejection;
use super::owner::AuthenticatedOwner;
use crate::AppState;

/// A scope together with its human readable description
#[derive(Debug, Serialize)]
pub struct ScopeDescription {
    pub name: String,
    pub description: String,
}

/// What the resource owner is asked to approve
#[derive(Debug, Serialize)]
pub struct ConsentSummary {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scopes: Vec<ScopeDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Consent form: the original request parameters plus the decision
#[derive(Debug, Deserialize)]
pub struct ConsentDecision {
    #[serde(flatten)]
    pub request: AuthorizationRequest,
    /// `allow` approves; anything else denies
    #[serde(default)]
    pub decision: String,
}

fn render_error(error: AuthorizeError) -> Response {
    match error.location() {
        Some(location) => {
            tracing::debug!("Redirecting authorization error {}", error.error().code());
            Redirect::to(&location).into_response()
        }
        None => OAuthRejection(error.error().clone()).into_response(),
    }
}

fn summary(state: &AppState, pending: &PendingAuthorization, response_type: &str) -> ConsentSummary {
    let configured = &state.engine.config().scopes;
    ConsentSummary {
        client_id: pending.application().client_id.clone(),
        client_name: pending.application().name.clone(),
        redirect_uri: pending.redirect_uri().to_string(),
        response_type: response_type.to_string(),
        scopes: pending
            .scopes()
            .iter()
            .map(|name| ScopeDescription {
                name: name.to_string(),
                description: configured.get(name).cloned().unwrap_or_default(),
            })
            .collect(),
        state: pending.state().map(str::to_string),
    }
}

/// Handler for `GET /authorize` - returns the consent summary
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Query(params): Query<AuthorizationRequest>,
) -> Response {
    match state.engine.validate_authorization(&params).await {
        Ok(pending) => {
            tracing::debug!(
                "Consent requested from owner {} for client {}",
                owner.id,
                params.client_id
            );
            Json(summary(&state, &pending, &params.response_type)).into_response()
        }
        Err(error) => render_error(error),
    }
}

/// Handler for `POST /authorize` - applies the owner's decision
pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Form(form): Form<ConsentDecision>,
) -> Response {
    // Re-validate: the form round-trips through the user agent
    let pending = match state.engine.validate_authorization(&form.request).await {
        Ok(pending) => pending,
        Err(error) => return render_error(error),
    };

    if form.decision != "allow" {
        return render_error(state.engine.deny(pending));
    }

    match state.engine.approve(pending, &owner).await {
        Ok(response) => Redirect::to(&response.location()).into_response(),
        Err(error) => render_error(error),
    }
}
