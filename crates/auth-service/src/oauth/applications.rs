//! Client registration and owner-scoped application management
//!
//! `POST /register` creates an application for the calling owner and returns
//! its secret once. `/applications` lists, shows, updates and deletes the
//! caller's applications; other owners' applications answer 404.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use grant_engine::{
    Algorithm, Application, ApplicationPatch, ClientType, GrantType, NewApplication,
    Registration, ScopeSet,
};
use serde::Serialize;

use super::error::RegistryRejection;
use super::owner::AuthenticatedOwner;
use crate::AppState;

/// Application as shown to its owner; the secret hash never leaves the server.
#[derive(Debug, Serialize)]
pub struct ApplicationView {
    pub client_id: String,
    /// Only present right after it was generated or changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub name: String,
    pub client_type: ClientType,
    pub authorization_grant_type: GrantType,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub algorithm: Algorithm,
    pub allowed_scopes: ScopeSet,
    pub metadata: BTreeMap<String, String>,
    /// Time at which the client was registered
    pub client_id_issued_at: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Application> for ApplicationView {
    fn from(app: Application) -> Self {
        Self {
            client_id: app.client_id,
            client_secret: None,
            name: app.name,
            client_type: app.client_type,
            authorization_grant_type: app.authorization_grant_type,
            redirect_uris: app.redirect_uris,
            post_logout_redirect_uris: app.post_logout_redirect_uris,
            algorithm: app.algorithm,
            allowed_scopes: app.allowed_scopes,
            metadata: app.metadata,
            client_id_issued_at: app.created_at.timestamp(),
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

impl From<Registration> for ApplicationView {
    fn from(registration: Registration) -> Self {
        let mut view = ApplicationView::from(registration.application);
        view.client_secret = registration.client_secret;
        view
    }
}

/// Handler for `POST /register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Json(request): Json<NewApplication>,
) -> Result<Response, RegistryRejection> {
    tracing::info!(
        "Client registration request: name={:?}, redirect_uris={:?}",
        request.name,
        request.redirect_uris
    );

    let registration = state.engine.registry().create(&owner, request).await?;
    Ok((StatusCode::CREATED, Json(ApplicationView::from(registration))).into_response())
}

/// Handler for `GET /applications`
pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
) -> Result<Json<Vec<ApplicationView>>, RegistryRejection> {
    let applications = state.engine.registry().list(&owner).await?;
    Ok(Json(applications.into_iter().map(ApplicationView::from).collect()))
}

/// Handler for `GET /applications/{client_id}`
pub async fn detail(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Path(client_id): Path<String>,
) -> Result<Json<ApplicationView>, RegistryRejection> {
    let application = state.engine.registry().get(&owner, &client_id).await?;
    Ok(Json(application.into()))
}

/// Handler for `PATCH /applications/{client_id}`
pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Path(client_id): Path<String>,
    Json(patch): Json<ApplicationPatch>,
) -> Result<Json<ApplicationView>, RegistryRejection> {
    let registration = state
        .engine
        .registry()
        .update(&owner, &client_id, patch)
        .await?;
    Ok(Json(registration.into()))
}

/// Handler for `DELETE /applications/{client_id}`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Path(client_id): Path<String>,
) -> Result<StatusCode, RegistryRejection> {
    state.engine.registry().delete(&owner, &client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
