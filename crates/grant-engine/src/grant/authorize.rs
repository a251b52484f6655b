//! Authorization endpoint: request validation, owner decision, redirect.

use std::str::FromStr;

use serde::Deserialize;
use url::form_urlencoded;
use uuid::Uuid;

use super::GrantEngine;
use crate::application::{Application, GrantType};
use crate::credentials::{resolve_redirect_uri, PkceChallenge};
use crate::error::{OAuthError, RegistryError};
use crate::events::AuditEvent;
use crate::id_token::IdTokenRequest;
use crate::owner::ResourceOwner;
use crate::scope::{clip, ScopeSet};
use crate::token::{CodeGrant, TokenBatch};

/// Query parameters of an authorization request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// The set of artifacts a `response_type` asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseType {
    pub code: bool,
    pub token: bool,
    pub id_token: bool,
}

impl ResponseType {
    pub fn response_mode(&self) -> ResponseMode {
        if self.token || self.id_token {
            ResponseMode::Fragment
        } else {
            ResponseMode::Query
        }
    }

    /// Whether anything besides a code is returned from this endpoint
    pub fn is_front_channel(&self) -> bool {
        self.token || self.id_token
    }

    /// Which response types each application grant type may use.
    pub fn permitted_for(&self, grant_type: GrantType) -> bool {
        match grant_type {
            GrantType::AuthorizationCode => self.code && !self.is_front_channel(),
            GrantType::Implicit => !self.code && self.is_front_channel(),
            GrantType::OpenIdHybrid => self.code,
            GrantType::Password | GrantType::ClientCredentials => false,
        }
    }
}

impl FromStr for ResponseType {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parsed = ResponseType::default();
        for part in s.split_whitespace() {
            match part {
                "code" => parsed.code = true,
                "token" => parsed.token = true,
                "id_token" => parsed.id_token = true,
                _ => return Err(OAuthError::UnsupportedResponseType(s.to_string())),
            }
        }
        if parsed == ResponseType::default() {
            return Err(OAuthError::UnsupportedResponseType(s.to_string()));
        }
        Ok(parsed)
    }
}

/// Where response parameters travel on the redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
}

/// A validated request awaiting the resource owner's decision.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    application: Application,
    response_type: ResponseType,
    redirect_uri: String,
    redirect_uri_explicit: bool,
    scopes: ScopeSet,
    state: Option<String>,
    code_challenge: Option<PkceChallenge>,
    nonce: Option<String>,
}

impl PendingAuthorization {
    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    fn redirect_error(&self, error: OAuthError) -> AuthorizeError {
        AuthorizeError::Redirect {
            redirect_uri: self.redirect_uri.clone(),
            mode: self.response_type.response_mode(),
            error,
            state: self.state.clone(),
        }
    }
}

/// Successful redirect back to the client
#[derive(Debug, Clone)]
pub struct AuthorizationResponse {
    pub redirect_uri: String,
    pub mode: ResponseMode,
    pub params: Vec<(String, String)>,
}

impl AuthorizationResponse {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn location(&self) -> String {
        build_location(&self.redirect_uri, self.mode, &self.params)
    }
}

/// Authorization failure, split by whether the redirect URI can be trusted.
#[derive(Debug, Clone)]
pub enum AuthorizeError {
    /// Rendered to the user agent; never redirected.
    Direct(OAuthError),
    /// Reported to the client on its redirect URI.
    Redirect {
        redirect_uri: String,
        mode: ResponseMode,
        error: OAuthError,
        state: Option<String>,
    },
}

impl AuthorizeError {
    pub fn error(&self) -> &OAuthError {
        match self {
            AuthorizeError::Direct(error) => error,
            AuthorizeError::Redirect { error, .. } => error,
        }
    }

    /// Redirect target for errors reported to the client
    pub fn location(&self) -> Option<String> {
        match self {
            AuthorizeError::Direct(_) => None,
            AuthorizeError::Redirect {
                redirect_uri,
                mode,
                error,
                state,
            } => {
                let mut params = vec![("error".to_string(), error.code().to_string())];
                if let Some(description) = error.description() {
                    params.push(("error_description".to_string(), description));
                }
                if let Some(state) = state {
                    params.push(("state".to_string(), state.clone()));
                }
                Some(build_location(redirect_uri, *mode, &params))
            }
        }
    }
}

impl From<OAuthError> for AuthorizeError {
    fn from(error: OAuthError) -> Self {
        AuthorizeError::Direct(error)
    }
}

fn build_location(redirect_uri: &str, mode: ResponseMode, params: &[(String, String)]) -> String {
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();
    match mode {
        ResponseMode::Query => {
            let separator = if redirect_uri.contains('?') { '&' } else { '?' };
            format!("{}{}{}", redirect_uri, separator, encoded)
        }
        ResponseMode::Fragment => format!("{}#{}", redirect_uri, encoded),
    }
}

impl GrantEngine {
    /// Validate an authorization request up to the point where the resource
    /// owner must decide.
    ///
    /// Client and redirect URI problems are returned as `Direct`; once the
    /// redirect URI is trusted, everything else is a `Redirect`.
    pub async fn validate_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<PendingAuthorization, AuthorizeError> {
        if request.client_id.is_empty() {
            return Err(OAuthError::InvalidRequest("client_id is required".to_string()).into());
        }
        let application = match self.registry().lookup(&request.client_id).await {
            Ok(app) => app,
            Err(RegistryError::NotFound(_)) => {
                tracing::warn!("Authorization request for unknown client {}", request.client_id);
                return Err(OAuthError::InvalidClient.into());
            }
            Err(e) => return Err(OAuthError::from(e).into()),
        };

        let (redirect_uri, redirect_uri_explicit) =
            resolve_redirect_uri(&application, request.redirect_uri.as_deref())?;

        let parsed = request.response_type.parse::<ResponseType>();
        let mut pending = PendingAuthorization {
            application,
            response_type: parsed.clone().unwrap_or_default(),
            redirect_uri,
            redirect_uri_explicit,
            scopes: ScopeSet::new(),
            state: request.state.clone(),
            code_challenge: None,
            nonce: request.nonce.clone(),
        };

        let response_type = parsed.map_err(|e| pending.redirect_error(e))?;
        let app = &pending.application;

        if !response_type.permitted_for(app.authorization_grant_type) {
            return Err(pending.redirect_error(OAuthError::UnauthorizedClient(format!(
                "response_type {} is not allowed for the {} grant",
                request.response_type, app.authorization_grant_type
            ))));
        }

        if response_type.is_front_channel()
            && !app.is_confidential()
            && !self.config().allow_public_implicit
        {
            return Err(pending.redirect_error(OAuthError::UnauthorizedClient(
                "public clients may not receive tokens from the authorization endpoint"
                    .to_string(),
            )));
        }

        let requested = ScopeSet::from_optional(request.scope.as_deref());
        let scopes = clip(&requested, &self.grantable_scopes(app))
            .map_err(|e| pending.redirect_error(e))?;

        if response_type.id_token {
            if !scopes.contains("openid") {
                return Err(pending.redirect_error(OAuthError::InvalidRequest(
                    "id_token requires the openid scope".to_string(),
                )));
            }
            if request.nonce.as_deref().is_none_or(str::is_empty) {
                return Err(pending.redirect_error(OAuthError::InvalidRequest(
                    "nonce is required when an id_token is returned".to_string(),
                )));
            }
        }

        let code_challenge = PkceChallenge::from_request(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )
        .map_err(|e| pending.redirect_error(e))?;

        if response_type.code
            && code_challenge.is_none()
            && !app.is_confidential()
            && self.config().require_pkce_for_public
        {
            return Err(pending.redirect_error(OAuthError::InvalidRequest(
                "code_challenge is required for public clients".to_string(),
            )));
        }

        pending.response_type = response_type;
        pending.scopes = scopes;
        pending.code_challenge = code_challenge;
        Ok(pending)
    }

    /// The resource owner approved: issue whatever the response type asks for.
    pub async fn approve(
        &self,
        pending: PendingAuthorization,
        owner: &ResourceOwner,
    ) -> Result<AuthorizationResponse, AuthorizeError> {
        let app = &pending.application;
        let response_type = pending.response_type;
        let grant_id = Uuid::new_v4();

        let code = response_type.code.then(|| {
            self.minter.mint_code(
                app,
                CodeGrant {
                    owner_id: owner.id.clone(),
                    scopes: pending.scopes.clone(),
                    redirect_uri: pending.redirect_uri.clone(),
                    redirect_uri_explicit: pending.redirect_uri_explicit,
                    code_challenge: pending.code_challenge.clone(),
                    nonce: pending.nonce.clone(),
                    grant_id,
                },
                self.code_ttl(),
            )
        });

        let access = response_type.token.then(|| {
            self.minter.mint_access_token(
                app,
                Some(&owner.id),
                &pending.scopes,
                grant_id,
                self.access_ttl(),
            )
        });

        let id_token = if response_type.id_token {
            let minted = self
                .signer()
                .mint_id_token(IdTokenRequest {
                    application: app,
                    owner_id: &owner.id,
                    nonce: pending.nonce.as_deref(),
                    auth_time: self.now(),
                    access_token: access.as_ref().map(|a| a.value.as_str()),
                    code: code.as_ref().map(|c| c.value.as_str()),
                    verified_secret: None,
                })
                .await
                .map_err(|e| pending.redirect_error(e.into()))?;
            Some(minted)
        } else {
            None
        };

        let mut params = Vec::new();
        if let Some(code) = &code {
            params.push(("code".to_string(), code.value.clone()));
        }
        if let Some(access) = &access {
            params.push(("access_token".to_string(), access.value.clone()));
            params.push(("token_type".to_string(), "Bearer".to_string()));
            params.push((
                "expires_in".to_string(),
                self.config().access_token_lifetime_secs.to_string(),
            ));
            params.push(("scope".to_string(), pending.scopes.to_string()));
        }
        if let Some(id_token) = id_token {
            params.push(("id_token".to_string(), id_token));
        }
        if let Some(state) = &pending.state {
            params.push(("state".to_string(), state.clone()));
        }

        let issued_token = access.is_some();
        let batch = TokenBatch {
            code: code.map(|c| c.record),
            access: access.map(|a| a.record),
            refresh: None,
        };
        self.store()
            .commit(batch)
            .await
            .map_err(|e| pending.redirect_error(e.into()))?;

        if response_type.code {
            tracing::info!(
                "Issued authorization code for client {} to owner {}",
                app.client_id,
                owner.id
            );
            self.events().emit(AuditEvent::CodeIssued {
                client_id: app.client_id.clone(),
                owner: owner.id.clone(),
                grant_id,
            });
        }
        if issued_token {
            self.emit_issued(app, Some(&owner.id), "implicit", grant_id, false);
        }

        Ok(AuthorizationResponse {
            redirect_uri: pending.redirect_uri,
            mode: response_type.response_mode(),
            params,
        })
    }

    /// The resource owner refused.
    pub fn deny(&self, pending: PendingAuthorization) -> AuthorizeError {
        tracing::info!(
            "Resource owner denied authorization for client {}",
            pending.application.client_id
        );
        pending.redirect_error(OAuthError::AccessDenied)
    }
}
