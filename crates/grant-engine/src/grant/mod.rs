//! Grant engine: one state machine per grant type.
//!
//! Authorization-code flow:
//! `Requested -> Authorized -> CodeIssued -> Exchanged -> TokenIssued`, with
//! `Denied`, `Expired` and `Revoked` as failure states. `Requested` and
//! `Authorized` live in memory as [`PendingAuthorization`]; the code's
//! persisted [`CodeState`](crate::token::CodeState) plus its expiry carry the
//! rest. Every flow validates all input before touching the store and then
//! commits with a single store call.

mod authorize;
mod client_credentials;
mod code;
mod password;
mod refresh;

pub use authorize::{
    AuthorizationRequest, AuthorizationResponse, AuthorizeError, PendingAuthorization,
    ResponseMode, ResponseType,
};

use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{Algorithm, Application, GrantType};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, MAX_LIFETIME_SECS};
use crate::credentials::{verify_client, ClientCredentials};
use crate::error::{OAuthError, RegistryError, StoreError};
use crate::events::{AuditEvent, EventBus};
use crate::id_token::{IdTokenSigner, KeySource};
use crate::owner::{OwnerDirectory, ResourceOwner};
use crate::registry::Registry;
use crate::scope::ScopeSet;
use crate::store::Store;
use crate::token::{AccessToken, Minted, RefreshToken, TokenBatch, TokenMinter};

/// Token endpoint request body (client credentials are passed separately).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Successful token response
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Grant types accepted at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
}

impl TokenGrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode => "authorization_code",
            TokenGrant::ClientCredentials => "client_credentials",
            TokenGrant::Password => "password",
            TokenGrant::RefreshToken => "refresh_token",
        }
    }
}

impl FromStr for TokenGrant {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(TokenGrant::AuthorizationCode),
            "client_credentials" => Ok(TokenGrant::ClientCredentials),
            "password" => Ok(TokenGrant::Password),
            "refresh_token" => Ok(TokenGrant::RefreshToken),
            "" => Err(OAuthError::InvalidRequest("grant_type is required".to_string())),
            other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

/// Freshly minted access token, and refresh token when the grant has one.
pub(crate) struct IssuedPair {
    pub access: Minted<AccessToken>,
    pub refresh: Option<Minted<RefreshToken>>,
}

impl IssuedPair {
    fn into_batch(self) -> (TokenBatch, String, Option<String>) {
        let refresh_value = self.refresh.as_ref().map(|r| r.value.clone());
        let batch = TokenBatch {
            code: None,
            access: Some(self.access.record),
            refresh: self.refresh.map(|r| r.record),
        };
        (batch, self.access.value, refresh_value)
    }
}

pub struct GrantEngine {
    config: Arc<EngineConfig>,
    store: Arc<dyn Store>,
    registry: Registry,
    owners: Arc<dyn OwnerDirectory>,
    minter: TokenMinter,
    signer: IdTokenSigner,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl GrantEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        owners: Arc<dyn OwnerDirectory>,
        keys: Arc<dyn KeySource>,
    ) -> Self {
        Self::with_clock(config, store, owners, keys, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        store: Arc<dyn Store>,
        owners: Arc<dyn OwnerDirectory>,
        keys: Arc<dyn KeySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let events = Arc::new(EventBus::new());
        let signer = IdTokenSigner::new(
            keys,
            clock.clone(),
            config.issuer.clone(),
            secs(config.id_token_lifetime_secs),
            config.allow_unsigned_id_tokens,
        );
        if config.allow_unsigned_id_tokens {
            tracing::warn!("Unsigned ID tokens are enabled; do not use this configuration in production");
        }
        if let Err(e) = config.validate() {
            tracing::warn!("{}; out-of-range lifetimes are clamped", e);
        }
        Self {
            registry: Registry::new(store.clone(), config.clone(), events.clone(), clock.clone()),
            minter: TokenMinter::new(clock.clone()),
            config,
            store,
            owners,
            signer,
            events,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Drop codes and tokens that expired by now.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let removed = self.store.purge_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!("Purged {} expired codes and tokens", removed);
        }
        Ok(removed)
    }

    /// Resolve a resource owner by id through the owner directory.
    pub async fn resolve_owner(&self, owner_id: &str) -> Result<Option<ResourceOwner>, OAuthError> {
        Ok(self.owners.find(owner_id).await?)
    }

    /// Authenticate a client at the token, revocation or introspection endpoint.
    pub async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<Application, OAuthError> {
        let application = match self.registry.lookup(&credentials.client_id).await {
            Ok(app) => app,
            Err(RegistryError::NotFound(_)) => {
                tracing::warn!("Authentication attempt for unknown client {}", credentials.client_id);
                return Err(OAuthError::InvalidClient);
            }
            Err(e) => return Err(e.into()),
        };
        verify_client(&application, credentials)?;
        Ok(application)
    }

    /// Token endpoint: authenticate the client, then run the grant's state machine.
    pub async fn token(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let grant: TokenGrant = request.grant_type.parse()?;
        let application = self.authenticate_client(credentials).await?;

        let response = match grant {
            TokenGrant::AuthorizationCode => {
                self.exchange_code(&application, credentials, request).await
            }
            TokenGrant::ClientCredentials => {
                self.client_credentials(&application, request).await
            }
            TokenGrant::Password => self.password(&application, request).await,
            TokenGrant::RefreshToken => self.refresh(&application, request).await,
        };

        if let Err(e) = &response {
            tracing::debug!(
                "{} grant for client {} failed: {}",
                grant.as_str(),
                application.client_id,
                e
            );
        }
        response
    }

    /// Scopes this application can be granted under current signing policy.
    ///
    /// `openid` is withheld from applications whose algorithm cannot be used.
    pub(crate) fn grantable_scopes(&self, application: &Application) -> ScopeSet {
        application
            .permitted_scopes(&self.config.scopes)
            .iter()
            .filter(|s| *s != "openid" || self.signer.supports(application.algorithm))
            .collect()
    }

    pub(crate) fn require_grant_type(
        application: &Application,
        allowed: &[GrantType],
    ) -> Result<(), OAuthError> {
        if allowed.contains(&application.authorization_grant_type) {
            Ok(())
        } else {
            Err(OAuthError::UnauthorizedClient(format!(
                "application is registered for the {} grant",
                application.authorization_grant_type
            )))
        }
    }

    pub(crate) fn access_ttl(&self) -> Duration {
        secs(self.config.access_token_lifetime_secs)
    }

    pub(crate) fn refresh_ttl(&self) -> Duration {
        secs(self.config.refresh_token_lifetime_secs)
    }

    pub(crate) fn code_ttl(&self) -> Duration {
        secs(self.config.authorization_code_lifetime_secs)
    }

    /// Mint an access token and, when asked, a refresh token bound to it.
    pub(crate) fn issue_pair(
        &self,
        application: &Application,
        owner_id: Option<&str>,
        scopes: &ScopeSet,
        grant_id: Uuid,
        with_refresh: bool,
    ) -> IssuedPair {
        let mut access = self.minter.mint_access_token(
            application,
            owner_id,
            scopes,
            grant_id,
            self.access_ttl(),
        );
        let refresh = with_refresh.then(|| {
            self.minter
                .mint_refresh_token(&mut access.record, scopes, self.refresh_ttl())
        });
        IssuedPair { access, refresh }
    }

    pub(crate) fn token_response(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        scopes: &ScopeSet,
        id_token: Option<String>,
    ) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_lifetime_secs,
            refresh_token,
            scope: scopes.to_string(),
            id_token,
        }
    }

    pub(crate) fn emit_issued(
        &self,
        application: &Application,
        owner: Option<&str>,
        grant_type: &str,
        grant_id: Uuid,
        refresh: bool,
    ) {
        tracing::info!(
            "Issued access token for client {} via {} (grant {})",
            application.client_id,
            grant_type,
            grant_id
        );
        self.events.emit(AuditEvent::TokensIssued {
            client_id: application.client_id.clone(),
            owner: owner.map(str::to_string),
            grant_type: grant_type.to_string(),
            grant_id,
            refresh,
        });
    }

    pub(crate) fn signer(&self) -> &IdTokenSigner {
        &self.signer
    }

    pub(crate) fn uses_secret_for_id_tokens(application: &Application) -> bool {
        application.algorithm == Algorithm::Hs256 && application.is_confidential()
    }
}

/// Lifetimes beyond [`MAX_LIFETIME_SECS`] are clamped so timestamp math cannot overflow.
fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_LIFETIME_SECS) as i64)
}
