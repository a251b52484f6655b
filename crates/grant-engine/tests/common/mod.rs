//! Shared fixtures for grant-engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use grant_engine::secret::hash_secret;
use grant_engine::{
    AuthorizationRequest, AuthorizationResponse, AuthorizeError, ClientCredentials, ClientType,
    EngineConfig, GrantEngine, GrantType, ManualClock, NewApplication, OwnerRecord, Registration,
    ResourceOwner, ScopeSet, StaticKeySource, StaticOwnerDirectory, Storage, TokenRequest,
    TokenResponse,
};

pub const REDIRECT_URI: &str = "http://example.com/cb";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
pub const RSA_PRIVATE: &[u8] = include_bytes!("../fixtures/rsa_private.pem");
pub const RSA_PUBLIC: &[u8] = include_bytes!("../fixtures/rsa_public.pem");

/// Engine wired to an in-memory store, a manual clock and one owner.
pub struct Harness {
    pub engine: GrantEngine,
    pub clock: Arc<ManualClock>,
    pub owner: ResourceOwner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(EngineConfig::default(), StaticKeySource::new())
    }

    pub fn with(config: EngineConfig, keys: StaticKeySource) -> Self {
        let owner = ResourceOwner {
            id: "1".into(),
            username: "foo_user".into(),
            is_admin: false,
        };
        let owners = StaticOwnerDirectory::new([OwnerRecord {
            owner: owner.clone(),
            password_hash: Some(hash_secret("123456").unwrap()),
        }]);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = GrantEngine::with_clock(
            config,
            Arc::new(Storage::in_memory()),
            Arc::new(owners),
            Arc::new(keys),
            clock.clone(),
        );
        Self {
            engine,
            clock,
            owner,
        }
    }

    pub async fn register(&self, new: NewApplication) -> Registration {
        self.engine
            .registry()
            .create(&self.owner, new)
            .await
            .expect("registration failed")
    }

    /// Validate and approve in one go.
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizationResponse, AuthorizeError> {
        let pending = self.engine.validate_authorization(&request).await?;
        self.engine.approve(pending, &self.owner).await
    }

    /// Run the code flow up to the token response.
    pub async fn code_flow(
        &self,
        registration: &Registration,
        scope: &str,
    ) -> TokenResponse {
        let response = self
            .authorize(code_request(&registration.application.client_id, scope))
            .await
            .expect("authorization failed");
        let code = response.get("code").expect("no code").to_string();
        self.engine
            .token(&credentials(registration), &code_exchange(&code))
            .await
            .expect("code exchange failed")
    }
}

pub fn application(
    client_type: ClientType,
    grant_type: GrantType,
) -> NewApplication {
    NewApplication {
        client_id: None,
        name: "test app".into(),
        client_secret: None,
        client_type,
        authorization_grant_type: grant_type,
        redirect_uris: vec![REDIRECT_URI.into()],
        post_logout_redirect_uris: vec![],
        algorithm: Default::default(),
        allowed_scopes: ScopeSet::new(),
        metadata: Default::default(),
    }
}

pub fn credentials(registration: &Registration) -> ClientCredentials {
    match &registration.client_secret {
        Some(secret) => ClientCredentials::basic(&registration.application.client_id, secret),
        None => ClientCredentials::public(&registration.application.client_id),
    }
}

pub fn code_request(client_id: &str, scope: &str) -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: "code".into(),
        client_id: client_id.into(),
        redirect_uri: Some(REDIRECT_URI.into()),
        scope: Some(scope.into()),
        state: Some("xyz".into()),
        ..Default::default()
    }
}

pub fn code_exchange(code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".into(),
        code: Some(code.into()),
        redirect_uri: Some(REDIRECT_URI.into()),
        ..Default::default()
    }
}

pub fn refresh_request(refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".into(),
        refresh_token: Some(refresh_token.into()),
        ..Default::default()
    }
}
