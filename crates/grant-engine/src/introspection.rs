//! Token validation for resource servers and introspection (RFC 7662).

use serde::Serialize;

use crate::credentials::ClientCredentials;
use crate::error::OAuthError;
use crate::grant::GrantEngine;
use crate::secret::hash_token;
use crate::token::{TokenInfo, TokenRejection};

/// Scope that lets a client introspect tokens issued to other clients
pub const INTROSPECTION_SCOPE: &str = "introspection";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl From<TokenInfo> for Introspection {
    fn from(info: TokenInfo) -> Self {
        Self {
            active: true,
            scope: Some(info.scopes.to_string()),
            client_id: Some(info.client_id),
            exp: Some(info.expires_at.timestamp()),
            iat: Some(info.issued_at.timestamp()),
            sub: info.owner_id,
            token_type: Some(info.kind.as_str().to_string()),
        }
    }
}

impl GrantEngine {
    /// Check a bearer access token against the store and the clock.
    ///
    /// A store failure is reported as [`TokenRejection::ServerError`], never
    /// as an invalid token.
    pub async fn validate(&self, token: &str) -> Result<TokenInfo, TokenRejection> {
        let stored = match self.store().get_access_token(&hash_token(token)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(TokenRejection::Invalid),
            Err(e) => {
                tracing::error!("Token lookup failed during validation: {}", e);
                return Err(TokenRejection::ServerError);
            }
        };
        stored.check(self.now())
    }

    /// Describe an access or refresh token to an authenticated client.
    pub async fn introspect(
        &self,
        credentials: &ClientCredentials,
        token: &str,
    ) -> Result<Introspection, OAuthError> {
        let caller = self.authenticate_client(credentials).await?;
        let token_hash = hash_token(token);
        let now = self.now();

        let checked = match self.store().get_access_token(&token_hash).await? {
            Some(access) => access.check(now),
            None => match self.store().get_refresh_token(&token_hash).await? {
                Some(refresh) => refresh.check(now),
                None => Err(TokenRejection::Invalid),
            },
        };

        let info = match checked {
            Ok(info) => info,
            Err(rejection) => {
                tracing::debug!("Introspection by {}: {}", caller.client_id, rejection);
                return Ok(Introspection::inactive());
            }
        };

        let privileged = caller.allowed_scopes.contains(INTROSPECTION_SCOPE);
        if info.client_id != caller.client_id && !privileged {
            tracing::debug!(
                "Client {} may not introspect tokens of {}",
                caller.client_id,
                info.client_id
            );
            return Ok(Introspection::inactive());
        }

        Ok(info.into())
    }
}
