//! `authorization_code` grant: exchanging a code at the token endpoint.

use super::{GrantEngine, TokenGrant, TokenRequest, TokenResponse};
use crate::application::{Application, GrantType};
use crate::credentials::{validate_pkce, ClientCredentials};
use crate::error::OAuthError;
use crate::events::AuditEvent;
use crate::id_token::IdTokenRequest;
use crate::secret::hash_token;
use crate::store::Redemption;
use crate::token::{AuthorizationCode, CodeState};

fn invalid_code() -> OAuthError {
    OAuthError::InvalidGrant("authorization code is invalid".to_string())
}

impl GrantEngine {
    pub(crate) async fn exchange_code(
        &self,
        application: &Application,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        Self::require_grant_type(
            application,
            &[GrantType::AuthorizationCode, GrantType::OpenIdHybrid],
        )?;
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
        let code_hash = hash_token(code);

        let stored = self
            .store()
            .get_code(&code_hash)
            .await?
            .ok_or_else(invalid_code)?;

        // A code presented by another client says nothing about its own lineage
        if stored.client_id != application.client_id {
            tracing::warn!(
                "Client {} presented a code issued to {}",
                application.client_id,
                stored.client_id
            );
            return Err(invalid_code());
        }

        if stored.state != CodeState::Issued {
            return Err(self.reject_reused_code(&stored).await);
        }

        if stored.is_expired(self.now()) {
            self.store().revoke_grant(stored.grant_id).await?;
            return Err(OAuthError::InvalidGrant("authorization code expired".to_string()));
        }

        match request.redirect_uri.as_deref() {
            Some(uri) if uri != stored.redirect_uri => {
                return Err(OAuthError::InvalidGrant(
                    "redirect_uri does not match the authorization request".to_string(),
                ));
            }
            None if stored.redirect_uri_explicit => {
                return Err(OAuthError::InvalidRequest(
                    "redirect_uri is required".to_string(),
                ));
            }
            _ => {}
        }

        match (&stored.code_challenge, request.code_verifier.as_deref()) {
            (Some(challenge), Some(verifier)) => validate_pkce(challenge, verifier)?,
            (Some(_), None) => {
                return Err(OAuthError::InvalidGrant("code_verifier is required".to_string()));
            }
            (None, Some(_)) => {
                return Err(OAuthError::InvalidRequest(
                    "code_verifier sent for a code issued without a challenge".to_string(),
                ));
            }
            (None, None) => {}
        }

        let with_refresh = application.authorization_grant_type.issues_refresh_tokens();
        let pair = self.issue_pair(
            application,
            Some(&stored.owner_id),
            &stored.scopes,
            stored.grant_id,
            with_refresh,
        );

        let id_token = if stored.scopes.contains("openid") {
            let verified_secret = Self::uses_secret_for_id_tokens(application)
                .then(|| credentials.secret.as_deref())
                .flatten();
            Some(
                self.signer()
                    .mint_id_token(IdTokenRequest {
                        application,
                        owner_id: &stored.owner_id,
                        nonce: stored.nonce.as_deref(),
                        auth_time: stored.auth_time,
                        access_token: Some(&pair.access.value),
                        code: None,
                        verified_secret,
                    })
                    .await?,
            )
        } else {
            None
        };

        let (batch, access_token, refresh_token) = pair.into_batch();
        match self.store().redeem_code(&code_hash, batch).await? {
            Redemption::Redeemed => {}
            Redemption::AlreadyConsumed { .. } => {
                return Err(self.reject_reused_code(&stored).await);
            }
            Redemption::NotFound => return Err(invalid_code()),
        }

        self.emit_issued(
            application,
            Some(&stored.owner_id),
            TokenGrant::AuthorizationCode.as_str(),
            stored.grant_id,
            refresh_token.is_some(),
        );
        Ok(self.token_response(access_token, refresh_token, &stored.scopes, id_token))
    }

    /// A consumed code came back: revoke everything its grant produced.
    async fn reject_reused_code(&self, code: &AuthorizationCode) -> OAuthError {
        let revoked = match self.store().revoke_grant(code.grant_id).await {
            Ok(n) => n,
            Err(e) => return e.into(),
        };
        tracing::warn!(
            "Authorization code reuse for client {}; revoked {} records of grant {}",
            code.client_id,
            revoked,
            code.grant_id
        );
        self.events().emit(AuditEvent::CodeReuseDetected {
            client_id: code.client_id.clone(),
            grant_id: code.grant_id,
            revoked,
        });
        OAuthError::InvalidGrant("authorization code has already been used".to_string())
    }
}
