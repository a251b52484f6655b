//! `refresh_token` grant with optional rotation and replay detection.

use uuid::Uuid;

use super::{GrantEngine, TokenGrant, TokenRequest, TokenResponse};
use crate::application::Application;
use crate::error::OAuthError;
use crate::events::AuditEvent;
use crate::scope::{clip, ScopeSet};
use crate::secret::hash_token;
use crate::store::RefreshExchange;
use crate::token::{RefreshState, TokenBatch};

fn invalid_refresh() -> OAuthError {
    OAuthError::InvalidGrant("refresh token is invalid".to_string())
}

impl GrantEngine {
    pub(crate) async fn refresh(
        &self,
        application: &Application,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        if !application.authorization_grant_type.issues_refresh_tokens() {
            return Err(OAuthError::UnauthorizedClient(format!(
                "the {} grant does not use refresh tokens",
                application.authorization_grant_type
            )));
        }
        let presented = request
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".to_string()))?;
        let token_hash = hash_token(presented);

        let stored = self
            .store()
            .get_refresh_token(&token_hash)
            .await?
            .ok_or_else(invalid_refresh)?;

        if stored.client_id != application.client_id {
            tracing::warn!(
                "Client {} presented a refresh token issued to {}",
                application.client_id,
                stored.client_id
            );
            return Err(invalid_refresh());
        }

        match stored.state {
            RefreshState::Rotated => {
                return Err(self.reject_replayed_refresh(application, stored.grant_id).await);
            }
            RefreshState::Revoked => return Err(invalid_refresh()),
            RefreshState::Active => {}
        }
        if self.now() >= stored.expires_at {
            return Err(OAuthError::InvalidGrant("refresh token expired".to_string()));
        }

        // Narrowing is allowed, widening is not; an empty request keeps the grant
        let scopes = clip(&ScopeSet::from_optional(request.scope.as_deref()), &stored.scopes)?;

        let rotate = self.config().rotate_refresh_tokens;
        let mut access = self.minter.mint_access_token(
            application,
            stored.owner_id.as_deref(),
            &scopes,
            stored.grant_id,
            self.access_ttl(),
        );
        let refresh = if rotate {
            // The successor keeps the original grant so later refreshes can widen back
            Some(
                self.minter
                    .mint_refresh_token(&mut access.record, &stored.scopes, self.refresh_ttl()),
            )
        } else {
            access.record.refresh_token_hash = Some(stored.token_hash.clone());
            None
        };

        let refresh_token = refresh.as_ref().map(|r| r.value.clone());
        let batch = TokenBatch {
            code: None,
            access: Some(access.record),
            refresh: refresh.map(|r| r.record),
        };

        match self
            .store()
            .exchange_refresh_token(&token_hash, rotate, batch)
            .await?
        {
            RefreshExchange::Exchanged => {}
            RefreshExchange::Replayed { grant_id } => {
                return Err(self.reject_replayed_refresh(application, grant_id).await);
            }
            RefreshExchange::Inactive => return Err(invalid_refresh()),
        }

        self.emit_issued(
            application,
            stored.owner_id.as_deref(),
            TokenGrant::RefreshToken.as_str(),
            stored.grant_id,
            rotate,
        );
        // Without rotation the client keeps using the token it presented
        let refresh_token = refresh_token.or_else(|| Some(presented.to_string()));
        Ok(self.token_response(access.value, refresh_token, &scopes, None))
    }

    async fn reject_replayed_refresh(&self, application: &Application, grant_id: Uuid) -> OAuthError {
        if self.config().refresh_reuse_revokes_family {
            let revoked = match self.store().revoke_grant(grant_id).await {
                Ok(n) => n,
                Err(e) => return e.into(),
            };
            tracing::warn!(
                "Rotated refresh token replayed by client {}; revoked {} records of grant {}",
                application.client_id,
                revoked,
                grant_id
            );
            self.events().emit(AuditEvent::RefreshReuseDetected {
                client_id: application.client_id.clone(),
                grant_id,
                revoked,
            });
        } else {
            tracing::warn!(
                "Rotated refresh token replayed by client {} (grant {})",
                application.client_id,
                grant_id
            );
        }
        OAuthError::InvalidGrant("refresh token has already been used".to_string())
    }
}
