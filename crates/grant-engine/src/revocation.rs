//! Token revocation (RFC 7009).

use crate::credentials::ClientCredentials;
use crate::error::OAuthError;
use crate::events::AuditEvent;
use crate::grant::GrantEngine;
use crate::secret::hash_token;
use crate::token::TokenKind;

impl GrantEngine {
    /// Revoke an access or refresh token held by the calling client.
    ///
    /// Unknown tokens and tokens issued to other clients succeed without
    /// effect. An unrecognised `token_type_hint` is ignored.
    pub async fn revoke(
        &self,
        credentials: &ClientCredentials,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> Result<(), OAuthError> {
        let application = self.authenticate_client(credentials).await?;
        if token.is_empty() {
            return Err(OAuthError::InvalidRequest("token is required".to_string()));
        }
        let token_hash = hash_token(token);

        let order = match token_type_hint.and_then(|h| h.parse().ok()) {
            Some(TokenKind::RefreshToken) => [TokenKind::RefreshToken, TokenKind::AccessToken],
            _ => [TokenKind::AccessToken, TokenKind::RefreshToken],
        };

        for kind in order {
            let revoked = match kind {
                TokenKind::AccessToken => self.revoke_access(&application.client_id, &token_hash).await?,
                TokenKind::RefreshToken => self.revoke_refresh(&application.client_id, &token_hash).await?,
            };
            if revoked {
                return Ok(());
            }
        }

        tracing::debug!("Revocation by {} matched no token", application.client_id);
        Ok(())
    }

    /// Returns whether a token with this hash exists, whoever it belongs to.
    async fn revoke_access(&self, client_id: &str, token_hash: &str) -> Result<bool, OAuthError> {
        let Some(token) = self.store().get_access_token(token_hash).await? else {
            return Ok(false);
        };
        if token.client_id != client_id {
            tracing::warn!("Client {} tried to revoke a token of {}", client_id, token.client_id);
            return Ok(true);
        }

        self.store().revoke_access_token(token_hash).await?;
        if self.config().revoke_refresh_with_access {
            if let Some(refresh_hash) = &token.refresh_token_hash {
                self.store().revoke_refresh_token(refresh_hash).await?;
            }
        }

        tracing::info!("Revoked access token of client {} (grant {})", client_id, token.grant_id);
        self.events().emit(AuditEvent::TokenRevoked {
            client_id: client_id.to_string(),
            token_type: TokenKind::AccessToken.as_str().to_string(),
            grant_id: token.grant_id,
        });
        Ok(true)
    }

    async fn revoke_refresh(&self, client_id: &str, token_hash: &str) -> Result<bool, OAuthError> {
        let Some(token) = self.store().get_refresh_token(token_hash).await? else {
            return Ok(false);
        };
        if token.client_id != client_id {
            tracing::warn!("Client {} tried to revoke a token of {}", client_id, token.client_id);
            return Ok(true);
        }

        self.store().revoke_refresh_token(token_hash).await?;

        tracing::info!("Revoked refresh token of client {} (grant {})", client_id, token.grant_id);
        self.events().emit(AuditEvent::TokenRevoked {
            client_id: client_id.to_string(),
            token_type: TokenKind::RefreshToken.as_str().to_string(),
            grant_id: token.grant_id,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_parsing() {
        assert_eq!("refresh_token".parse::<TokenKind>(), Ok(TokenKind::RefreshToken));
        assert_eq!("access_token".parse::<TokenKind>(), Ok(TokenKind::AccessToken));
        assert!("id_token".parse::<TokenKind>().is_err());
    }
}
