//! `client_credentials` grant: a confidential client acting on its own behalf.

use uuid::Uuid;

use super::{GrantEngine, TokenGrant, TokenRequest, TokenResponse};
use crate::application::{Application, GrantType};
use crate::error::OAuthError;
use crate::scope::{clip, ScopeSet};

impl GrantEngine {
    pub(crate) async fn client_credentials(
        &self,
        application: &Application,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        Self::require_grant_type(application, &[GrantType::ClientCredentials])?;
        if !application.is_confidential() {
            return Err(OAuthError::UnauthorizedClient(
                "client_credentials requires a confidential client".to_string(),
            ));
        }

        // No resource owner, so no identity to assert
        let mut allowed = self.grantable_scopes(application);
        allowed.remove("openid");
        let scopes = clip(&ScopeSet::from_optional(request.scope.as_deref()), &allowed)?;

        let grant_id = Uuid::new_v4();
        let pair = self.issue_pair(application, None, &scopes, grant_id, false);
        let (batch, access_token, _) = pair.into_batch();
        self.store().commit(batch).await?;

        self.emit_issued(
            application,
            None,
            TokenGrant::ClientCredentials.as_str(),
            grant_id,
            false,
        );
        Ok(self.token_response(access_token, None, &scopes, None))
    }
}
