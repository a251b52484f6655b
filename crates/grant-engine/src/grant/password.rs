//! `password` grant: resource owner credentials exchanged directly.

use uuid::Uuid;

use super::{GrantEngine, TokenGrant, TokenRequest, TokenResponse};
use crate::application::{Application, GrantType};
use crate::error::OAuthError;
use crate::scope::{clip, ScopeSet};

impl GrantEngine {
    pub(crate) async fn password(
        &self,
        application: &Application,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        Self::require_grant_type(application, &[GrantType::Password])?;
        let (Some(username), Some(password)) =
            (request.username.as_deref(), request.password.as_deref())
        else {
            return Err(OAuthError::InvalidRequest(
                "username and password are required".to_string(),
            ));
        };

        let mut allowed = self.grantable_scopes(application);
        allowed.remove("openid");
        let scopes = clip(&ScopeSet::from_optional(request.scope.as_deref()), &allowed)?;

        let Some(owner) = self.owners.authenticate(username, password).await? else {
            tracing::warn!(
                "Password grant for client {} rejected: bad owner credentials",
                application.client_id
            );
            return Err(OAuthError::InvalidGrant(
                "invalid resource owner credentials".to_string(),
            ));
        };

        let grant_id = Uuid::new_v4();
        let pair = self.issue_pair(application, Some(&owner.id), &scopes, grant_id, true);
        let (batch, access_token, refresh_token) = pair.into_batch();
        self.store().commit(batch).await?;

        self.emit_issued(
            application,
            Some(&owner.id),
            TokenGrant::Password.as_str(),
            grant_id,
            true,
        );
        Ok(self.token_response(access_token, refresh_token, &scopes, None))
    }
}
