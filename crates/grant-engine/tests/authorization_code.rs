//! Authorization-code flow from request to refresh, including the failure
//! states of the code state machine.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use grant_engine::secret::hash_token;
use grant_engine::token::CodeState;
use grant_engine::{
    Algorithm, AuthorizationRequest, AuthorizeError, ClientCredentials, ClientType, GrantType,
    OAuthError, ResponseMode, ScopeSet, StaticKeySource, TokenRejection, TokenRequest,
};
use grant_engine::id_token::IdTokenClaims;
use jsonwebtoken::{DecodingKey, Validation};

#[tokio::test]
async fn test_code_flow_end_to_end() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Confidential, GrantType::AuthorizationCode))
        .await;
    let client_id = reg.application.client_id.clone();

    let pending = h
        .engine
        .validate_authorization(&code_request(&client_id, "read"))
        .await
        .unwrap();
    assert_eq!(pending.scopes().to_string(), "read");
    assert_eq!(pending.redirect_uri(), REDIRECT_URI);

    let response = h.engine.approve(pending, &h.owner).await.unwrap();
    assert_eq!(response.mode, ResponseMode::Query);
    assert_eq!(response.get("state"), Some("xyz"));
    let location = response.location();
    assert!(location.starts_with("http://example.com/cb?code="));
    assert!(location.ends_with("&state=xyz"));

    let code = response.get("code").unwrap().to_string();
    let tokens = h
        .engine
        .token(&credentials(&reg), &code_exchange(&code))
        .await
        .unwrap();
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.scope, "read");
    assert_eq!(tokens.expires_in, 3600);
    assert!(tokens.id_token.is_none());
    let refresh_token = tokens.refresh_token.clone().unwrap();

    let info = h.engine.validate(&tokens.access_token).await.unwrap();
    assert_eq!(info.client_id, client_id);
    assert_eq!(info.owner_id.as_deref(), Some("1"));

    // Refresh: the old access token dies, the new one works
    let refreshed = h
        .engine
        .token(&credentials(&reg), &refresh_request(&refresh_token))
        .await
        .unwrap();
    assert_eq!(
        h.engine.validate(&tokens.access_token).await,
        Err(TokenRejection::Revoked)
    );
    assert!(h.engine.validate(&refreshed.access_token).await.is_ok());
    assert_ne!(refreshed.refresh_token.as_deref(), Some(refresh_token.as_str()));
}

#[tokio::test]
async fn test_code_reuse_revokes_issued_tokens() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Confidential, GrantType::AuthorizationCode))
        .await;

    let response = h
        .authorize(code_request(&reg.application.client_id, "read write"))
        .await
        .unwrap();
    let code = response.get("code").unwrap().to_string();
    let first = h
        .engine
        .token(&credentials(&reg), &code_exchange(&code))
        .await
        .unwrap();

    let second = h.engine.token(&credentials(&reg), &code_exchange(&code)).await;
    assert!(matches!(second, Err(OAuthError::InvalidGrant(_))));

    assert_eq!(
        h.engine.validate(&first.access_token).await,
        Err(TokenRejection::Revoked)
    );
    let refresh = h
        .engine
        .token(
            &credentials(&reg),
            &refresh_request(first.refresh_token.as_deref().unwrap()),
        )
        .await;
    assert!(matches!(refresh, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemption_has_one_winner() {
    let h = Arc::new(Harness::new());
    let reg = h
        .register(application(ClientType::Public, GrantType::AuthorizationCode))
        .await;

    let response = h
        .authorize(AuthorizationRequest {
            code_challenge: Some(CHALLENGE.into()),
            code_challenge_method: Some("S256".into()),
            ..code_request(&reg.application.client_id, "read")
        })
        .await
        .unwrap();
    let code = response.get("code").unwrap().to_string();

    let attempts = (0..8).map(|_| {
        let h = h.clone();
        let creds = credentials(&reg);
        let request = TokenRequest {
            code_verifier: Some(VERIFIER.into()),
            ..code_exchange(&code)
        };
        tokio::spawn(async move { h.engine.token(&creds, &request).await })
    });
    let results = futures::future::join_all(attempts).await;

    let successes = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_expiry_boundaries() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Confidential, GrantType::AuthorizationCode))
        .await;
    let tokens = h.code_flow(&reg, "read").await;

    h.clock.advance(Duration::seconds(3599));
    assert!(h.engine.validate(&tokens.access_token).await.is_ok());
    h.clock.advance(Duration::seconds(1));
    assert_eq!(
        h.engine.validate(&tokens.access_token).await,
        Err(TokenRejection::Expired)
    );

    // Codes live for 60 seconds
    let response = h
        .authorize(code_request(&reg.application.client_id, "read"))
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(60));
    let expired = h
        .engine
        .token(
            &credentials(&reg),
            &code_exchange(response.get("code").unwrap()),
        )
        .await;
    assert_eq!(
        expired.unwrap_err(),
        OAuthError::InvalidGrant("authorization code expired".into())
    );
}

#[tokio::test]
async fn test_pkce_required_and_checked_for_public_clients() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Public, GrantType::AuthorizationCode))
        .await;
    let client_id = reg.application.client_id.clone();

    let err = h
        .engine
        .validate_authorization(&code_request(&client_id, "read"))
        .await
        .unwrap_err();
    assert!(matches!(err.error(), OAuthError::InvalidRequest(_)));
    assert!(err.location().unwrap().contains("error=invalid_request"));

    let response = h
        .authorize(AuthorizationRequest {
            code_challenge: Some(CHALLENGE.into()),
            code_challenge_method: Some("S256".into()),
            ..code_request(&client_id, "read")
        })
        .await
        .unwrap();
    let code = response.get("code").unwrap();

    let wrong = h
        .engine
        .token(
            &ClientCredentials::public(&client_id),
            &TokenRequest {
                code_verifier: Some("x".repeat(43)),
                ..code_exchange(code)
            },
        )
        .await;
    assert!(matches!(wrong, Err(OAuthError::InvalidGrant(_))));

    let missing = h
        .engine
        .token(&ClientCredentials::public(&client_id), &code_exchange(code))
        .await;
    assert!(matches!(missing, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test]
async fn test_redirect_uri_rules() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Confidential, GrantType::AuthorizationCode))
        .await;
    let client_id = reg.application.client_id.clone();

    // Trailing slash is a different URI, and never redirected to
    let err = h
        .engine
        .validate_authorization(&AuthorizationRequest {
            redirect_uri: Some("http://example.com/cb/".into()),
            ..code_request(&client_id, "read")
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthorizeError::Direct(OAuthError::MismatchingRedirectUri)
    ));
    assert!(err.location().is_none());

    // Omitted: falls back to the single registered URI, and the token
    // request may then omit it too
    let response = h
        .authorize(AuthorizationRequest {
            redirect_uri: None,
            ..code_request(&client_id, "read")
        })
        .await
        .unwrap();
    assert!(response.location().starts_with(REDIRECT_URI));
    let tokens = h
        .engine
        .token(
            &credentials(&reg),
            &TokenRequest {
                redirect_uri: None,
                ..code_exchange(response.get("code").unwrap())
            },
        )
        .await;
    assert!(tokens.is_ok());

    // Named at authorization: the token request must repeat it
    let response = h.authorize(code_request(&client_id, "read")).await.unwrap();
    let missing = h
        .engine
        .token(
            &credentials(&reg),
            &TokenRequest {
                redirect_uri: None,
                ..code_exchange(response.get("code").unwrap())
            },
        )
        .await;
    assert!(matches!(missing, Err(OAuthError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_scope_outside_allowed_set_is_redirected() {
    let h = Harness::new();
    let mut new = application(ClientType::Confidential, GrantType::AuthorizationCode);
    new.allowed_scopes = ScopeSet::parse("read");
    let reg = h.register(new).await;

    let err = h
        .engine
        .validate_authorization(&code_request(&reg.application.client_id, "read write"))
        .await
        .unwrap_err();
    assert!(matches!(err.error(), OAuthError::InvalidScope(_)));
    let location = err.location().unwrap();
    assert!(location.starts_with("http://example.com/cb?error=invalid_scope"));
    assert!(location.ends_with("&state=xyz"));
}

#[tokio::test]
async fn test_owner_denial() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Confidential, GrantType::AuthorizationCode))
        .await;
    let pending = h
        .engine
        .validate_authorization(&code_request(&reg.application.client_id, "read"))
        .await
        .unwrap();

    let err = h.engine.deny(pending);
    assert_eq!(err.error(), &OAuthError::AccessDenied);
    let location = err.location().unwrap();
    assert!(location.contains("error=access_denied"));
    assert!(location.ends_with("state=xyz"));
}

#[tokio::test]
async fn test_missing_signing_key_consumes_nothing() {
    let h = Harness::new();
    let mut new = application(ClientType::Confidential, GrantType::AuthorizationCode);
    new.algorithm = Algorithm::Rs256;
    let reg = h.register(new).await;

    let response = h
        .authorize(AuthorizationRequest {
            nonce: Some("n-0S6_WzA2Mj".into()),
            ..code_request(&reg.application.client_id, "openid read")
        })
        .await
        .unwrap();
    let code = response.get("code").unwrap();

    for _ in 0..2 {
        let result = h.engine.token(&credentials(&reg), &code_exchange(code)).await;
        assert!(matches!(result, Err(OAuthError::ServerError(_))));
    }

    let stored = h
        .engine
        .store()
        .get_code(&hash_token(code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, CodeState::Issued);
}

#[tokio::test]
async fn test_openid_withheld_without_usable_algorithm() {
    let h = Harness::new();
    let reg = h
        .register(application(ClientType::Confidential, GrantType::AuthorizationCode))
        .await;

    let err = h
        .engine
        .validate_authorization(&code_request(&reg.application.client_id, "openid"))
        .await
        .unwrap_err();
    assert!(matches!(err.error(), OAuthError::InvalidScope(_)));

    // An empty request gets every grantable scope, which excludes openid here
    let pending = h
        .engine
        .validate_authorization(&code_request(&reg.application.client_id, ""))
        .await
        .unwrap();
    assert!(!pending.scopes().contains("openid"));
    assert!(pending.scopes().contains("read"));
}

#[tokio::test]
async fn test_rs256_key_source_with_hybrid_flow() {
    let h = Harness::with(
        Default::default(),
        StaticKeySource::new().with_rsa_pem(RSA_PRIVATE, Some("key-1".into())),
    );
    let mut new = application(ClientType::Confidential, GrantType::OpenIdHybrid);
    new.algorithm = Algorithm::Rs256;
    let reg = h.register(new).await;

    let response = h
        .authorize(AuthorizationRequest {
            response_type: "code id_token".into(),
            nonce: Some("n-0S6_WzA2Mj".into()),
            ..code_request(&reg.application.client_id, "openid read")
        })
        .await
        .unwrap();
    assert_eq!(response.mode, ResponseMode::Fragment);
    assert!(response.location().starts_with("http://example.com/cb#code="));

    let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.set_audience(&[&reg.application.client_id]);
    validation.set_issuer(&["http://localhost:3001"]);
    let decoded = jsonwebtoken::decode::<IdTokenClaims>(
        response.get("id_token").unwrap(),
        &DecodingKey::from_rsa_pem(RSA_PUBLIC).unwrap(),
        &validation,
    )
    .unwrap();
    assert_eq!(decoded.header.kid.as_deref(), Some("key-1"));
    assert_eq!(decoded.claims.sub, "1");
    assert_eq!(decoded.claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    assert!(decoded.claims.c_hash.is_some());
    assert!(decoded.claims.at_hash.is_none());

    let tokens = h
        .engine
        .token(
            &credentials(&reg),
            &code_exchange(response.get("code").unwrap()),
        )
        .await
        .unwrap();
    assert!(tokens.id_token.is_some());
    assert!(tokens.refresh_token.is_some());
}
