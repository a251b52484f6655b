//! Client authentication, redirect URI checks and PKCE (RFC 7636).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::application::{Application, ClientType};
use crate::error::OAuthError;
use crate::secret::{base64url_sha256, constant_time_eq, verify_secret};

/// How the client presented its credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Basic` header
    ClientSecretBasic,
    /// `client_id` / `client_secret` in the request body
    ClientSecretPost,
    /// `client_id` only
    None,
}

/// Client credentials as extracted by the transport.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub secret: Option<String>,
    pub method: AuthMethod,
}

impl ClientCredentials {
    pub fn basic(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: Some(secret.into()),
            method: AuthMethod::ClientSecretBasic,
        }
    }

    pub fn post(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: Some(secret.into()),
            method: AuthMethod::ClientSecretPost,
        }
    }

    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: None,
            method: AuthMethod::None,
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("method", &self.method)
            .finish()
    }
}

/// Check presented credentials against a looked-up application.
///
/// Confidential clients must present a secret matching the stored argon2
/// hash. Public clients skip the secret check, but a secret sent over HTTP
/// Basic is refused so a public client cannot pass itself off as confidential.
pub fn verify_client(
    application: &Application,
    credentials: &ClientCredentials,
) -> Result<(), OAuthError> {
    match application.client_type {
        ClientType::Confidential => {
            let (Some(secret), Some(hash)) = (&credentials.secret, &application.secret_hash) else {
                tracing::warn!(
                    "Confidential client {} did not present a secret",
                    application.client_id
                );
                return Err(OAuthError::InvalidClient);
            };
            if !verify_secret(secret, hash) {
                tracing::warn!("Client secret mismatch for {}", application.client_id);
                return Err(OAuthError::InvalidClient);
            }
            Ok(())
        }
        ClientType::Public => {
            let basic_secret = credentials.method == AuthMethod::ClientSecretBasic
                && credentials.secret.as_deref().is_some_and(|s| !s.is_empty());
            if basic_secret {
                tracing::warn!(
                    "Public client {} presented a secret via HTTP Basic",
                    application.client_id
                );
                return Err(OAuthError::InvalidClient);
            }
            Ok(())
        }
    }
}

/// Exact-match check of a requested redirect URI.
pub fn validate_redirect_uri(application: &Application, requested: &str) -> Result<(), OAuthError> {
    if application.is_registered_redirect(requested) {
        Ok(())
    } else {
        tracing::warn!(
            "Redirect URI {} is not registered for client {}",
            requested,
            application.client_id
        );
        Err(OAuthError::MismatchingRedirectUri)
    }
}

/// Pick the redirect URI for a request, falling back to the only registered
/// one. Returns the URI and whether the request named it.
pub fn resolve_redirect_uri(
    application: &Application,
    requested: Option<&str>,
) -> Result<(String, bool), OAuthError> {
    match requested {
        Some(uri) => {
            validate_redirect_uri(application, uri)?;
            Ok((uri.to_string(), true))
        }
        None => application
            .default_redirect_uri()
            .map(|uri| (uri.to_string(), false))
            .ok_or_else(|| {
                OAuthError::InvalidRedirectUri(
                    "redirect_uri is required when several are registered".to_string(),
                )
            }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl FromStr for CodeChallengeMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CodeChallengeMethod::Plain),
            "S256" => Ok(CodeChallengeMethod::S256),
            other => Err(OAuthError::InvalidRequest(format!(
                "unsupported code_challenge_method: {}",
                other
            ))),
        }
    }
}

impl Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodeChallengeMethod::Plain => f.write_str("plain"),
            CodeChallengeMethod::S256 => f.write_str("S256"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

impl PkceChallenge {
    /// Parse the authorization-request parameters. The method defaults to
    /// `plain` when only a challenge is given.
    pub fn from_request(
        challenge: Option<&str>,
        method: Option<&str>,
    ) -> Result<Option<Self>, OAuthError> {
        let Some(challenge) = challenge else {
            if method.is_some() {
                return Err(OAuthError::InvalidRequest(
                    "code_challenge_method without code_challenge".to_string(),
                ));
            }
            return Ok(None);
        };

        let method = method
            .map(str::parse)
            .transpose()?
            .unwrap_or(CodeChallengeMethod::Plain);

        let well_formed = match method {
            CodeChallengeMethod::S256 => {
                challenge.len() == 43 && challenge.bytes().all(is_base64url_byte)
            }
            CodeChallengeMethod::Plain => is_valid_verifier(challenge),
        };
        if !well_formed {
            return Err(OAuthError::InvalidRequest(format!(
                "malformed {} code_challenge",
                method
            )));
        }

        Ok(Some(Self {
            challenge: challenge.to_string(),
            method,
        }))
    }
}

/// RFC 7636 §4.1: 43-128 characters from the unreserved set.
fn is_valid_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

fn is_base64url_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Recompute the challenge from the verifier and compare in constant time.
pub fn validate_pkce(challenge: &PkceChallenge, code_verifier: &str) -> Result<(), OAuthError> {
    if !is_valid_verifier(code_verifier) {
        return Err(OAuthError::InvalidGrant("malformed code_verifier".to_string()));
    }

    let computed = match challenge.method {
        CodeChallengeMethod::Plain => code_verifier.to_string(),
        CodeChallengeMethod::S256 => base64url_sha256(code_verifier.as_bytes()),
    };

    if constant_time_eq(&computed, &challenge.challenge) {
        Ok(())
    } else {
        Err(OAuthError::InvalidGrant(
            "code_verifier does not match code_challenge".to_string(),
        ))
    }
}
