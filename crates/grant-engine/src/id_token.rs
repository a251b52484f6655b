//! OpenID Connect ID tokens, signed per application algorithm.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration};
use jsonwebtoken::{EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::application::{Algorithm, Application};
use crate::clock::Clock;
use crate::error::SigningError;

/// An RSA private key in PEM form
#[derive(Clone)]
pub struct RsaKey {
    pub kid: Option<String>,
    pub pem: Vec<u8>,
}

/// External collaborator that hands out signing material.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// HS256 key for a client whose secret is not at hand in the current request
    async fn hmac_secret(&self, client_id: &str) -> Result<Option<Vec<u8>>, SigningError>;

    /// RS256 private key used for a client
    async fn rsa_key(&self, client_id: &str) -> Result<Option<RsaKey>, SigningError>;
}

/// Keys held in memory, loaded once at start-up
#[derive(Clone, Default)]
pub struct StaticKeySource {
    rsa: Option<RsaKey>,
    hmac: HashMap<String, Vec<u8>>,
}

impl StaticKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rsa_pem(mut self, pem: impl Into<Vec<u8>>, kid: Option<String>) -> Self {
        self.rsa = Some(RsaKey {
            kid,
            pem: pem.into(),
        });
        self
    }

    pub fn with_hmac_secret(mut self, client_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.hmac.insert(client_id.into(), secret.into());
        self
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn hmac_secret(&self, client_id: &str) -> Result<Option<Vec<u8>>, SigningError> {
        Ok(self.hmac.get(client_id).cloned())
    }

    async fn rsa_key(&self, _client_id: &str) -> Result<Option<RsaKey>, SigningError> {
        Ok(self.rsa.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,
}

/// What an ID token asserts and what it is issued alongside.
pub struct IdTokenRequest<'a> {
    pub application: &'a Application,
    pub owner_id: &'a str,
    pub nonce: Option<&'a str>,
    pub auth_time: DateTime<chrono::Utc>,
    /// Access token returned in the same response (`at_hash`)
    pub access_token: Option<&'a str>,
    /// Code returned in the same response (`c_hash`)
    pub code: Option<&'a str>,
    /// Client secret verified in the current request, used as the HS256 key
    pub verified_secret: Option<&'a str>,
}

pub struct IdTokenSigner {
    keys: Arc<dyn KeySource>,
    clock: Arc<dyn Clock>,
    issuer: String,
    ttl: Duration,
    allow_unsigned: bool,
}

impl IdTokenSigner {
    pub fn new(
        keys: Arc<dyn KeySource>,
        clock: Arc<dyn Clock>,
        issuer: String,
        ttl: Duration,
        allow_unsigned: bool,
    ) -> Self {
        Self {
            keys,
            clock,
            issuer,
            ttl,
            allow_unsigned,
        }
    }

    /// Whether an application's algorithm can be used under current policy.
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        algorithm != Algorithm::None || self.allow_unsigned
    }

    pub async fn mint_id_token(&self, request: IdTokenRequest<'_>) -> Result<String, SigningError> {
        let now = self.clock.now();
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: request.owner_id.to_string(),
            aud: request.application.client_id.clone(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            auth_time: request.auth_time.timestamp(),
            nonce: request.nonce.map(str::to_string),
            at_hash: request.access_token.map(half_hash),
            c_hash: request.code.map(half_hash),
        };

        let client_id = &request.application.client_id;
        match request.application.algorithm {
            Algorithm::None => {
                if !self.allow_unsigned {
                    return Err(SigningError::UnsignedNotAllowed);
                }
                encode_unsigned(&claims)
            }
            Algorithm::Hs256 => {
                let secret = match request.verified_secret {
                    Some(secret) => secret.as_bytes().to_vec(),
                    None => self
                        .keys
                        .hmac_secret(client_id)
                        .await?
                        .ok_or(SigningError::MissingKey("HS256"))?,
                };
                let header = Header::new(jsonwebtoken::Algorithm::HS256);
                Ok(jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(&secret))?)
            }
            Algorithm::Rs256 => {
                let key = self
                    .keys
                    .rsa_key(client_id)
                    .await?
                    .ok_or(SigningError::MissingKey("RS256"))?;
                let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
                header.kid = key.kid.clone();
                let encoding_key = EncodingKey::from_rsa_pem(&key.pem)?;
                Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
            }
        }
    }
}

/// Left-most half of the SHA-256 digest, base64url encoded (OIDC Core §3.1.3.6).
fn half_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

fn encode_unsigned(claims: &IdTokenClaims) -> Result<String, SigningError> {
    let header = serde_json::json!({"alg": "none", "typ": "JWT"});
    Ok(format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    ))
}
