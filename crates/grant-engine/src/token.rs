//! Authorization code, access token and refresh token records, and the
//! minter that creates them.
//!
//! Raw values leave the minter exactly once inside [`Minted`]; records only
//! ever hold the SHA-256 hash.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::Application;
use crate::clock::Clock;
use crate::credentials::PkceChallenge;
use crate::scope::ScopeSet;
use crate::secret::{generate_random_string, hash_token};

const TOKEN_LENGTH: usize = 48;
const CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeState {
    Issued,
    Exchanged,
    Revoked,
}

/// A pending authorization code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code_hash: String,
    pub client_id: String,
    pub owner_id: String,
    pub scopes: ScopeSet,
    pub redirect_uri: String,
    /// Whether the authorization request named the redirect URI itself
    pub redirect_uri_explicit: bool,
    pub code_challenge: Option<PkceChallenge>,
    pub nonce: Option<String>,
    /// Lineage shared by every token derived from this grant
    pub grant_id: Uuid,
    pub auth_time: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: CodeState,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A stored access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token_hash: String,
    pub client_id: String,
    /// Absent for client-credentials grants
    pub owner_id: Option<String>,
    pub scopes: ScopeSet,
    pub grant_id: Uuid,
    /// The refresh token this access token was issued with or from
    pub refresh_token_hash: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshState {
    Active,
    /// Retired by rotation; presenting it again is a replay
    Rotated,
    Revoked,
}

/// A stored refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token_hash: String,
    pub client_id: String,
    pub owner_id: Option<String>,
    /// Scopes of the original grant; refreshes may narrow but never widen
    pub scopes: ScopeSet,
    pub grant_id: Uuid,
    pub access_token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: RefreshState,
}

/// Records committed to the store in one all-or-nothing write.
#[derive(Debug, Clone, Default)]
pub struct TokenBatch {
    pub code: Option<AuthorizationCode>,
    pub access: Option<AccessToken>,
    pub refresh: Option<RefreshToken>,
}

/// A freshly minted secret value together with its stored record.
#[derive(Debug, Clone)]
pub struct Minted<T> {
    pub value: String,
    pub record: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::AccessToken => "access_token",
            TokenKind::RefreshToken => "refresh_token",
        }
    }
}

/// Parses a `token_type_hint`.
impl FromStr for TokenKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_token" => Ok(TokenKind::AccessToken),
            "refresh_token" => Ok(TokenKind::RefreshToken),
            _ => Err(()),
        }
    }
}

/// State of a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub kind: TokenKind,
    pub client_id: String,
    pub owner_id: Option<String>,
    pub scopes: ScopeSet,
    pub grant_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("token is not recognised")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token has been revoked")]
    Revoked,
    /// The token could not be looked up; says nothing about its validity.
    #[error("token store unavailable")]
    ServerError,
}

impl AccessToken {
    pub fn check(&self, now: DateTime<Utc>) -> Result<TokenInfo, TokenRejection> {
        if self.revoked {
            return Err(TokenRejection::Revoked);
        }
        if now >= self.expires_at {
            return Err(TokenRejection::Expired);
        }
        Ok(TokenInfo {
            kind: TokenKind::AccessToken,
            client_id: self.client_id.clone(),
            owner_id: self.owner_id.clone(),
            scopes: self.scopes.clone(),
            grant_id: self.grant_id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        })
    }
}

impl RefreshToken {
    pub fn check(&self, now: DateTime<Utc>) -> Result<TokenInfo, TokenRejection> {
        if self.state != RefreshState::Active {
            return Err(TokenRejection::Revoked);
        }
        if now >= self.expires_at {
            return Err(TokenRejection::Expired);
        }
        Ok(TokenInfo {
            kind: TokenKind::RefreshToken,
            client_id: self.client_id.clone(),
            owner_id: self.owner_id.clone(),
            scopes: self.scopes.clone(),
            grant_id: self.grant_id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        })
    }
}

/// Inputs for a new authorization code.
#[derive(Debug, Clone)]
pub struct CodeGrant {
    pub owner_id: String,
    pub scopes: ScopeSet,
    pub redirect_uri: String,
    pub redirect_uri_explicit: bool,
    pub code_challenge: Option<PkceChallenge>,
    pub nonce: Option<String>,
    pub grant_id: Uuid,
}

/// Creates opaque tokens and codes with expiry stamped from the clock.
#[derive(Clone)]
pub struct TokenMinter {
    clock: Arc<dyn Clock>,
}

impl TokenMinter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn mint_access_token(
        &self,
        application: &Application,
        owner_id: Option<&str>,
        scopes: &ScopeSet,
        grant_id: Uuid,
        ttl: Duration,
    ) -> Minted<AccessToken> {
        let value = generate_random_string(TOKEN_LENGTH);
        let now = self.clock.now();
        let record = AccessToken {
            token_hash: hash_token(&value),
            client_id: application.client_id.clone(),
            owner_id: owner_id.map(str::to_string),
            scopes: scopes.clone(),
            grant_id,
            refresh_token_hash: None,
            issued_at: now,
            expires_at: now + ttl,
            revoked: false,
        };
        Minted { value, record }
    }

    /// Mint a refresh token bound to `access`, linking the two records.
    pub fn mint_refresh_token(
        &self,
        access: &mut AccessToken,
        scopes: &ScopeSet,
        ttl: Duration,
    ) -> Minted<RefreshToken> {
        let value = generate_random_string(TOKEN_LENGTH);
        let now = self.clock.now();
        let record = RefreshToken {
            token_hash: hash_token(&value),
            client_id: access.client_id.clone(),
            owner_id: access.owner_id.clone(),
            scopes: scopes.clone(),
            grant_id: access.grant_id,
            access_token_hash: access.token_hash.clone(),
            issued_at: now,
            expires_at: now + ttl,
            state: RefreshState::Active,
        };
        access.refresh_token_hash = Some(record.token_hash.clone());
        Minted { value, record }
    }

    pub fn mint_code(
        &self,
        application: &Application,
        grant: CodeGrant,
        ttl: Duration,
    ) -> Minted<AuthorizationCode> {
        let value = generate_random_string(CODE_LENGTH);
        let now = self.clock.now();
        let record = AuthorizationCode {
            code_hash: hash_token(&value),
            client_id: application.client_id.clone(),
            owner_id: grant.owner_id,
            scopes: grant.scopes,
            redirect_uri: grant.redirect_uri,
            redirect_uri_explicit: grant.redirect_uri_explicit,
            code_challenge: grant.code_challenge,
            nonce: grant.nonce,
            grant_id: grant.grant_id,
            auth_time: now,
            issued_at: now,
            expires_at: now + ttl,
            state: CodeState::Issued,
        };
        Minted { value, record }
    }
}
