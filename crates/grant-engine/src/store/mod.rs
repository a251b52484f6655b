//! Repository interface for applications, codes and tokens.
//!
//! The store is the only shared mutable state of the engine. Single-use
//! guarantees (code redemption, refresh rotation) are single calls here, so
//! implementations can make them atomic instead of callers racing a
//! read-then-write.
//!
//! Implementations:
//! - `Storage` - In-memory, optionally snapshotted to JSON files

mod memory;

pub use memory::Storage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::application::Application;
use crate::error::StoreError;
use crate::token::{AccessToken, AuthorizationCode, RefreshToken, TokenBatch};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an attempt to redeem an authorization code.
#[derive(Debug, Clone)]
pub enum Redemption {
    /// The code was `Issued`; it is now `Exchanged` and the batch is stored.
    Redeemed,
    /// The code had already been exchanged or revoked. Nothing was written.
    AlreadyConsumed { grant_id: Uuid },
    NotFound,
}

/// Outcome of exchanging a refresh token.
#[derive(Debug, Clone)]
pub enum RefreshExchange {
    /// The new tokens are stored; access tokens previously minted from the
    /// presented refresh token are revoked.
    Exchanged,
    /// The presented token was rotated out earlier. Nothing was written.
    Replayed { grant_id: Uuid },
    /// The presented token is revoked or unknown. Nothing was written.
    Inactive,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Applications ---

    /// Fails with `Conflict` if the client_id is taken.
    async fn insert_application(&self, application: Application) -> Result<()>;

    async fn get_application(&self, client_id: &str) -> Result<Option<Application>>;

    /// Replace the application stored under `client_id`; the replacement may
    /// carry a new client_id, which must not be taken.
    async fn replace_application(&self, client_id: &str, application: Application) -> Result<()>;

    /// Applications registered by `owner`
    async fn list_applications(&self, owner: &str) -> Result<Vec<Application>>;

    /// Remove an application with all of its codes and tokens.
    async fn remove_application(&self, client_id: &str) -> Result<bool>;

    // --- Codes and tokens ---

    /// Store every record of the batch, or none of them.
    async fn commit(&self, batch: TokenBatch) -> Result<()>;

    async fn get_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>>;

    /// Atomically mark an `Issued` code as `Exchanged` and store the batch.
    async fn redeem_code(&self, code_hash: &str, batch: TokenBatch) -> Result<Redemption>;

    async fn get_access_token(&self, token_hash: &str) -> Result<Option<AccessToken>>;

    async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Atomically check the refresh token is active, retire it when
    /// `rotate`, revoke access tokens minted from it and store the batch.
    async fn exchange_refresh_token(
        &self,
        token_hash: &str,
        rotate: bool,
        batch: TokenBatch,
    ) -> Result<RefreshExchange>;

    /// Returns the token as it was before revocation, if it exists.
    async fn revoke_access_token(&self, token_hash: &str) -> Result<Option<AccessToken>>;

    /// Revoke a refresh token and every access token minted from it.
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Revoke the code and every token of a grant lineage. Returns how many
    /// records changed.
    async fn revoke_grant(&self, grant_id: Uuid) -> Result<usize>;

    /// Drop expired codes and tokens. Returns how many records were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
