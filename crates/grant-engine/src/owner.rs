//! Resource-owner identity lookup and authentication.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::secret::verify_secret;

/// An authenticated resource owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwner {
    pub id: String,
    pub username: String,
    /// Administrators may manage every application
    #[serde(default)]
    pub is_admin: bool,
}

/// External collaborator that knows who the resource owners are.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// Look up an owner by id.
    async fn find(&self, owner_id: &str) -> Result<Option<ResourceOwner>, StoreError>;

    /// Check a username/password pair (password grant).
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<ResourceOwner>, StoreError>;
}

/// A directory entry with its argon2 password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRecord {
    #[serde(flatten)]
    pub owner: ResourceOwner,
    /// PHC string; owners without one cannot use the password grant
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Fixed, in-memory owner directory
#[derive(Debug, Default)]
pub struct StaticOwnerDirectory {
    by_id: HashMap<String, OwnerRecord>,
}

impl StaticOwnerDirectory {
    pub fn new(records: impl IntoIterator<Item = OwnerRecord>) -> Self {
        Self {
            by_id: records
                .into_iter()
                .map(|r| (r.owner.id.clone(), r))
                .collect(),
        }
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn find(&self, owner_id: &str) -> Result<Option<ResourceOwner>, StoreError> {
        Ok(self.by_id.get(owner_id).map(|r| r.owner.clone()))
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<ResourceOwner>, StoreError> {
        let record = self.by_id.values().find(|r| r.owner.username == username);
        Ok(record.and_then(|r| {
            let hash = r.password_hash.as_deref()?;
            verify_secret(password, hash).then(|| r.owner.clone())
        }))
    }
}
