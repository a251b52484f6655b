//! In-memory store with optional JSON persistence of applications and tokens.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RefreshExchange, Redemption, Result, Store};
use crate::application::Application;
use crate::error::StoreError;
use crate::token::{
    AccessToken, AuthorizationCode, CodeState, RefreshState, RefreshToken, TokenBatch,
};

/// Storage for OAuth data
pub struct Storage {
    /// Directory for JSON snapshots; `None` keeps everything in memory
    persist_dir: Option<PathBuf>,
    state: Mutex<State>,
}

#[derive(Clone, Default)]
struct State {
    applications: ApplicationStore,
    tokens: TokenStore,
    /// Maps code hash -> code (short-lived, never persisted)
    codes: HashMap<String, AuthorizationCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ApplicationStore {
    applications: HashMap<String, Application>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TokenStore {
    /// Maps token hash -> access token
    access: HashMap<String, AccessToken>,
    /// Maps token hash -> refresh token
    refresh: HashMap<String, RefreshToken>,
}

impl State {
    /// Reject a batch up front if any of its keys are taken, so a partial
    /// insert can never happen.
    fn check_batch(&self, batch: &TokenBatch) -> Result<()> {
        if let Some(code) = &batch.code {
            if self.codes.contains_key(&code.code_hash) {
                return Err(StoreError::Conflict("authorization code".to_string()));
            }
        }
        if let Some(access) = &batch.access {
            if self.tokens.access.contains_key(&access.token_hash) {
                return Err(StoreError::Conflict("access token".to_string()));
            }
        }
        if let Some(refresh) = &batch.refresh {
            if self.tokens.refresh.contains_key(&refresh.token_hash) {
                return Err(StoreError::Conflict("refresh token".to_string()));
            }
        }
        Ok(())
    }

    fn apply_batch(&mut self, batch: TokenBatch) {
        if let Some(code) = batch.code {
            self.codes.insert(code.code_hash.clone(), code);
        }
        if let Some(access) = batch.access {
            self.tokens.access.insert(access.token_hash.clone(), access);
        }
        if let Some(refresh) = batch.refresh {
            self.tokens.refresh.insert(refresh.token_hash.clone(), refresh);
        }
    }

    fn revoke_access_minted_from(&mut self, refresh_hash: &str) -> usize {
        let mut revoked = 0;
        for token in self.tokens.access.values_mut() {
            if !token.revoked && token.refresh_token_hash.as_deref() == Some(refresh_hash) {
                token.revoked = true;
                revoked += 1;
            }
        }
        revoked
    }
}

impl Storage {
    /// Create a store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            persist_dir: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Open a store persisted under `dir`, loading any previous snapshot
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let storage = Self {
            persist_dir: Some(dir),
            state: Mutex::new(State::default()),
        };

        storage.load()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("storage lock poisoned".to_string()))
    }

    // --- Persistence ---

    fn applications_path(dir: &Path) -> PathBuf {
        dir.join("applications.json")
    }

    fn tokens_path(dir: &Path) -> PathBuf {
        dir.join("tokens.json")
    }

    fn load(&self) -> Result<()> {
        let Some(dir) = &self.persist_dir else {
            return Ok(());
        };
        let mut state = self.lock()?;

        let path = Self::applications_path(dir);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            state.applications = serde_json::from_str(&content)?;
            tracing::info!(
                "Loaded {} registered applications",
                state.applications.applications.len()
            );
        }

        let path = Self::tokens_path(dir);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let mut tokens: TokenStore = serde_json::from_str(&content)?;

            // Clean up expired tokens on load
            let now = Utc::now();
            tokens.access.retain(|_, t| t.expires_at > now);
            tokens.refresh.retain(|_, t| t.expires_at > now);

            tracing::info!(
                "Loaded {} access tokens and {} refresh tokens",
                tokens.access.len(),
                tokens.refresh.len()
            );
            state.tokens = tokens;
        }
        Ok(())
    }

    /// Apply `change` and write the touched snapshot files. When the write
    /// fails the in-memory state is put back as it was, so a failed call
    /// leaves nothing behind. `change` reports whether it modified anything.
    fn transact<T>(
        &self,
        state: &mut State,
        snapshot: Snapshot,
        change: impl FnOnce(&mut State) -> (T, bool),
    ) -> Result<T> {
        let Some(dir) = &self.persist_dir else {
            return Ok(change(state).0);
        };

        let prior = state.clone();
        let (outcome, changed) = change(state);
        if !changed {
            return Ok(outcome);
        }

        if let Err(e) = Self::write_snapshot(dir, state, snapshot) {
            tracing::error!("Failed to persist storage, rolling back: {}", e);
            *state = prior;
            if let Err(restore) = Self::write_snapshot(dir, state, snapshot) {
                tracing::error!("Failed to restore previous snapshot: {}", restore);
            }
            return Err(e);
        }
        Ok(outcome)
    }

    fn write_snapshot(dir: &Path, state: &State, snapshot: Snapshot) -> Result<()> {
        // Encode first so a serialization failure writes no file at all
        let applications = snapshot
            .applications()
            .then(|| serde_json::to_string_pretty(&state.applications))
            .transpose()?;
        let tokens = snapshot
            .tokens()
            .then(|| serde_json::to_string_pretty(&state.tokens))
            .transpose()?;

        if let Some(content) = applications {
            std::fs::write(Self::applications_path(dir), content)?;
        }
        if let Some(content) = tokens {
            std::fs::write(Self::tokens_path(dir), content)?;
        }
        Ok(())
    }
}

/// Snapshot files a change has to rewrite
#[derive(Debug, Clone, Copy)]
enum Snapshot {
    Applications,
    Tokens,
    Both,
}

impl Snapshot {
    fn applications(self) -> bool {
        matches!(self, Snapshot::Applications | Snapshot::Both)
    }

    fn tokens(self) -> bool {
        matches!(self, Snapshot::Tokens | Snapshot::Both)
    }
}

#[async_trait]
impl Store for Storage {
    async fn insert_application(&self, application: Application) -> Result<()> {
        let mut state = self.lock()?;
        if state.applications.applications.contains_key(&application.client_id) {
            return Err(StoreError::Conflict(application.client_id));
        }
        self.transact(&mut state, Snapshot::Applications, |state| {
            state
                .applications
                .applications
                .insert(application.client_id.clone(), application);
            ((), true)
        })
    }

    async fn get_application(&self, client_id: &str) -> Result<Option<Application>> {
        let state = self.lock()?;
        Ok(state.applications.applications.get(client_id).cloned())
    }

    async fn replace_application(&self, client_id: &str, application: Application) -> Result<()> {
        let mut state = self.lock()?;
        if !state.applications.applications.contains_key(client_id) {
            return Err(StoreError::NotFound(client_id.to_string()));
        }
        let renamed = application.client_id != client_id;
        if renamed && state.applications.applications.contains_key(&application.client_id) {
            return Err(StoreError::Conflict(application.client_id));
        }

        let snapshot = if renamed {
            Snapshot::Both
        } else {
            Snapshot::Applications
        };
        self.transact(&mut state, snapshot, |state| {
            state.applications.applications.remove(client_id);
            if renamed {
                // Outstanding credentials stay bound to the application
                let new_id = application.client_id.clone();
                for code in state.codes.values_mut().filter(|c| c.client_id == client_id) {
                    code.client_id = new_id.clone();
                }
                for token in state.tokens.access.values_mut().filter(|t| t.client_id == client_id) {
                    token.client_id = new_id.clone();
                }
                for token in state.tokens.refresh.values_mut().filter(|t| t.client_id == client_id) {
                    token.client_id = new_id.clone();
                }
            }
            state
                .applications
                .applications
                .insert(application.client_id.clone(), application);
            ((), true)
        })
    }

    async fn list_applications(&self, owner: &str) -> Result<Vec<Application>> {
        let state = self.lock()?;
        let mut applications: Vec<Application> = state
            .applications
            .applications
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(applications)
    }

    async fn remove_application(&self, client_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.applications.applications.contains_key(client_id) {
            return Ok(false);
        }
        self.transact(&mut state, Snapshot::Both, |state| {
            state.applications.applications.remove(client_id);
            state.codes.retain(|_, c| c.client_id != client_id);
            state.tokens.access.retain(|_, t| t.client_id != client_id);
            state.tokens.refresh.retain(|_, t| t.client_id != client_id);
            (true, true)
        })
    }

    async fn commit(&self, batch: TokenBatch) -> Result<()> {
        let mut state = self.lock()?;
        state.check_batch(&batch)?;
        // Auth codes are short-lived and not persisted
        let touches_tokens = batch.access.is_some() || batch.refresh.is_some();
        self.transact(&mut state, Snapshot::Tokens, |state| {
            state.apply_batch(batch);
            ((), touches_tokens)
        })
    }

    async fn get_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>> {
        let state = self.lock()?;
        Ok(state.codes.get(code_hash).cloned())
    }

    async fn redeem_code(&self, code_hash: &str, batch: TokenBatch) -> Result<Redemption> {
        let mut state = self.lock()?;
        let Some(code) = state.codes.get(code_hash) else {
            return Ok(Redemption::NotFound);
        };
        if code.state != CodeState::Issued {
            return Ok(Redemption::AlreadyConsumed {
                grant_id: code.grant_id,
            });
        }

        state.check_batch(&batch)?;
        self.transact(&mut state, Snapshot::Tokens, |state| {
            if let Some(code) = state.codes.get_mut(code_hash) {
                code.state = CodeState::Exchanged;
            }
            state.apply_batch(batch);
            (Redemption::Redeemed, true)
        })
    }

    async fn get_access_token(&self, token_hash: &str) -> Result<Option<AccessToken>> {
        let state = self.lock()?;
        Ok(state.tokens.access.get(token_hash).cloned())
    }

    async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let state = self.lock()?;
        Ok(state.tokens.refresh.get(token_hash).cloned())
    }

    async fn exchange_refresh_token(
        &self,
        token_hash: &str,
        rotate: bool,
        batch: TokenBatch,
    ) -> Result<RefreshExchange> {
        let mut state = self.lock()?;
        match state.tokens.refresh.get(token_hash) {
            None => return Ok(RefreshExchange::Inactive),
            Some(t) if t.state == RefreshState::Rotated => {
                return Ok(RefreshExchange::Replayed {
                    grant_id: t.grant_id,
                });
            }
            Some(t) if t.state == RefreshState::Revoked => return Ok(RefreshExchange::Inactive),
            Some(_) => {}
        }

        state.check_batch(&batch)?;
        self.transact(&mut state, Snapshot::Tokens, |state| {
            if rotate {
                if let Some(t) = state.tokens.refresh.get_mut(token_hash) {
                    t.state = RefreshState::Rotated;
                }
            }
            // Before inserting: without rotation the new access token is also
            // minted from this refresh token and must stay valid.
            state.revoke_access_minted_from(token_hash);
            state.apply_batch(batch);
            (RefreshExchange::Exchanged, true)
        })
    }

    async fn revoke_access_token(&self, token_hash: &str) -> Result<Option<AccessToken>> {
        let mut state = self.lock()?;
        self.transact(&mut state, Snapshot::Tokens, |state| {
            match state.tokens.access.get_mut(token_hash) {
                Some(token) => {
                    let before = token.clone();
                    token.revoked = true;
                    (Some(before), true)
                }
                None => (None, false),
            }
        })
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let mut state = self.lock()?;
        self.transact(&mut state, Snapshot::Tokens, |state| {
            let Some(token) = state.tokens.refresh.get_mut(token_hash) else {
                return (None, false);
            };
            let before = token.clone();
            token.state = RefreshState::Revoked;
            let cascaded = state.revoke_access_minted_from(token_hash);
            tracing::debug!("Refresh token revocation cascaded to {} access tokens", cascaded);
            (Some(before), true)
        })
    }

    async fn revoke_grant(&self, grant_id: Uuid) -> Result<usize> {
        let mut state = self.lock()?;
        self.transact(&mut state, Snapshot::Tokens, |state| {
            let mut changed = 0;
            for code in state.codes.values_mut().filter(|c| c.grant_id == grant_id) {
                if code.state != CodeState::Revoked {
                    code.state = CodeState::Revoked;
                    changed += 1;
                }
            }
            for token in state.tokens.access.values_mut().filter(|t| t.grant_id == grant_id) {
                if !token.revoked {
                    token.revoked = true;
                    changed += 1;
                }
            }
            for token in state.tokens.refresh.values_mut().filter(|t| t.grant_id == grant_id) {
                if token.state != RefreshState::Revoked {
                    token.state = RefreshState::Revoked;
                    changed += 1;
                }
            }
            (changed, changed > 0)
        })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.lock()?;
        let removed = self.transact(&mut state, Snapshot::Tokens, |state| {
            let before =
                state.codes.len() + state.tokens.access.len() + state.tokens.refresh.len();

            state.tokens.access.retain(|_, t| t.expires_at > now);
            state.tokens.refresh.retain(|_, t| t.expires_at > now);

            // Exchanged codes are kept while their tokens live so a replay can
            // still be traced back to the grant.
            let live_grants: HashSet<Uuid> = state
                .tokens
                .access
                .values()
                .map(|t| t.grant_id)
                .chain(state.tokens.refresh.values().map(|t| t.grant_id))
                .collect();
            state
                .codes
                .retain(|_, c| c.expires_at > now || live_grants.contains(&c.grant_id));

            let after = state.codes.len() + state.tokens.access.len() + state.tokens.refresh.len();
            let removed = before - after;
            (removed, removed > 0)
        })?;
        if removed > 0 {
            tracing::info!("Cleaned up {} expired codes and tokens", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{Algorithm, ClientType, GrantType};
    use crate::scope::ScopeSet;
    use chrono::Duration;

    fn application(client_id: &str, owner: &str) -> Application {
        Application {
            client_id: client_id.into(),
            name: format!("app {}", client_id),
            secret_hash: None,
            client_type: ClientType::Public,
            authorization_grant_type: GrantType::AuthorizationCode,
            redirect_uris: vec!["http://example.com".into()],
            post_logout_redirect_uris: vec![],
            algorithm: Algorithm::None,
            owner: owner.into(),
            allowed_scopes: ScopeSet::new(),
            metadata: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn access(hash: &str, grant_id: Uuid, refresh: Option<&str>) -> AccessToken {
        AccessToken {
            token_hash: hash.into(),
            client_id: "client".into(),
            owner_id: Some("owner".into()),
            scopes: ScopeSet::parse("read"),
            grant_id,
            refresh_token_hash: refresh.map(str::to_string),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
            revoked: false,
        }
    }

    fn refresh(hash: &str, grant_id: Uuid, access: &str) -> RefreshToken {
        RefreshToken {
            token_hash: hash.into(),
            client_id: "client".into(),
            owner_id: Some("owner".into()),
            scopes: ScopeSet::parse("read"),
            grant_id,
            access_token_hash: access.into(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(1),
            state: RefreshState::Active,
        }
    }

    fn code(hash: &str, grant_id: Uuid) -> AuthorizationCode {
        AuthorizationCode {
            code_hash: hash.into(),
            client_id: "client".into(),
            owner_id: "owner".into(),
            scopes: ScopeSet::parse("read"),
            redirect_uri: "http://example.com".into(),
            redirect_uri_explicit: true,
            code_challenge: None,
            nonce: None,
            grant_id,
            auth_time: Utc::now(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(1),
            state: CodeState::Issued,
        }
    }

    #[tokio::test]
    async fn test_duplicate_client_id_conflicts() {
        let store = Storage::in_memory();
        store.insert_application(application("a", "foo")).await.unwrap();
        let err = store.insert_application(application("a", "bar")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let store = Storage::in_memory();
        store.insert_application(application("a", "foo")).await.unwrap();
        store.insert_application(application("b", "foo")).await.unwrap();
        store.insert_application(application("c", "bar")).await.unwrap();
        assert_eq!(store.list_applications("foo").await.unwrap().len(), 2);
        assert_eq!(store.list_applications("bar").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_rebinds_tokens() {
        let store = Storage::in_memory();
        store.insert_application(application("client", "foo")).await.unwrap();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                access: Some(access("at", grant, None)),
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .replace_application("client", application("renamed", "foo"))
            .await
            .unwrap();
        assert!(store.get_application("client").await.unwrap().is_none());
        let token = store.get_access_token("at").await.unwrap().unwrap();
        assert_eq!(token.client_id, "renamed");
    }

    #[tokio::test]
    async fn test_redeem_is_single_use() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                code: Some(code("c1", grant)),
                ..Default::default()
            })
            .await
            .unwrap();

        let first = store
            .redeem_code(
                "c1",
                TokenBatch {
                    access: Some(access("at1", grant, None)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(first, Redemption::Redeemed));

        let second = store
            .redeem_code(
                "c1",
                TokenBatch {
                    access: Some(access("at2", grant, None)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(second, Redemption::AlreadyConsumed { grant_id } if grant_id == grant));
        assert!(store.get_access_token("at2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conflicting_batch_writes_nothing() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                refresh: Some(refresh("rt", grant, "at0")),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store
            .commit(TokenBatch {
                access: Some(access("at1", grant, Some("rt"))),
                refresh: Some(refresh("rt", grant, "at1")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_access_token("at1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_revocation_cascades_but_access_revocation_does_not() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                access: Some(access("at", grant, Some("rt"))),
                refresh: Some(refresh("rt", grant, "at")),
                ..Default::default()
            })
            .await
            .unwrap();

        store.revoke_access_token("at").await.unwrap();
        let rt = store.get_refresh_token("rt").await.unwrap().unwrap();
        assert_eq!(rt.state, RefreshState::Active);

        store
            .commit(TokenBatch {
                access: Some(access("at2", grant, Some("rt"))),
                ..Default::default()
            })
            .await
            .unwrap();
        store.revoke_refresh_token("rt").await.unwrap();
        assert!(store.get_access_token("at2").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_exchange_without_rotation_keeps_new_access_valid() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                access: Some(access("at1", grant, Some("rt"))),
                refresh: Some(refresh("rt", grant, "at1")),
                ..Default::default()
            })
            .await
            .unwrap();

        let outcome = store
            .exchange_refresh_token(
                "rt",
                false,
                TokenBatch {
                    access: Some(access("at2", grant, Some("rt"))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RefreshExchange::Exchanged));
        assert!(store.get_access_token("at1").await.unwrap().unwrap().revoked);
        assert!(!store.get_access_token("at2").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_rotated_token_reports_replay() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                access: Some(access("at1", grant, Some("rt1"))),
                refresh: Some(refresh("rt1", grant, "at1")),
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .exchange_refresh_token(
                "rt1",
                true,
                TokenBatch {
                    access: Some(access("at2", grant, Some("rt2"))),
                    refresh: Some(refresh("rt2", grant, "at2")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let replay = store
            .exchange_refresh_token("rt1", true, TokenBatch::default())
            .await
            .unwrap();
        assert!(matches!(replay, RefreshExchange::Replayed { grant_id } if grant_id == grant));
    }

    #[tokio::test]
    async fn test_revoke_grant_hits_whole_lineage() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .commit(TokenBatch {
                code: Some(code("c", grant)),
                access: Some(access("at", grant, Some("rt"))),
                refresh: Some(refresh("rt", grant, "at")),
            })
            .await
            .unwrap();
        store
            .commit(TokenBatch {
                access: Some(access("other", other, None)),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.revoke_grant(grant).await.unwrap(), 3);
        assert!(store.get_access_token("at").await.unwrap().unwrap().revoked);
        assert!(!store.get_access_token("other").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_purge_keeps_exchanged_code_with_live_tokens() {
        let store = Storage::in_memory();
        let grant = Uuid::new_v4();
        let mut expired_code = code("c", grant);
        expired_code.expires_at = Utc::now() - Duration::minutes(1);
        store
            .commit(TokenBatch {
                code: Some(expired_code),
                access: Some(access("at", grant, None)),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 0);
        assert_eq!(
            store.purge_expired(Utc::now() + Duration::hours(2)).await.unwrap(),
            2
        );
    }

    /// Replace `tokens.json` with a directory so the next snapshot write fails
    fn block_token_snapshot(dir: &Path) {
        let path = dir.join("tokens.json");
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        std::fs::create_dir(&path).unwrap();
    }

    fn unblock_token_snapshot(dir: &Path) {
        std::fs::remove_dir(dir.join("tokens.json")).unwrap();
    }

    #[tokio::test]
    async fn test_failed_snapshot_leaves_code_redeemable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path()).unwrap();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                code: Some(code("c", grant)),
                ..Default::default()
            })
            .await
            .unwrap();

        block_token_snapshot(dir.path());
        let batch = || TokenBatch {
            access: Some(access("at", grant, Some("rt"))),
            refresh: Some(refresh("rt", grant, "at")),
            ..Default::default()
        };
        let err = store.redeem_code("c", batch()).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.get_code("c").await.unwrap().unwrap().state, CodeState::Issued);
        assert!(store.get_access_token("at").await.unwrap().is_none());
        assert!(store.get_refresh_token("rt").await.unwrap().is_none());

        unblock_token_snapshot(dir.path());
        let retried = store.redeem_code("c", batch()).await.unwrap();
        assert!(matches!(retried, Redemption::Redeemed));
        assert!(store.get_access_token("at").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_snapshot_leaves_no_orphan_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path()).unwrap();
        let grant = Uuid::new_v4();
        store
            .commit(TokenBatch {
                access: Some(access("at1", grant, Some("rt1"))),
                refresh: Some(refresh("rt1", grant, "at1")),
                ..Default::default()
            })
            .await
            .unwrap();

        block_token_snapshot(dir.path());
        assert!(store
            .commit(TokenBatch {
                access: Some(access("orphan", Uuid::new_v4(), None)),
                ..Default::default()
            })
            .await
            .is_err());
        assert!(store.get_access_token("orphan").await.unwrap().is_none());

        assert!(store
            .exchange_refresh_token(
                "rt1",
                true,
                TokenBatch {
                    access: Some(access("at2", grant, Some("rt2"))),
                    refresh: Some(refresh("rt2", grant, "at2")),
                    ..Default::default()
                },
            )
            .await
            .is_err());
        let rt1 = store.get_refresh_token("rt1").await.unwrap().unwrap();
        assert_eq!(rt1.state, RefreshState::Active);
        assert!(!store.get_access_token("at1").await.unwrap().unwrap().revoked);
        assert!(store.get_refresh_token("rt2").await.unwrap().is_none());

        assert!(store.revoke_grant(grant).await.is_err());
        assert!(!store.get_access_token("at1").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Storage::open(dir.path()).unwrap();
            store.insert_application(application("a", "foo")).await.unwrap();
            store
                .commit(TokenBatch {
                    access: Some(access("at", Uuid::new_v4(), None)),
                    code: Some(code("c", Uuid::new_v4())),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let store = Storage::open(dir.path()).unwrap();
        assert!(store.get_application("a").await.unwrap().is_some());
        assert!(store.get_access_token("at").await.unwrap().is_some());
        // Codes are memory-only
        assert!(store.get_code("c").await.unwrap().is_none());
    }
}
