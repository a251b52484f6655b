//! Application Registry
//!
//! Owns registration and owner-scoped management of client applications.
//! Visibility is a filter applied here, so every transport gets the same
//! rule: owners see and change only their own applications, administrators
//! see everything, and anyone else gets `NotFound`.

use std::collections::HashSet;
use std::sync::Arc;

use url::Url;

use crate::application::{
    Algorithm, Application, ApplicationPatch, ClientType, NewApplication,
};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{RegistryError, StoreError};
use crate::events::{AuditEvent, EventBus};
use crate::owner::ResourceOwner;
use crate::secret::{generate_random_string, hash_secret};
use crate::store::Store;

/// A created or updated application, with the plaintext secret when one was
/// just set. The secret is not retrievable afterwards.
#[derive(Debug, Clone)]
pub struct Registration {
    pub application: Application,
    pub client_secret: Option<String>,
}

pub struct Registry {
    store: Arc<dyn Store>,
    config: Arc<EngineConfig>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<EngineConfig>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            events,
            clock,
        }
    }

    /// Unscoped lookup used by the grant flows.
    pub async fn lookup(&self, client_id: &str) -> Result<Application, RegistryError> {
        self.store
            .get_application(client_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(client_id.to_string()))
    }

    pub async fn create(
        &self,
        owner: &ResourceOwner,
        request: NewApplication,
    ) -> Result<Registration, RegistryError> {
        let client_id = match request.client_id {
            Some(id) => id,
            None => format!("client_{}", generate_random_string(24)),
        };

        let client_secret = match request.client_type {
            ClientType::Confidential => Some(
                request.client_secret
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| generate_random_string(48)),
            ),
            ClientType::Public => {
                if request.client_secret.as_deref().is_some_and(|s| !s.is_empty()) {
                    return Err(RegistryError::UnexpectedSecret);
                }
                None
            }
        };

        let now = self.clock.now();
        let application = Application {
            client_id,
            name: request.name,
            secret_hash: client_secret.as_deref().map(hash).transpose()?,
            client_type: request.client_type,
            authorization_grant_type: request.authorization_grant_type,
            redirect_uris: dedupe(request.redirect_uris),
            post_logout_redirect_uris: dedupe(request.post_logout_redirect_uris),
            algorithm: request.algorithm,
            owner: owner.id.clone(),
            allowed_scopes: request.allowed_scopes,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };
        self.validate(&application)?;

        self.store
            .insert_application(application.clone())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(id) => RegistryError::DuplicateClientId(id),
                other => other.into(),
            })?;

        tracing::info!(
            "Registered application {} ({:?}) for owner {}",
            application.client_id,
            application.name,
            owner.id
        );
        self.events.emit(AuditEvent::ApplicationRegistered {
            client_id: application.client_id.clone(),
            owner: owner.id.clone(),
        });

        Ok(Registration {
            application,
            client_secret,
        })
    }

    /// Applications registered by `owner`
    pub async fn list(&self, owner: &ResourceOwner) -> Result<Vec<Application>, RegistryError> {
        Ok(self.store.list_applications(&owner.id).await?)
    }

    /// Owner-scoped lookup.
    pub async fn get(
        &self,
        viewer: &ResourceOwner,
        client_id: &str,
    ) -> Result<Application, RegistryError> {
        let application = self.lookup(client_id).await?;
        if application.owner == viewer.id || viewer.is_admin {
            Ok(application)
        } else {
            tracing::debug!(
                "Owner {} asked for application {} it does not own",
                viewer.id,
                client_id
            );
            Err(RegistryError::NotFound(client_id.to_string()))
        }
    }

    pub async fn update(
        &self,
        actor: &ResourceOwner,
        client_id: &str,
        patch: ApplicationPatch,
    ) -> Result<Registration, RegistryError> {
        let current = self.get(actor, client_id).await?;
        let mut updated = current.clone();

        if let Some(id) = patch.client_id {
            updated.client_id = id;
        }
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(uris) = patch.redirect_uris {
            updated.redirect_uris = dedupe(uris);
        }
        if let Some(uris) = patch.post_logout_redirect_uris {
            updated.post_logout_redirect_uris = dedupe(uris);
        }
        if let Some(grant_type) = patch.authorization_grant_type {
            updated.authorization_grant_type = grant_type;
        }
        if let Some(algorithm) = patch.algorithm {
            updated.algorithm = algorithm;
        }
        if let Some(scopes) = patch.allowed_scopes {
            updated.allowed_scopes = scopes;
        }
        if let Some(metadata) = patch.metadata {
            updated.metadata = metadata;
        }
        if let Some(client_type) = patch.client_type {
            updated.client_type = client_type;
        }

        let new_secret = patch.client_secret.filter(|s| !s.is_empty());
        let client_secret = match updated.client_type {
            ClientType::Confidential => match (new_secret, &current.secret_hash) {
                (Some(secret), _) => Some(secret),
                (None, None) => Some(generate_random_string(48)),
                (None, Some(_)) => None,
            },
            ClientType::Public => {
                if new_secret.is_some() {
                    return Err(RegistryError::UnexpectedSecret);
                }
                updated.secret_hash = None;
                None
            }
        };
        if let Some(secret) = &client_secret {
            updated.secret_hash = Some(hash(secret)?);
        }

        updated.updated_at = self.clock.now();
        self.validate(&updated)?;

        self.store
            .replace_application(client_id, updated.clone())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(id) => RegistryError::DuplicateClientId(id),
                StoreError::NotFound(id) => RegistryError::NotFound(id),
                other => other.into(),
            })?;

        tracing::info!("Updated application {} (was {})", updated.client_id, client_id);
        self.events.emit(AuditEvent::ApplicationUpdated {
            client_id: updated.client_id.clone(),
            actor: actor.id.clone(),
        });

        Ok(Registration {
            application: updated,
            client_secret,
        })
    }

    /// Delete an application together with its outstanding codes and tokens.
    pub async fn delete(&self, actor: &ResourceOwner, client_id: &str) -> Result<(), RegistryError> {
        self.get(actor, client_id).await?;
        if !self.store.remove_application(client_id).await? {
            return Err(RegistryError::NotFound(client_id.to_string()));
        }
        tracing::info!("Deleted application {}", client_id);
        self.events.emit(AuditEvent::ApplicationDeleted {
            client_id: client_id.to_string(),
            actor: actor.id.clone(),
        });
        Ok(())
    }

    fn validate(&self, application: &Application) -> Result<(), RegistryError> {
        if application.client_id.is_empty()
            || application.client_id.chars().any(char::is_whitespace)
        {
            return Err(RegistryError::InvalidMetadata(
                "client_id must be non-empty and contain no whitespace".to_string(),
            ));
        }

        match (application.client_type, &application.secret_hash) {
            (ClientType::Confidential, None) => {
                return Err(RegistryError::InvalidMetadata(
                    "confidential clients require a secret".to_string(),
                ));
            }
            (ClientType::Public, Some(_)) => return Err(RegistryError::UnexpectedSecret),
            _ => {}
        }

        for uri in application
            .redirect_uris
            .iter()
            .chain(&application.post_logout_redirect_uris)
        {
            self.check_redirect_uri(uri)?;
        }

        if application.authorization_grant_type.uses_authorization_endpoint()
            && application.redirect_uris.is_empty()
        {
            return Err(RegistryError::InvalidRedirectUri(format!(
                "grant type {} requires at least one redirect URI",
                application.authorization_grant_type
            )));
        }

        if application.algorithm == Algorithm::Hs256
            && application.client_type == ClientType::Public
        {
            return Err(RegistryError::InvalidMetadata(
                "HS256 needs a client secret; public clients must use RS256".to_string(),
            ));
        }

        let unknown: Vec<&str> = application
            .allowed_scopes
            .iter()
            .filter(|s| !self.config.scopes.contains_key(*s))
            .collect();
        if !unknown.is_empty() {
            return Err(RegistryError::InvalidMetadata(format!(
                "unknown scopes: {}",
                unknown.join(" ")
            )));
        }

        self.config.application_model.check(application)
    }

    /// Absolute, allowed scheme, no fragment.
    fn check_redirect_uri(&self, uri: &str) -> Result<(), RegistryError> {
        let parsed = Url::parse(uri)
            .map_err(|e| RegistryError::InvalidRedirectUri(format!("{}: {}", uri, e)))?;

        if !self
            .config
            .allowed_redirect_uri_schemes
            .iter()
            .any(|s| s == parsed.scheme())
        {
            return Err(RegistryError::InvalidRedirectUri(format!(
                "{}: scheme {} is not allowed",
                uri,
                parsed.scheme()
            )));
        }
        if parsed.fragment().is_some() {
            return Err(RegistryError::InvalidRedirectUri(format!(
                "{}: fragments are not allowed",
                uri
            )));
        }
        Ok(())
    }
}

fn hash(secret: &str) -> Result<String, RegistryError> {
    hash_secret(secret).map_err(|e| RegistryError::Hashing(e.to_string()))
}

/// Keep first occurrence order.
fn dedupe(uris: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    uris.into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect()
}
