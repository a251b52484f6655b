//! Registered client applications.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::scope::ScopeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Can hold a secret; must authenticate with it.
    Confidential,
    /// Cannot hold a secret (native/browser apps); relies on PKCE.
    Public,
}

/// The single grant type an application is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantType {
    AuthorizationCode,
    Implicit,
    Password,
    ClientCredentials,
    #[serde(rename = "openid-hybrid")]
    OpenIdHybrid,
}

impl GrantType {
    /// Grant types driven through the authorization endpoint need redirect URIs.
    pub fn uses_authorization_endpoint(&self) -> bool {
        matches!(
            self,
            GrantType::AuthorizationCode | GrantType::Implicit | GrantType::OpenIdHybrid
        )
    }

    /// Grant types whose token responses carry a refresh token.
    pub fn issues_refresh_tokens(&self) -> bool {
        matches!(
            self,
            GrantType::AuthorizationCode | GrantType::Password | GrantType::OpenIdHybrid
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization-code",
            GrantType::Implicit => "implicit",
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client-credentials",
            GrantType::OpenIdHybrid => "openid-hybrid",
        }
    }
}

impl Display for GrantType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ID token signing algorithm, chosen per application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// No signature. Only usable when unsigned ID tokens are enabled.
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "HS256")]
    Hs256,
    #[serde(rename = "RS256")]
    Rs256,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::None => "none",
            Algorithm::Hs256 => "HS256",
            Algorithm::Rs256 => "RS256",
        }
    }
}

impl FromStr for Algorithm {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Algorithm::None),
            "HS256" => Ok(Algorithm::Hs256),
            "RS256" => Ok(Algorithm::Rs256),
            other => Err(RegistryError::InvalidMetadata(format!(
                "unsupported algorithm: {}",
                other
            ))),
        }
    }
}

/// A registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub client_id: String,
    pub name: String,
    /// Argon2 PHC string; present iff the client is confidential
    pub secret_hash: Option<String>,
    pub client_type: ClientType,
    pub authorization_grant_type: GrantType,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Resource owner that registered this application
    pub owner: String,
    /// Empty means every configured scope
    #[serde(default)]
    pub allowed_scopes: ScopeSet,
    /// Extra fields required by the configured application model
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    /// Exact string comparison; no prefix matching and no normalization.
    pub fn is_registered_redirect(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// The redirect URI to use when a request omits one.
    pub fn default_redirect_uri(&self) -> Option<&str> {
        match self.redirect_uris.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// The scopes this application may be granted.
    pub fn permitted_scopes(&self, configured: &BTreeMap<String, String>) -> ScopeSet {
        if self.allowed_scopes.is_empty() {
            configured.keys().cloned().collect()
        } else {
            self.allowed_scopes.clone()
        }
    }
}

/// Which application record shape a deployment uses.
///
/// Every variant shares the [`Application`] accessor contract; extended
/// models additionally require named entries in `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplicationModel {
    #[default]
    Standard,
    Extended {
        required_metadata: Vec<String>,
    },
}

impl ApplicationModel {
    pub fn check(&self, application: &Application) -> Result<(), RegistryError> {
        match self {
            ApplicationModel::Standard => Ok(()),
            ApplicationModel::Extended { required_metadata } => {
                for field in required_metadata {
                    let present = application
                        .metadata
                        .get(field)
                        .is_some_and(|v| !v.trim().is_empty());
                    if !present {
                        return Err(RegistryError::InvalidMetadata(format!(
                            "missing required field: {}",
                            field
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApplication {
    /// Generated when absent
    #[serde(default)]
    pub client_id: Option<String>,
    pub name: String,
    /// Generated for confidential clients when absent
    #[serde(default)]
    pub client_secret: Option<String>,
    pub client_type: ClientType,
    pub authorization_grant_type: GrantType,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub allowed_scopes: ScopeSet,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationPatch {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_type: Option<ClientType>,
    #[serde(default)]
    pub authorization_grant_type: Option<GrantType>,
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub post_logout_redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    #[serde(default)]
    pub allowed_scopes: Option<ScopeSet>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(redirect_uris: &[&str]) -> Application {
        Application {
            client_id: "client_id".into(),
            name: "Foo app".into(),
            secret_hash: None,
            client_type: ClientType::Public,
            authorization_grant_type: GrantType::AuthorizationCode,
            redirect_uris: redirect_uris.iter().map(|s| s.to_string()).collect(),
            post_logout_redirect_uris: vec![],
            algorithm: Algorithm::None,
            owner: "foo_user".into(),
            allowed_scopes: ScopeSet::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_redirect_match_is_exact() {
        let app = app(&["http://example.com"]);
        assert!(app.is_registered_redirect("http://example.com"));
        assert!(!app.is_registered_redirect("http://example.com/"));
        assert!(!app.is_registered_redirect("http://example.com/callback"));
    }

    #[test]
    fn test_default_redirect_only_when_unambiguous() {
        assert_eq!(app(&["http://a.com"]).default_redirect_uri(), Some("http://a.com"));
        assert_eq!(app(&["http://a.com", "http://b.com"]).default_redirect_uri(), None);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&GrantType::OpenIdHybrid).unwrap(),
            r#""openid-hybrid""#
        );
        assert_eq!(
            serde_json::to_string(&GrantType::AuthorizationCode).unwrap(),
            r#""authorization-code""#
        );
        assert_eq!(serde_json::to_string(&Algorithm::None).unwrap(), r#""""#);
        assert_eq!("RS256".parse::<Algorithm>().unwrap(), Algorithm::Rs256);
        assert!("ES256".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_extended_model_requires_metadata() {
        let model = ApplicationModel::Extended {
            required_metadata: vec!["custom_field".into()],
        };
        let mut app = app(&["http://example.com"]);
        assert!(model.check(&app).is_err());
        app.metadata.insert("custom_field".into(), "value".into());
        assert!(model.check(&app).is_ok());
        assert!(ApplicationModel::Standard.check(&app).is_ok());
    }
}
