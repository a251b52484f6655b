//! Engine policy configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::application::ApplicationModel;
use crate::error::ConfigError;

/// Longest accepted lifetime for any code or token: ten years.
pub const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

/// Policy knobs for the grant engine.
///
/// Every field has a serde default so a partial `config.json` section is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Issuer identifier placed in ID tokens and metadata
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Access token lifetime in seconds (default: 1 hour)
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,

    /// Refresh token lifetime in seconds (default: 30 days)
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime_secs: u64,

    /// Authorization code lifetime in seconds (default: 60 seconds)
    #[serde(default = "default_code_lifetime")]
    pub authorization_code_lifetime_secs: u64,

    /// ID token lifetime in seconds (default: 10 hours)
    #[serde(default = "default_id_token_lifetime")]
    pub id_token_lifetime_secs: u64,

    /// Issue a new refresh token on every refresh and retire the presented one
    #[serde(default = "default_true")]
    pub rotate_refresh_tokens: bool,

    /// Presenting a rotated refresh token revokes every token of its grant
    #[serde(default = "default_true")]
    pub refresh_reuse_revokes_family: bool,

    /// Revoking an access token also revokes the refresh token it was issued with
    #[serde(default)]
    pub revoke_refresh_with_access: bool,

    /// Allow implicit and hybrid response types for public clients
    #[serde(default)]
    pub allow_public_implicit: bool,

    /// Allow `alg: none` ID tokens. Never enable in production.
    #[serde(default)]
    pub allow_unsigned_id_tokens: bool,

    /// Public clients must send a PKCE code_challenge
    #[serde(default = "default_true")]
    pub require_pkce_for_public: bool,

    /// URI schemes accepted for redirect URIs at registration
    #[serde(default = "default_redirect_schemes")]
    pub allowed_redirect_uri_schemes: Vec<String>,

    /// Scopes this server knows about, with a human-readable description
    #[serde(default = "default_scopes")]
    pub scopes: BTreeMap<String, String>,

    /// Application record variant, resolved once at start-up
    #[serde(default)]
    pub application_model: ApplicationModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            access_token_lifetime_secs: default_access_token_lifetime(),
            refresh_token_lifetime_secs: default_refresh_token_lifetime(),
            authorization_code_lifetime_secs: default_code_lifetime(),
            id_token_lifetime_secs: default_id_token_lifetime(),
            rotate_refresh_tokens: true,
            refresh_reuse_revokes_family: true,
            revoke_refresh_with_access: false,
            allow_public_implicit: false,
            allow_unsigned_id_tokens: false,
            require_pkce_for_public: true,
            allowed_redirect_uri_schemes: default_redirect_schemes(),
            scopes: default_scopes(),
            application_model: ApplicationModel::default(),
        }
    }
}

impl EngineConfig {
    /// Reject lifetimes that are zero or too large to add to a timestamp.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lifetimes = [
            ("access_token_lifetime_secs", self.access_token_lifetime_secs),
            ("refresh_token_lifetime_secs", self.refresh_token_lifetime_secs),
            ("authorization_code_lifetime_secs", self.authorization_code_lifetime_secs),
            ("id_token_lifetime_secs", self.id_token_lifetime_secs),
        ];
        for (field, value) in lifetimes {
            if value == 0 || value > MAX_LIFETIME_SECS {
                return Err(ConfigError::LifetimeOutOfRange {
                    field,
                    value,
                    max: MAX_LIFETIME_SECS,
                });
            }
        }
        Ok(())
    }
}

fn default_issuer() -> String {
    "http://localhost:3001".to_string()
}

fn default_true() -> bool {
    true
}

fn default_access_token_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_refresh_token_lifetime() -> u64 {
    30 * 24 * 3600 // 30 days
}

fn default_code_lifetime() -> u64 {
    60
}

fn default_id_token_lifetime() -> u64 {
    36000
}

fn default_redirect_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_scopes() -> BTreeMap<String, String> {
    let mut scopes = BTreeMap::new();
    scopes.insert("read".to_string(), "Reading scope".to_string());
    scopes.insert("write".to_string(), "Writing scope".to_string());
    scopes.insert("openid".to_string(), "OpenID Connect scope".to_string());
    scopes.insert(
        "introspection".to_string(),
        "Introspect tokens issued to other clients".to_string(),
    );
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"issuer": "https://auth.example.com", "rotate_refresh_tokens": false}"#)
                .unwrap();
        assert_eq!(config.issuer, "https://auth.example.com");
        assert!(!config.rotate_refresh_tokens);
        assert_eq!(config.access_token_lifetime_secs, 3600);
        assert!(config.scopes.contains_key("read"));
        assert!(!config.revoke_refresh_with_access);
        assert_eq!(config.application_model, ApplicationModel::Standard);
    }

    #[test]
    fn test_default_lifetimes_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_lifetimes_rejected() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"refresh_token_lifetime_secs": 18446744073709551615}"#)
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LifetimeOutOfRange { field: "refresh_token_lifetime_secs", .. })
        ));

        let config = EngineConfig {
            authorization_code_lifetime_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
