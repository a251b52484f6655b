//! Configuration loading and management

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use grant_engine::{EngineConfig, OwnerRecord, StaticKeySource};
use serde::{Deserialize, Serialize};

/// Main configuration for the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Grant and token policy
    #[serde(default)]
    pub engine: EngineConfig,

    /// Resource owners known to this server
    #[serde(default)]
    pub owners: Vec<OwnerRecord>,

    /// ID token signing material
    #[serde(default)]
    pub signing: SigningConfig,

    /// Header carrying the resource owner id, set by the fronting proxy
    /// after it authenticated the user
    #[serde(default = "default_owner_header")]
    pub owner_header: String,

    /// How often expired codes and tokens are purged, in seconds
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// PEM file with the RS256 private key, relative to the config directory
    #[serde(default)]
    pub rsa_private_key_path: Option<String>,

    /// `kid` header for RS256 ID tokens
    #[serde(default)]
    pub rsa_key_id: Option<String>,

    /// HS256 keys per client_id, used when the client secret is not part of
    /// the request (implicit and hybrid responses)
    #[serde(default)]
    pub hmac_secrets: BTreeMap<String, String>,
}

fn default_owner_header() -> String {
    "x-auth-owner".to_string()
}

fn default_purge_interval() -> u64 {
    300 // 5 minutes
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            owners: Vec::new(),
            signing: SigningConfig::default(),
            owner_header: default_owner_header(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            config
                .engine
                .validate()
                .with_context(|| format!("Invalid engine settings in {:?}", config_file))?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            let config = Config::default();

            // Create config directory if it doesn't exist
            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    /// Build the signing key source, reading the RSA key from disk
    pub fn key_source(&self, config_path: &str) -> Result<StaticKeySource> {
        let mut keys = StaticKeySource::new();

        if let Some(path) = &self.signing.rsa_private_key_path {
            let key_file = Path::new(config_path).join(path);
            let pem = std::fs::read(&key_file)
                .with_context(|| format!("Failed to read RSA private key: {:?}", key_file))?;
            keys = keys.with_rsa_pem(pem, self.signing.rsa_key_id.clone());
            tracing::info!("Loaded RS256 signing key from {:?}", key_file);
        }

        for (client_id, secret) in &self.signing.hmac_secrets {
            keys = keys.with_hmac_secret(client_id.clone(), secret.clone().into_bytes());
        }

        Ok(keys)
    }
}
