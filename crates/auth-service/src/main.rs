//! OAuth 2.0 / OpenID Connect authorization server
//!
//! Provides:
//! - RFC 8414 metadata and OpenID Connect discovery
//! - Client registration and owner-scoped application management
//! - Authorization code (with PKCE), implicit, hybrid, password and
//!   client-credentials grants, plus refresh
//! - RFC 7009 revocation and RFC 7662 introspection
//! - forward_auth bearer token validation

mod app;
mod config;
mod oauth;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use grant_engine::{GrantEngine, StaticOwnerDirectory, Storage};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::app::AppState;
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "auth-service")]
#[command(about = "OAuth 2.0 / OpenID Connect authorization server")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 3001, env = "AUTH_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "AUTH_BIND")]
    bind: String,

    /// Path to config directory
    #[arg(long, default_value = "/config", env = "AUTH_CONFIG_PATH")]
    config_path: String,

    /// Public URL for this service (issuer and metadata endpoints)
    #[arg(long, env = "AUTH_PUBLIC_URL")]
    public_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=info,grant_engine=info,audit=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let public_url = cli.public_url.trim_end_matches('/').to_string();

    // Load configuration
    let mut config = Config::load(&cli.config_path)?;
    config.engine.issuer = public_url.clone();
    let keys = config.key_source(&cli.config_path)?;
    let storage = Storage::open(&cli.config_path)
        .with_context(|| format!("Failed to open storage in {}", cli.config_path))?;
    let owners = StaticOwnerDirectory::new(config.owners.clone());

    let engine = GrantEngine::new(
        config.engine.clone(),
        Arc::new(storage),
        Arc::new(owners),
        Arc::new(keys),
    );

    // Audit trail
    let _audit = engine.events().subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => tracing::info!(target: "audit", "{}", json),
        Err(e) => tracing::error!(target: "audit", "Failed to serialize audit event: {}", e),
    });

    let state = Arc::new(AppState {
        engine,
        owner_header: config.owner_header.to_ascii_lowercase(),
        public_url: public_url.clone(),
    });

    // Periodic cleanup of expired codes and tokens
    let purge_state = state.clone();
    let purge_interval = Duration::from_secs(config.purge_interval_secs.max(1));
    let purge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        loop {
            interval.tick().await;
            if let Err(e) = purge_state.engine.purge_expired().await {
                tracing::error!("Failed to purge expired tokens: {}", e);
            }
        }
    });

    let app = app::router(state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port)
        .parse()
        .context("Invalid bind address")?;

    tracing::info!("Starting auth-service on {}", addr);
    tracing::info!("Public URL: {}", public_url);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    tracing::info!("Auth service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
