use std::sync::Arc;

use anyhow::Context;
use saml_gateway::config::load_gateway_config;
use saml_gateway::groups::PgGroupStore;
use saml_gateway::metrics::GatewayMetrics;
use saml_gateway::saml::SamlAuthenticator;
use saml_gateway::tokens::TokenSigner;
use saml_gateway::{build_router, AppState};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_gateway_config()?;

    let saml = SamlAuthenticator::from_config(&config.saml)
        .context("Failed to initialise SAML service provider")?;

    // Lazy so an unavailable database only affects the contact lookup.
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&config.database_url)
        .context("Invalid DATABASE_URL")?;

    let token_signer = TokenSigner::new(&config.secret, config.token_expiry);
    info!(
        expiry_mode = config.token_expiry.as_str(),
        "Application token signer ready"
    );

    let addr = config.listen_addr;
    let state = AppState {
        groups: Arc::new(PgGroupStore::new(db_pool)),
        saml: Arc::new(saml),
        token_signer: Arc::new(token_signer),
        config: Arc::new(config),
        metrics: Arc::new(GatewayMetrics::new()?),
    };

    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(port = addr.port(), "Listening on port {}", addr.port());
    axum::serve(listener, app).await?;

    Ok(())
}
