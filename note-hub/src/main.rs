use anyhow::{bail, Result};
use axum::{routing::get, Router};
use clap::Parser;
use note_hub::api;
use note_hub_core::{
    auth::{FirebaseVerifier, Hs256Verifier, TokenVerifier},
    clock::SystemClock,
    config::HubConfig,
    services::Hub,
    store::InMemoryStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "note-hub")]
#[command(about = "Collaborative note backend with per-block edit leases")]
struct Cli {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    addr: String,
}

fn load_verifier() -> Result<Arc<dyn TokenVerifier>> {
    if let Ok(project) = std::env::var("NOTE_HUB_FIREBASE_PROJECT") {
        info!(%project, "verifying Firebase ID tokens");
        return Ok(Arc::new(FirebaseVerifier::new(project)));
    }
    if let Ok(secret) = std::env::var("NOTE_HUB_JWT_SECRET") {
        info!("verifying HS256 tokens");
        return Ok(Arc::new(Hs256Verifier::new(secret)));
    }
    bail!("set NOTE_HUB_FIREBASE_PROJECT or NOTE_HUB_JWT_SECRET")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = HubConfig::from_env()?;
    info!(lock_ttl = ?config.lock_ttl, max_tags = config.max_tags, "configuration loaded");

    let hub = Hub::new(
        Arc::new(InMemoryStore::new()),
        load_verifier()?,
        Arc::new(SystemClock),
        config,
    );
    let app = Router::new()
        .merge(api::router(hub))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&cli.addr).await?;
    info!("Listening on {}", cli.addr);
    axum::serve(listener, app).await?;
    Ok(())
}
