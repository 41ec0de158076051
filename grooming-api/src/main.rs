use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;

use common_auth::{TokenIssuer, TokenVerifier};
use grooming_api::config::load_token_config;
use grooming_api::{build_router, epoch, ApiKeys, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = PgPool::connect(&database_url).await?;

    let token_config = load_token_config()?;
    let api_keys = ApiKeys::from_env()?;

    // Seed the admin epoch row so the admin guard always has something to read.
    epoch::ensure_epoch_row(&db).await?;

    let state = AppState {
        db,
        issuer: Arc::new(TokenIssuer::new(token_config.clone())),
        verifier: Arc::new(TokenVerifier::new(token_config)),
        api_keys,
    };
    let app = build_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8090);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!("starting grooming-api on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
