mod alerts;
mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod scorer;
mod stats;
mod store;
mod types;

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::ListingClient;
use crate::store::TrackingStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", cfg.db_path))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let store = TrackingStore::new(pool);

    // --- Listing client (optional: tracking works without credentials) ---
    let listings = match cfg.app_id.clone() {
        Some(app_id) => {
            info!("eBay listing client configured");
            Some(Arc::new(ListingClient::new(&cfg, app_id)?))
        }
        None => {
            warn!(
                "EBAY_APP_ID not set: remote search, item details and deal finding \
                 are disabled. Local price tracking remains available."
            );
            None
        }
    };

    // --- HTTP API server ---
    let state = ApiState { store, listings };
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
