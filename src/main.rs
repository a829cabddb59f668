//! Process entry point: load config, connect to Postgres, run pending
//! migrations, wire up the collaborators behind [`sbom_trust_center::api::AppState`],
//! and serve the router built by [`sbom_trust_center::api::build_router`].

use std::sync::Arc;

use sbom_trust_center::access::request::PendingCountCache;
use sbom_trust_center::api::{build_router, AppState};
use sbom_trust_center::artifacts::FilesystemObjectStore;
use sbom_trust_center::billing::HttpPaymentsProvider;
use sbom_trust_center::config::Config;
use sbom_trust_center::db;
use sbom_trust_center::events::LoggingBroadcaster;
use sbom_trust_center::host_admission::HostAdmission;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let host_admission = Arc::new(HostAdmission::new(
        pool.clone(),
        config.static_host_allow_list(),
        config.domain_cache_ttl,
        config.region.clone(),
    ));
    let object_store = Arc::new(FilesystemObjectStore::new(std::env::var("OBJECT_STORE_DIR").unwrap_or_else(|_| "./data/objects".to_string())));
    let payments_provider = Arc::new(HttpPaymentsProvider::new(
        std::env::var("PAYMENTS_PROVIDER_BASE_URL").unwrap_or_else(|_| "https://api.payments.example".to_string()),
        std::env::var("PAYMENTS_PROVIDER_API_KEY").unwrap_or_default(),
    ));

    let state = AppState {
        pool,
        config: config.clone(),
        host_admission,
        broadcaster: Arc::new(LoggingBroadcaster),
        object_store,
        payments_provider,
        pending_counts: Arc::new(PendingCountCache::new()),
    };

    let app = build_router(state);

    let address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "trust-center listening");
    axum::serve(listener, app).await?;

    Ok(())
}
