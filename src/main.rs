//! OpenSASE Storefront - single-tenant shop with card and cash settlement

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_storefront::auth::SessionSigner;
use opensase_storefront::broker::EventBroker;
use opensase_storefront::config::AppConfig;
use opensase_storefront::http::{router, AppState};
use opensase_storefront::payments::stripe::StripeGateway;
use opensase_storefront::seed::seed_products;
use opensase_storefront::services::SettingsService;
use opensase_storefront::store::{FileStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.db_max_connections).await.context("connecting to PostgreSQL")?;
            pg.migrate().await.context("running migrations")?;
            Arc::new(pg)
        }
        None => Arc::new(FileStore::open(&config.data_dir).await.context("opening data directory")?),
    };
    if let Some(path) = &config.seed_products {
        seed_products(store.as_ref(), path).await.with_context(|| format!("seeding from {}", path.display()))?;
    }

    let broker = EventBroker::connect(config.nats_url.as_deref()).await;
    let gateway = Arc::new(StripeGateway::new(config.stripe_api_base.clone(), config.provider_timeout)?);
    let signer = match &config.session_secret {
        Some(secret) => SessionSigner::new(secret.as_bytes().to_vec()),
        None => {
            tracing::warn!("SESSION_SECRET not set, admin sessions will not survive a restart");
            SessionSigner::random()
        }
    };
    let settings = SettingsService::new(store.clone());
    let app = router(AppState::new(store, settings, gateway, broker, signer, &config));

    tracing::info!("🚀 OpenSASE Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
