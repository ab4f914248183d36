//! HTTP surface: JSON routes for the storefront and the admin panel.

pub mod admin;
pub mod error;
pub mod extract;
pub mod shop;

use axum::{extract::DefaultBodyLimit, routing::{get, post, put}, Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::SessionSigner;
use crate::broker::EventBroker;
use crate::config::AppConfig;
use crate::payments::PaymentGateway;
use crate::services::media::UPLOADS_URL_PREFIX;
use crate::services::{CatalogService, CheckoutService, MediaService, OrderService, SettingsService, SettlementService};
use crate::store::Store;

/// Image uploads are the largest bodies we accept.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub settlement: SettlementService,
    pub orders: OrderService,
    pub settings: SettingsService,
    pub media: MediaService,
    pub signer: SessionSigner,
    pub cookie_secure: bool,
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        settings: SettingsService,
        gateway: Arc<dyn PaymentGateway>,
        broker: EventBroker,
        signer: SessionSigner,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            checkout: CheckoutService::new(settings.clone(), gateway.clone(), config.currency.clone()),
            settlement: SettlementService::new(store.clone(), settings.clone(), gateway, broker.clone()),
            orders: OrderService::new(store, broker),
            settings,
            media: MediaService::new(config.upload_dir.clone()),
            signer,
            cookie_secure: config.cookie_secure,
            public_base_url: config.public_base_url.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.media.upload_dir());
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .route("/api/products", get(shop::list_products))
        .route("/api/checkout_sessions", post(shop::create_checkout_session))
        .route("/api/orders/confirm", post(shop::confirm_order))
        .route("/api/cash", post(shop::submit_cash_order))
        .route("/api/config/payments", get(shop::payment_config))
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/products", get(admin::list_products).post(admin::create_product))
        .route("/api/admin/products/:id", put(admin::replace_product).patch(admin::patch_product).delete(admin::delete_product))
        .route("/api/admin/upload", post(admin::upload_image))
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/:id", put(admin::update_order_status))
        .route("/api/admin/settings", get(admin::get_settings).post(admin::save_settings))
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
