//! Storefront routes: anyone may call these.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::aggregates::{CartItem, Product};
use crate::domain::value_objects::Price;
use crate::services::{CardSettlement, CheckoutRedirect};
use crate::settings::PublicConfig;
use crate::{Result, ShopError};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub success: bool,
    pub order_id: Option<String>,
    pub already_processed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CashRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub total: Option<Price>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashResponse {
    pub success: bool,
    pub order_id: String,
}

pub async fn list_products(State(s): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.catalog.list_public().await?))
}

pub async fn create_checkout_session(
    State(s): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutRedirect>> {
    let Json(req) = payload?;
    let origin = request_origin(&s, &headers)?;
    Ok(Json(s.checkout.start(req.items, &origin).await?))
}

pub async fn confirm_order(
    State(s): State<AppState>,
    payload: std::result::Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<ConfirmResponse>> {
    let Json(req) = payload?;
    let outcome = s.settlement.settle_card(req.session_id.trim()).await?;
    Ok(Json(ConfirmResponse {
        success: true,
        order_id: outcome.order_id().map(str::to_string),
        already_processed: matches!(outcome, CardSettlement::AlreadySettled(_)),
    }))
}

pub async fn submit_cash_order(
    State(s): State<AppState>,
    payload: std::result::Result<Json<CashRequest>, JsonRejection>,
) -> Result<Json<CashResponse>> {
    let Json(req) = payload?;
    let order = s.settlement.settle_cash(req.items, req.total).await?;
    Ok(Json(CashResponse { success: true, order_id: order.id }))
}

pub async fn payment_config(State(s): State<AppState>) -> Json<PublicConfig> {
    Json(s.settings.public_config().await)
}

/// Configured base URL first, then the browser's `Origin`, then `Host`.
fn request_origin(s: &AppState, headers: &HeaderMap) -> Result<String> {
    if let Some(base) = &s.public_base_url {
        return Ok(base.clone());
    }
    let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());
    if let Some(origin) = header_str(header::ORIGIN).filter(|o| *o != "null") {
        return Ok(origin.to_string());
    }
    header_str(header::HOST)
        .map(|host| format!("http://{host}"))
        .ok_or_else(|| ShopError::Validation("Cannot determine request origin".to_string()))
}
