//! Admin routes. Every handler except login takes an [`AdminSession`].

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::extract::AdminSession;
use super::AppState;
use crate::auth::{clear_session_cookie, session_cookie};
use crate::domain::aggregates::{Order, Product};
use crate::services::{OrdersOverview, ProductInput, ProductPatch, SaveOutcome};
use crate::settings::{MaskedSettings, SettingsUpdate};
use crate::{Result, ShopError};

const READ_ONLY_WARNING: &str = "Settings store is read-only; configure these values through environment variables";

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn login(State(s): State<AppState>, payload: JsonBody<LoginRequest>) -> Result<impl IntoResponse> {
    let Json(req) = payload?;
    let settings = s.settings.effective().await?;
    if !s.signer.secrets_match(&req.password, &settings.admin_password) {
        warn!("admin login rejected");
        return Err(ShopError::Unauthorized);
    }
    info!("admin logged in");
    let cookie = session_cookie(&s.signer.issue(Utc::now()), s.cookie_secure);
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))))
}

pub async fn logout(_admin: AdminSession) -> impl IntoResponse {
    ([(header::SET_COOKIE, clear_session_cookie())], Json(json!({ "success": true })))
}

pub async fn list_products(_admin: AdminSession, State(s): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.catalog.list_all().await?))
}

pub async fn create_product(_admin: AdminSession, State(s): State<AppState>, payload: JsonBody<ProductInput>) -> Result<(StatusCode, Json<Product>)> {
    let Json(input) = payload?;
    Ok((StatusCode::CREATED, Json(s.catalog.create(input).await?)))
}

pub async fn replace_product(_admin: AdminSession, State(s): State<AppState>, Path(id): Path<String>, payload: JsonBody<ProductInput>) -> Result<Json<Product>> {
    let Json(input) = payload?;
    Ok(Json(s.catalog.replace(&id, input).await?))
}

pub async fn patch_product(_admin: AdminSession, State(s): State<AppState>, Path(id): Path<String>, payload: JsonBody<ProductPatch>) -> Result<Json<Product>> {
    let Json(patch) = payload?;
    Ok(Json(s.catalog.patch(&id, patch).await?))
}

pub async fn delete_product(_admin: AdminSession, State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    s.catalog.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Multipart form with a single `file` field.
pub async fn upload_image(_admin: AdminSession, State(s): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        let url = s.media.save_image(&name, &bytes).await?;
        return Ok(Json(json!({ "url": url })));
    }
    Err(ShopError::Validation("No file received".to_string()))
}

pub async fn list_orders(_admin: AdminSession, State(s): State<AppState>) -> Result<Json<OrdersOverview>> {
    Ok(Json(s.orders.overview().await?))
}

pub async fn update_order_status(_admin: AdminSession, State(s): State<AppState>, Path(id): Path<String>, payload: JsonBody<StatusUpdate>) -> Result<Json<Order>> {
    let Json(update) = payload?;
    Ok(Json(s.orders.update_status(&id, update.status.trim()).await?))
}

pub async fn get_settings(_admin: AdminSession, State(s): State<AppState>) -> Result<Json<MaskedSettings>> {
    Ok(Json(s.settings.effective().await?.masked()))
}

pub async fn save_settings(_admin: AdminSession, State(s): State<AppState>, payload: JsonBody<SettingsUpdate>) -> Result<Json<Value>> {
    let Json(update) = payload?;
    Ok(Json(match s.settings.update(update).await? {
        SaveOutcome::Saved => json!({ "success": true }),
        SaveOutcome::ReadOnly => json!({ "success": false, "warning": READ_ONLY_WARNING }),
    }))
}
