use axum::{async_trait, extract::FromRequestParts, http::{header, request::Parts}};
use chrono::Utc;

use super::AppState;
use crate::auth::{cookie_value, SESSION_COOKIE};
use crate::ShopError;

/// Proof that the request carries a valid admin session cookie.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession;

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts.headers.get_all(header::COOKIE).iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookies| cookie_value(cookies, SESSION_COOKIE));
        match token {
            Some(token) if state.signer.verify(token, Utc::now()) => Ok(AdminSession),
            _ => Err(ShopError::Unauthorized),
        }
    }
}
