use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::ShopError;

impl ShopError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShopError::Validation(_) | ShopError::PaymentNotCompleted => StatusCode::BAD_REQUEST,
            ShopError::Unauthorized => StatusCode::UNAUTHORIZED,
            ShopError::ProductNotFound(_) | ShopError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            ShopError::InsufficientStock { .. } | ShopError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ShopError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            ShopError::Configuration(_) | ShopError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ShopError::Storage(detail) => {
                error!(error = %detail, "storage failure");
                "Internal server error".to_string()
            }
            ShopError::Configuration(_) | ShopError::PaymentProvider(_) => {
                warn!(error = %self, "request failed");
                self.to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ShopError {
    fn from(rejection: JsonRejection) -> Self {
        ShopError::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for ShopError {
    fn from(e: MultipartError) -> Self {
        ShopError::Validation(e.body_text())
    }
}
