//! OpenSASE Storefront
//!
//! Single-tenant storefront: catalog, cart checkout by card or cash, and an
//! admin surface for products, orders and payment-provider settings.
//!
//! ## Features
//! - Product catalog management
//! - Hosted card checkout sessions
//! - Order settlement with exactly-once stock decrement
//! - Cash orders reconciled by the admin
//! - Environment-overridable payment settings

pub mod auth;
pub mod broker;
pub mod config;
pub mod domain;
pub mod http;
pub mod payments;
pub mod seed;
pub mod services;
pub mod settings;
pub mod store;

use thiserror::Error;

use crate::payments::GatewayError;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("Insufficient stock for {product}")]
    InsufficientStock { product: String },

    #[error("Payment not completed")]
    PaymentNotCompleted,

    #[error("Product {0} not found")]
    ProductNotFound(String),

    #[error("Order {0} not found")]
    OrderNotFound(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for ShopError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ShopError::Storage(format!("record {id} vanished")),
            other => ShopError::Storage(other.to_string()),
        }
    }
}

impl From<GatewayError> for ShopError {
    fn from(e: GatewayError) -> Self {
        ShopError::PaymentProvider(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ShopError {
    fn from(e: validator::ValidationErrors) -> Self {
        ShopError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
