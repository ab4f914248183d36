//! Payment-provider seam.

pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use self::stripe::StripeGateway;

/// Metadata key carrying the JSON product-id → quantity map.
pub const ITEMS_METADATA_KEY: &str = "items";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http: {0}")]
    Http(String),
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// One hosted-checkout line, priced in minor units.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCheckoutSession {
    pub currency: String,
    pub lines: Vec<SessionLine>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// The provider's record of a checkout session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool { self.payment_status == "paid" }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_checkout_session(&self, secret_key: &str, request: &NewCheckoutSession) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_checkout_session(&self, secret_key: &str, session_id: &str) -> Result<CheckoutSession, GatewayError>;
}
